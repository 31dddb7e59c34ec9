use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use loudness_sort::{DEFAULT_CACHE_FILE, LogReporter, SortOptions, sort_songs_by_loudness};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

const LOG_FILE: &str = "loudness_processing.log";

#[derive(Parser)]
#[command(author, version, about = "Sort songs by loudness.", long_about = None)]
struct Cli {
    /// folder containing the songs, scanned recursively
    #[arg(short = 'c', long)]
    folder: PathBuf,

    /// cache file of previous measurements
    #[arg(long, default_value = DEFAULT_CACHE_FILE)]
    cache_path: PathBuf,
}

/// Copies log output to the console and the log file
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

fn main() -> Result<()> {
    let mut builder = pretty_env_logger::formatted_builder();
    builder
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .parse_filters("symphonia=error")
        .parse_default_env();
    let log_warning = match OpenOptions::new().create(true).append(true).open(LOG_FILE) {
        Ok(file) => {
            builder
                .target(env_logger::Target::Pipe(Box::new(Tee { file })))
                .write_style(env_logger::WriteStyle::Never);
            None
        }
        Err(e) => Some(e),
    };
    _ = builder.try_init();
    if let Some(e) = log_warning {
        warn!("Cannot open {}, logging to console only: {}", LOG_FILE, e);
    }

    let cli = Cli::parse();
    let options = SortOptions {
        source_dir: cli.folder,
        cache_path: cli.cache_path,
        ..Default::default()
    };

    info!("Source Directory: {:?}", options.source_dir);
    info!("Cache File: {:?}", options.cache_path);

    let mut reporter = LogReporter::new();
    sort_songs_by_loudness(&options, &mut reporter);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tee_copies_log_lines_into_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        let mut tee = Tee { file };

        tee.write_all(b"INFO Songs sorted by loudness\n").unwrap();
        tee.flush().unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "INFO Songs sorted by loudness\n"
        );
    }
}
