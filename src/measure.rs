use crate::AudioFormats;
use crate::error::MeasurementError;
use ebur128::{EbuR128, Mode};
use log::{debug, warn};
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use symphonia::core::audio::AudioBufferRef;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Measures the integrated loudness (EBU R128 / ITU-R BS.1770) of one file
///
/// # Arguments
/// * `path` - Path to the audio file
///
/// # Returns
/// Integrated loudness in LUFS. Silent or too-short files measure as
/// `f64::NEG_INFINITY`, which sorts before every other song.
pub fn measure_single_file_loudness(path: impl AsRef<Path>) -> Result<f64, MeasurementError> {
    let path = path.as_ref();
    let file = fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(format) = AudioFormats::from_path(path) {
        hint.with_extension(&format.to_string());
    }
    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();

    let probed = symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(MeasurementError::NoTrack)?;
    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(MeasurementError::UnsupportedFormat)?;
    let channels = track
        .codec_params
        .channels
        .ok_or(MeasurementError::UnsupportedFormat)?;

    let mut ebu_state = EbuR128::new(channels.count() as u32, sample_rate, Mode::I)?;

    let dec_opts: DecoderOptions = Default::default();
    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &dec_opts)?;

    let mut decoded_frames: u64 = 0;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                decoded_frames += decoded.frames() as u64;
                let planar = convert_buffer_to_planar_f32(&decoded)?;
                let planes: Vec<&[f32]> = planar.iter().map(Vec::as_slice).collect();
                ebu_state.add_frames_planar_f32(&planes)?;
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(
                    "Decode error in {:?}: {}. Skipping packet.",
                    path.file_name().unwrap_or_default(),
                    e
                );
            }
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let lufs = ebu_state.loudness_global()?;
    debug!(
        "{:?}: {} frames at {} Hz, {:.2} LUFS",
        path.file_name().unwrap_or_default(),
        decoded_frames,
        sample_rate,
        lufs
    );
    if lufs.is_finite() || lufs == f64::NEG_INFINITY {
        Ok(lufs)
    } else {
        Err(MeasurementError::NonFinite(lufs))
    }
}

/// Runs `meter` on `path`, turning a panic inside it into an error so one bad
/// file cannot take down the batch.
pub fn measure_isolated<M>(meter: &M, path: &Path) -> Result<f64, MeasurementError>
where
    M: Fn(&Path) -> Result<f64, MeasurementError> + ?Sized,
{
    catch_unwind(AssertUnwindSafe(|| meter(path))).unwrap_or_else(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(MeasurementError::Panicked(msg))
    })
}

/// Largest magnitude of a signed 24-bit sample, 2^23 - 1
const I24_MAX: f32 = 8388607.0;

/// Converts any Symphonia audio buffer to planar f32 for the EBU R128 meter
///
/// # Arguments
/// * `decoded` - Decoded packet in whatever sample format the codec produced
///
/// # Returns
/// One vector per channel, integer formats scaled to `[-1.0, 1.0]`
fn convert_buffer_to_planar_f32(
    decoded: &AudioBufferRef<'_>,
) -> Result<Vec<Vec<f32>>, MeasurementError> {
    let num_channels = decoded.spec().channels.count();
    let mut planar_output: Vec<Vec<f32>> = Vec::with_capacity(num_channels);

    match decoded {
        AudioBufferRef::F32(buf) => {
            for plane in buf.planes().planes() {
                planar_output.push(plane.to_vec());
            }
        }
        AudioBufferRef::F64(buf) => {
            for plane in buf.planes().planes() {
                planar_output.push(plane.iter().map(|&s| s as f32).collect());
            }
        }
        AudioBufferRef::S32(buf) => {
            for plane in buf.planes().planes() {
                planar_output.push(
                    plane
                        .iter()
                        .map(|&s| (s as f32) / (i32::MAX as f32))
                        .collect(),
                );
            }
        }
        AudioBufferRef::S24(buf) => {
            for plane in buf.planes().planes() {
                planar_output.push(plane.iter().map(|&s| s.inner() as f32 / I24_MAX).collect());
            }
        }
        AudioBufferRef::S16(buf) => {
            for plane in buf.planes().planes() {
                planar_output.push(
                    plane
                        .iter()
                        .map(|&s| (s as f32) / (i16::MAX as f32))
                        .collect(),
                );
            }
        }
        AudioBufferRef::U8(buf) => {
            for plane in buf.planes().planes() {
                planar_output.push(
                    plane
                        .iter()
                        .map(|&s| ((s as i16 - 128) as f32) / 128.0)
                        .collect(),
                );
            }
        }
        _ => return Err(MeasurementError::UnsupportedFormat),
    }
    Ok(planar_output)
}
