//! Directional audio transform pipelines.
//!
//! Two pure byte-to-byte functions, one per relay direction. Both thread
//! the caller's smoother tail through and hand back the new tail; they
//! never touch sockets or shared state.

use crate::{dsp, mulaw};

/// Sample rate of the narrow-band (PCMU) client leg.
pub const NARROWBAND_RATE: u32 = 8000;

/// Sample rate of the wide-band (PCM16) upstream leg.
pub const WIDEBAND_RATE: u32 = 48000;

/// A frame that cannot be interpreted in the declared format.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("PCM16 frame has odd byte length {0}")]
    OddLength(usize),
}

/// Client → upstream: PCMU @ 8 kHz in, PCM16-LE @ 48 kHz out.
///
/// `tail` is the smoother's last output for this direction; feed the
/// returned tail into the next call on the same stream.
pub fn pcmu_to_wideband(frame: &[u8], tail: i16) -> (Vec<u8>, i16) {
    let mut samples = mulaw::decode(frame);
    dsp::noise_gate(&mut samples, dsp::GATE_THRESHOLD);
    dsp::soft_limit(&mut samples, dsp::LIMIT_CEILING);
    let (smoothed, tail) = dsp::smooth(&samples, tail, dsp::SMOOTHING_ALPHA);
    let wide = dsp::resample(&smoothed, NARROWBAND_RATE, WIDEBAND_RATE);

    let mut bytes = Vec::with_capacity(wide.len() * 2);
    for sample in wide {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    (bytes, tail)
}

/// Upstream → client: PCM16-LE @ 48 kHz in, PCMU @ 8 kHz out.
///
/// An odd byte count means the frame is not PCM16; the caller should drop
/// it and keep the stream alive.
pub fn wideband_to_pcmu(frame: &[u8], tail: i16) -> Result<(Vec<u8>, i16), TransformError> {
    if frame.len() % 2 != 0 {
        return Err(TransformError::OddLength(frame.len()));
    }
    let mut samples: Vec<i16> = frame
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    dsp::noise_gate(&mut samples, dsp::GATE_THRESHOLD);
    dsp::soft_limit(&mut samples, dsp::LIMIT_CEILING);
    let (smoothed, tail) = dsp::smooth(&samples, tail, dsp::SMOOTHING_ALPHA);
    let narrow = dsp::resample(&smoothed, WIDEBAND_RATE, NARROWBAND_RATE);
    Ok((mulaw::encode(&narrow), tail))
}

/// True when every byte of the frame is identical (including empty).
///
/// A PCMU frame like this is digital silence or a stuck DC level; the
/// relay suppresses it instead of waking the client's playback path.
pub fn is_uniform(frame: &[u8]) -> bool {
    match frame.split_first() {
        Some((first, rest)) => rest.iter().all(|byte| byte == first),
        None => true,
    }
}
