//! G.711 µ-law companding tables.
//!
//! Both directions are table lookups. The tables are built once on first
//! use and read-only afterwards, so they are shared freely across all
//! sessions without synchronization.

use std::sync::LazyLock;

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

/// µ-law codeword → linear PCM16, all 256 entries.
static MULAW_TO_LINEAR: LazyLock<[i16; 256]> = LazyLock::new(|| {
    let mut table = [0i16; 256];
    for (byte, slot) in table.iter_mut().enumerate() {
        *slot = decode_byte(byte as u8);
    }
    table
});

/// Linear PCM16 → µ-law codeword, indexed by `sample as u16` after an
/// offset of 32768. Boxed: the table is 64 KiB and lives on the heap.
static LINEAR_TO_MULAW: LazyLock<Box<[u8; 65536]>> = LazyLock::new(|| {
    let mut table = Box::new([0u8; 65536]);
    for (index, slot) in table.iter_mut().enumerate() {
        *slot = encode_sample((index as i32 - 32768) as i16);
    }
    table
});

/// Expand one µ-law codeword to a linear sample. Output range is
/// approximately [-32124, 32124].
fn decode_byte(byte: u8) -> i16 {
    let v = !byte;
    let sign = v & 0x80;
    let exponent = (v >> 4) & 0x07;
    let mantissa = v & 0x0f;
    let mut sample = ((((mantissa as i32) << 3) + BIAS) << exponent) - BIAS;
    if sign != 0 {
        sample = -sample;
    }
    sample as i16
}

/// Compress one linear sample to a µ-law codeword.
fn encode_sample(sample: i16) -> u8 {
    let mut magnitude = sample as i32;
    let sign = (magnitude >> 8) & 0x80;
    if sign != 0 {
        magnitude = -magnitude;
    }
    if magnitude > CLIP {
        magnitude = CLIP;
    }
    magnitude += BIAS;

    // Largest exponent e in [0, 7] with magnitude >= 0x80 << e.
    let mut exponent = 7;
    let mut threshold = 0x4000;
    while magnitude < threshold && exponent > 0 {
        threshold >>= 1;
        exponent -= 1;
    }

    let mantissa = (magnitude >> (exponent + 3)) & 0x0f;
    !(sign | (exponent << 4) | mantissa) as u8
}

/// Look up the linear PCM16 value for a µ-law codeword.
#[inline]
pub fn mulaw_to_linear(byte: u8) -> i16 {
    MULAW_TO_LINEAR[byte as usize]
}

/// Look up the µ-law codeword for a linear PCM16 sample.
#[inline]
pub fn linear_to_mulaw(sample: i16) -> u8 {
    LINEAR_TO_MULAW[(sample as u16) as usize ^ 0x8000]
}

/// Decode a PCMU byte stream to linear samples.
pub fn decode(frame: &[u8]) -> Vec<i16> {
    frame.iter().map(|&b| mulaw_to_linear(b)).collect()
}

/// Encode linear samples to a PCMU byte stream.
pub fn encode(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| linear_to_mulaw(s)).collect()
}
