//! Core Audio Domain for the Voxbridge Service
//!
//! Pure, I/O-free building blocks shared by the relay: the G.711 µ-law
//! lookup tables, the small speech-quality DSP chain (noise gate, soft
//! limiter, exponential smoother, linear resampler), and the two
//! directional byte-to-byte transform pipelines. Everything here is
//! synchronous and cheap enough to run inline on a socket read loop.

pub mod dsp;
pub mod mulaw;
pub mod pipeline;
