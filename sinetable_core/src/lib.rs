//! Data model for the sinetable additive wavetable oscillator.
//!
//! Holds everything that does not touch a thread: limits and defaults, the
//! error type, harmonic spectra with their canonical presets, and the host
//! construction config with its default-substitution policy.

pub mod config;
pub mod error;
pub mod spectrum;

pub use config::{
    Interpolation, OscillatorConfig, SanitizedConfig, SpectrumSource, ValidatedConfig,
    sanitize_table_length,
};
pub use error::{OscillatorError, OscillatorResult};
pub use spectrum::{HarmonicSpectrum, Waveform};

pub const MIN_TABLE_LENGTH: usize = 4;
pub const MAX_TABLE_LENGTH: usize = 1 << 20;
pub const DEFAULT_TABLE_LENGTH: usize = 8192;

pub const MAX_HARMONICS: usize = 1024;
pub const DEFAULT_HARMONICS: usize = 10;

/// Sanity ceiling on frequency magnitude, in Hz.
pub const MAX_FREQUENCY: f32 = 1_000_000.0;
pub const DEFAULT_FREQUENCY: f32 = 440.0;

pub const DEFAULT_SAMPLE_RATE: f32 = 44_100.0;
