//! Error types for sinetable.
//!
//! Most of these never leave the crate as failures: construction and control
//! requests substitute a documented default and hand the error back as an
//! advisory instead. Only a rejected sample-rate update, a resize while the
//! table is shared, and a malformed configuration document are returned as `Err`.

use thiserror::Error;

use crate::{MAX_HARMONICS, MAX_TABLE_LENGTH, MIN_TABLE_LENGTH};

/// Errors and advisories raised by oscillator construction and control.
#[derive(Debug, Error)]
pub enum OscillatorError {
    /// Requested table length is outside `[MIN_TABLE_LENGTH, MAX_TABLE_LENGTH]`.
    #[error("table length {requested} outside [{min}, {max}]", min = MIN_TABLE_LENGTH, max = MAX_TABLE_LENGTH)]
    InvalidLength {
        /// Length that was asked for.
        requested: i64,
    },

    /// Frequency magnitude exceeds the sanity ceiling, or is not a number.
    #[error("bad frequency {0} Hz")]
    InvalidFrequency(f32),

    /// Harmonic count is outside `[1, MAX_HARMONICS]`.
    #[error("harmonic count {requested} outside [1, {max}]", max = MAX_HARMONICS)]
    InvalidHarmonicCount {
        /// Count that was asked for.
        requested: i64,
    },

    /// Waveform name is not one of the canonical presets.
    #[error("{0} is not a legal waveform - using sine wave instead")]
    UnknownWaveformName(String),

    /// Sample rate is zero, negative or not finite.
    #[error("invalid sampling rate {0}")]
    InvalidSampleRate(f32),

    /// A harmonic weight is NaN or infinite.
    #[error("harmonic {harmonic} has a non-finite amplitude")]
    NonFiniteAmplitude {
        /// 1-based harmonic index.
        harmonic: usize,
    },

    /// The table is still referenced by a control handle.
    #[error("wavetable is shared with a live control handle")]
    TableShared,

    /// The configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used throughout the workspace.
pub type OscillatorResult<T> = Result<T, OscillatorError>;
