//! Real-time additive wavetable oscillator.
//!
//! An [`Oscillator`] owns a double-buffered table that is rebuilt from a
//! harmonic spectrum at control rate while the audio thread keeps rendering
//! from it. Rendering never blocks and never observes a half-built table.

pub mod rt_processing;

pub use rt_processing::control::{ControlHandle, ControlRequest, RequestStatus};
pub use rt_processing::performance::{MonitorSnapshot, RenderMonitor};
pub use rt_processing::voice_renderer::AudioSource;
pub use rt_processing::waveform::oscillators::{
    BlockReport, Oscillator, PhaseAccumulator, table_index, wrap_phase,
};
pub use rt_processing::waveform::synthesis::{normalize, synthesize};
pub use rt_processing::waveform::tables::{Lookup, MAX_READ_RETRIES, Rebuild, TableSlot, WavetableStore};

pub use sinetable_core;
