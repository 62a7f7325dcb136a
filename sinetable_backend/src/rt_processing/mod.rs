pub mod control;
pub mod performance;
pub mod voice_renderer;
pub mod waveform;
