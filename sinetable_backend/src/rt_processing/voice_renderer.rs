/// Per-block rendering interface a host drives from its audio callback.
pub trait AudioSource: Send {
    /// Fill `output` from per-sample frequency and optional phase-offset
    /// streams. `sample_rate` is the host rate for this block; a change is
    /// picked up before any sample is rendered.
    fn fill_buffer(
        &mut self,
        frequency: &[f32],
        phase_offsets: Option<&[f32]>,
        output: &mut [f32],
        sample_rate: f32,
    );

    /// Check if this audio source is still active/playing
    fn is_active(&self) -> bool;

    /// Reset the audio source to its initial state
    fn reset(&mut self);
}
