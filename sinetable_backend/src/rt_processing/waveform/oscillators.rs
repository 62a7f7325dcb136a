use std::sync::Arc;

use log::{error, warn};
use sinetable_core::{
    DEFAULT_TABLE_LENGTH, HarmonicSpectrum, Interpolation, OscillatorConfig, OscillatorError,
    OscillatorResult, SpectrumSource, ValidatedConfig, Waveform, sanitize_table_length,
};

use super::tables::WavetableStore;
use crate::rt_processing::control::{
    ControlHandle, ControlRequest, ControlState, Installed, RequestStatus, Shared,
};
use crate::rt_processing::performance::MonitorSnapshot;
use crate::rt_processing::voice_renderer::AudioSource;

/// Bring `phase` into `[0, length)` in one step, for any magnitude.
///
/// Non-finite phases restart at zero so the render path stays total.
#[inline]
pub fn wrap_phase(phase: f32, length: f32) -> f32 {
    if phase >= 0.0 && phase < length {
        return phase;
    }
    let wrapped = phase.rem_euclid(length);
    // rem_euclid rounds tiny negatives up to `length`.
    if wrapped.is_finite() && wrapped < length { wrapped } else { 0.0 }
}

/// Truncate `phase` to a table index, wrapped into `[0, length)`.
#[inline]
pub fn table_index(phase: f32, length: usize) -> usize {
    let index = phase as usize;
    if index < length { index } else { index % length }
}

/// What one rendered block touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockReport {
    pub frames: usize,
    pub shadow_reads: usize,
    pub retries: usize,
}

/// Per-sample phase accumulator over a table of fixed length.
#[derive(Debug, Clone)]
pub struct PhaseAccumulator {
    phase: f32,
    increment: f32,
    sample_rate: f32,
    /// `length / sample_rate`, always recomputed together with the rate.
    si_factor: f32,
    length: usize,
}

impl PhaseAccumulator {
    /// `length` and `sample_rate` must already be validated.
    pub fn new(length: usize, sample_rate: f32, frequency: f32) -> Self {
        let si_factor = length as f32 / sample_rate;
        Self {
            phase: 0.0,
            increment: frequency * si_factor,
            sample_rate,
            si_factor,
            length,
        }
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn increment(&self) -> f32 {
        self.increment
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Frequency implied by the current increment.
    pub fn frequency(&self) -> f32 {
        self.increment / self.si_factor
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.increment = frequency * self.si_factor;
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Adopt a new host sample rate, keeping the perceived frequency.
    ///
    /// A zero, negative or non-finite rate is rejected and nothing changes.
    pub fn set_sample_rate(&mut self, sample_rate: f32) -> OscillatorResult<()> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(OscillatorError::InvalidSampleRate(sample_rate));
        }
        if sample_rate != self.sample_rate {
            self.increment *= self.sample_rate / sample_rate;
            self.sample_rate = sample_rate;
            self.si_factor = self.length as f32 / sample_rate;
        }
        Ok(())
    }

    /// Follow a table reallocation, keeping relative phase and frequency.
    pub fn set_length(&mut self, length: usize) {
        let ratio = length as f32 / self.length as f32;
        self.length = length;
        self.si_factor = length as f32 / self.sample_rate;
        self.increment *= ratio;
        self.phase = wrap_phase(self.phase * ratio, length as f32);
    }

    /// Render `output.len()` samples, one per frequency value.
    ///
    /// `phase_offsets` is in cycles and is added to the phase each sample.
    /// Frames past the end of `frequency` are silent and leave the phase alone.
    pub fn render(
        &mut self,
        store: &WavetableStore,
        interpolation: Interpolation,
        frequency: &[f32],
        phase_offsets: Option<&[f32]>,
        output: &mut [f32],
    ) -> BlockReport {
        debug_assert_eq!(store.len(), self.length);

        let frames = output.len().min(frequency.len());
        let length = self.length as f32;
        let mut report = BlockReport { frames, ..BlockReport::default() };

        for (n, out) in output[..frames].iter_mut().enumerate() {
            self.increment = frequency[n] * self.si_factor;

            let index = table_index(self.phase, self.length);
            let lookup = match interpolation {
                Interpolation::Nearest => store.lookup(index),
                Interpolation::Linear => store.lookup_linear(index, self.phase - index as f32),
            };
            *out = lookup.sample;
            report.shadow_reads += lookup.from_shadow as usize;
            report.retries += lookup.retries as usize;

            let offset = phase_offsets.and_then(|o| o.get(n)).copied().unwrap_or(0.0);
            self.phase = wrap_phase(self.phase + self.increment + offset * length, length);
        }
        output[frames..].fill(0.0);

        report
    }
}

/// An additive wavetable oscillator instance.
///
/// Owns one double-buffered table and the render-side phase state. Control
/// requests made through `&self` or a [`ControlHandle`] rebuild the table while
/// `process` keeps reading it.
pub struct Oscillator {
    shared: Arc<Shared>,
    accumulator: PhaseAccumulator,
    interpolation: Interpolation,
    active: bool,
    /// Bits of the last host rate `fill_buffer` refused, so it is reported once.
    rejected_rate: Option<u32>,
}

impl Oscillator {
    /// Build from host inputs, substituting defaults for illegal values and
    /// logging each substitution.
    pub fn new(config: &OscillatorConfig) -> Self {
        let (oscillator, advisories) = Self::with_advisories(config);
        for advisory in &advisories {
            warn!("{advisory}");
        }
        oscillator
    }

    /// Like [`new`](Self::new) but returns the advisories instead of logging them.
    pub fn with_advisories(config: &OscillatorConfig) -> (Self, Vec<OscillatorError>) {
        let sanitized = config.sanitize();
        (Self::from_validated(sanitized.config), sanitized.advisories)
    }

    pub fn from_validated(config: ValidatedConfig) -> Self {
        let (store, rejected) = WavetableStore::create_or_default(config.table_length);
        if let Some(err) = rejected {
            warn!("{err}");
        }
        let length = store.len();

        let spectrum = config.source.resolve(config.harmonics);
        let waveform = match config.source {
            SpectrumSource::Preset(waveform) => Some(waveform),
            SpectrumSource::Explicit(_) => None,
        };

        let shared = Shared::new(
            store,
            ControlState {
                harmonics: config.harmonics,
                normalize: config.normalize,
            },
            Installed {
                spectrum: spectrum.clone(),
                waveform,
            },
        );
        shared.rebuild(&spectrum, config.normalize);

        Self {
            shared: Arc::new(shared),
            accumulator: PhaseAccumulator::new(length, config.sample_rate, config.frequency),
            interpolation: config.interpolation,
            active: true,
            rejected_rate: None,
        }
    }

    // Render context

    /// Render one block. Never blocks, never allocates.
    pub fn process(
        &mut self,
        frequency: &[f32],
        phase_offsets: Option<&[f32]>,
        output: &mut [f32],
    ) -> BlockReport {
        if !self.active {
            output.fill(0.0);
            return BlockReport::default();
        }

        let monitor = &self.shared.monitor;
        let _timer = monitor.scoped_block();
        let report = self.accumulator.render(
            &self.shared.store,
            self.interpolation,
            frequency,
            phase_offsets,
            output,
        );
        monitor.record_block(&report);
        report
    }

    /// Host notification of a changed sample rate.
    pub fn set_sample_rate(&mut self, sample_rate: f32) -> OscillatorResult<()> {
        self.accumulator.set_sample_rate(sample_rate)
    }

    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.interpolation = interpolation;
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    // Control context

    pub fn select_waveform(&self, waveform: Waveform) -> RequestStatus {
        self.shared.submit(ControlRequest::SelectWaveform(waveform))
    }

    pub fn select_waveform_by_name(&self, name: &str) -> RequestStatus {
        self.shared
            .submit(ControlRequest::SelectWaveformByName(name.to_string()))
    }

    pub fn set_spectrum(&self, weights: &[f32]) -> RequestStatus {
        self.shared.submit(ControlRequest::SetSpectrum(weights.to_vec()))
    }

    pub fn control_handle(&self) -> ControlHandle {
        ControlHandle::new(Arc::clone(&self.shared))
    }

    /// Reallocate the table at a new length and rebuild the current spectrum.
    ///
    /// An illegal length is replaced by `DEFAULT_TABLE_LENGTH`. Fails with
    /// `TableShared` while any control handle is alive.
    pub fn resize(&mut self, length: i64) -> OscillatorResult<()> {
        let length = sanitize_table_length(length).unwrap_or_else(|err| {
            warn!("{err}");
            DEFAULT_TABLE_LENGTH
        });
        let shared = Arc::get_mut(&mut self.shared).ok_or(OscillatorError::TableShared)?;

        shared.store.resize(length)?;
        let normalize = shared.control.get_mut().normalize;
        let spectrum = shared.installed.get_mut().spectrum.clone();
        shared.rebuild(&spectrum, normalize);

        self.accumulator.set_length(length);
        Ok(())
    }

    // Inspection

    pub fn read(&self, index: usize) -> f32 {
        self.shared.store.read(index)
    }

    pub fn table(&self) -> Vec<f32> {
        self.shared.store.to_vec()
    }

    pub fn table_length(&self) -> usize {
        self.accumulator.length()
    }

    pub fn accumulator(&self) -> &PhaseAccumulator {
        &self.accumulator
    }

    pub fn spectrum(&self) -> HarmonicSpectrum {
        self.shared.spectrum()
    }

    pub fn waveform(&self) -> Option<Waveform> {
        self.shared.waveform()
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn monitor_snapshot(&self) -> MonitorSnapshot {
        self.shared.monitor.snapshot(false)
    }
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new(&OscillatorConfig::default())
    }
}

impl AudioSource for Oscillator {
    fn fill_buffer(
        &mut self,
        frequency: &[f32],
        phase_offsets: Option<&[f32]>,
        output: &mut [f32],
        sample_rate: f32,
    ) {
        let bits = sample_rate.to_bits();
        if bits == self.accumulator.sample_rate().to_bits() {
            self.rejected_rate = None;
        } else if self.rejected_rate != Some(bits) {
            match self.set_sample_rate(sample_rate) {
                Ok(()) => self.rejected_rate = None,
                Err(err) => {
                    self.rejected_rate = Some(bits);
                    error!("{err}, keeping {} Hz", self.accumulator.sample_rate());
                }
            }
        }
        self.process(frequency, phase_offsets, output);
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn reset(&mut self) {
        self.accumulator.reset();
        self.active = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn eight_point_sine() -> Oscillator {
        Oscillator::new(
            &OscillatorConfig::new()
                .with_table_length(8)
                .with_sample_rate(8.0)
                .with_frequency(1.0),
        )
    }

    #[test]
    fn test_eight_sample_sine_repeats() {
        let mut osc = eight_point_sine();
        assert_eq!(osc.accumulator().increment(), 1.0);

        let frequency = [1.0; 16];
        let mut out = [0.0; 16];
        let report = osc.process(&frequency, None, &mut out);
        assert_eq!(report.frames, 16);

        for i in 0..8 {
            let expected = (2.0 * PI * i as f32 / 8.0).sin();
            assert!((out[i] - expected).abs() < 1e-6, "sample {i}: {} vs {expected}", out[i]);
            assert_eq!(out[i], out[i + 8]);
        }
        assert_eq!(osc.accumulator().phase(), 0.0);
    }

    #[test]
    fn test_table_length_two_uses_default() {
        let (osc, advisories) =
            Oscillator::with_advisories(&OscillatorConfig::new().with_table_length(2));
        assert_eq!(osc.table_length(), DEFAULT_TABLE_LENGTH);
        assert_eq!(osc.table().len(), DEFAULT_TABLE_LENGTH);
        assert!(matches!(advisories[..], [OscillatorError::InvalidLength { requested: 2 }]));
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        let mut osc = eight_point_sine();
        let before = osc.accumulator().clone();

        assert!(matches!(
            osc.set_sample_rate(0.0),
            Err(OscillatorError::InvalidSampleRate(r)) if r == 0.0
        ));
        assert_eq!(osc.accumulator().increment(), before.increment());
        assert_eq!(osc.accumulator().sample_rate(), before.sample_rate());
        assert_eq!(osc.accumulator().frequency(), before.frequency());

        // The per-block path ignores it too.
        let mut out = [0.0; 4];
        osc.fill_buffer(&[1.0; 4], None, &mut out, 0.0);
        assert_eq!(osc.accumulator().sample_rate(), 8.0);
    }

    #[test]
    fn test_rate_change_keeps_frequency() {
        let mut acc = PhaseAccumulator::new(1024, 48_000.0, 440.0);
        acc.set_sample_rate(96_000.0).unwrap();
        assert!((acc.frequency() - 440.0).abs() < 1e-3);
        assert!((acc.increment() - 440.0 * 1024.0 / 96_000.0).abs() < 1e-4);

        acc.set_frequency(-220.0);
        assert!((acc.frequency() + 220.0).abs() < 1e-3);
        assert!((acc.increment() + 220.0 * 1024.0 / 96_000.0).abs() < 1e-4);
    }

    #[test]
    fn test_wrap_phase() {
        assert_eq!(wrap_phase(3.5, 8.0), 3.5);
        assert_eq!(wrap_phase(8.0, 8.0), 0.0);
        assert_eq!(wrap_phase(-1.0, 8.0), 7.0);
        assert_eq!(wrap_phase(8_000_003.0, 8.0), 3.0);
        assert_eq!(wrap_phase(-1e-9, 8.0), 0.0);
        assert_eq!(wrap_phase(f32::NAN, 8.0), 0.0);
        assert_eq!(wrap_phase(f32::INFINITY, 8.0), 0.0);
    }

    #[test]
    fn test_table_index_is_clamped() {
        assert_eq!(table_index(7.9, 8), 7);
        assert_eq!(table_index(9.0, 8), 1);
        assert_eq!(table_index(-3.0, 8), 0);
        assert_eq!(table_index(f32::NAN, 8), 0);
    }

    #[test]
    fn test_negative_frequency_runs_backwards() {
        let mut osc = Oscillator::new(
            &OscillatorConfig::new()
                .with_table_length(8)
                .with_sample_rate(8.0)
                .with_frequency(-1.0),
        );
        let table = osc.table();
        let mut out = [0.0; 8];
        osc.process(&[-1.0; 8], None, &mut out);
        assert_eq!(out[0], table[0]);
        assert_eq!(out[1], table[7]);
        assert_eq!(out[2], table[6]);
    }

    #[test]
    fn test_phase_offsets_advance_in_cycles() {
        let mut osc = eight_point_sine();
        let table = osc.table();
        let mut out = [0.0; 3];
        // 0.25 cycle = 2 extra table steps per sample.
        osc.process(&[1.0; 3], Some(&[0.25; 3]), &mut out);
        assert_eq!(out, [table[0], table[3], table[6]]);
    }

    #[test]
    fn test_short_frequency_input_silences_tail() {
        let mut osc = eight_point_sine();
        let mut out = [9.0; 6];
        let report = osc.process(&[1.0; 4], None, &mut out);
        assert_eq!(report.frames, 4);
        assert_eq!(&out[4..], &[0.0, 0.0]);
        assert_eq!(osc.accumulator().phase(), 4.0);
    }

    #[test]
    fn test_linear_interpolation_blends_neighbours() {
        let mut osc = Oscillator::new(
            &OscillatorConfig::new()
                .with_table_length(8)
                .with_sample_rate(16.0)
                .with_frequency(1.0)
                .with_interpolation(Interpolation::Linear),
        );
        let table = osc.table();
        let mut out = [0.0; 2];
        osc.process(&[1.0; 2], None, &mut out);
        assert_eq!(out[0], table[0]);
        assert!((out[1] - 0.5 * (table[0] + table[1])).abs() < 1e-6);

        osc.set_interpolation(Interpolation::Nearest);
        assert_eq!(osc.interpolation(), Interpolation::Nearest);
        osc.process(&[1.0; 2], None, &mut out);
        assert_eq!(out, [table[1], table[1]]);
    }

    #[test]
    fn test_waveform_requests_rebuild_table() {
        let osc = Oscillator::new(&OscillatorConfig::new().with_table_length(64));
        assert_eq!(osc.select_waveform(Waveform::Square), RequestStatus::Applied);
        assert_eq!(osc.waveform(), Some(Waveform::Square));

        let peak = osc.table().iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 1.0).abs() < 1e-6);

        osc.set_spectrum(&[0.0, 0.5]);
        assert_eq!(osc.waveform(), None);
        assert_eq!(osc.spectrum().as_slice(), &[0.0, 0.5]);
    }

    #[test]
    fn test_stop_renders_silence_and_freezes_phase() {
        let mut osc = eight_point_sine();
        osc.stop();
        assert!(!osc.is_active());
        let mut out = [1.0; 4];
        osc.process(&[1.0; 4], None, &mut out);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(osc.accumulator().phase(), 0.0);

        osc.start();
        assert!(osc.is_active());
        osc.process(&[1.0; 4], None, &mut out);
        assert_eq!(out[1], osc.read(1));
        assert_eq!(osc.accumulator().phase(), 4.0);

        osc.stop();
        osc.reset();
        assert!(osc.is_active());
        assert_eq!(osc.accumulator().phase(), 0.0);
    }

    #[test]
    fn test_resize_requires_exclusive_access() {
        let mut osc = eight_point_sine();
        let handle = osc.control_handle();
        assert!(matches!(osc.resize(16), Err(OscillatorError::TableShared)));
        drop(handle);

        osc.resize(16).unwrap();
        assert_eq!(osc.table_length(), 16);
        assert_eq!(osc.accumulator().increment(), 2.0);
        let expected = (2.0 * PI * 4.0 / 16.0).sin();
        assert!((osc.read(4) - expected).abs() < 1e-6);

        osc.resize(1).unwrap();
        assert_eq!(osc.table_length(), DEFAULT_TABLE_LENGTH);
    }
}
