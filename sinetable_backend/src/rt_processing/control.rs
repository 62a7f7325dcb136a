//! Control-rate requests and the single-writer rebuild path.
//!
//! Any number of [`ControlHandle`]s may submit requests from any thread.
//! Requests go onto a lock-free queue; whichever caller wins the control lock
//! drains it, one rebuild at a time, so two rebuilds never interleave.
//! Callers that lose the race return immediately with
//! [`RequestStatus::Queued`] and the winner applies their request.
//!
//! Only submitters ever take the control lock, and each one re-checks the
//! queue after releasing it. Readers of the installed spectrum go through a
//! separate lock so they can never hold the gate while a request is queued.

use std::sync::Arc;
use std::sync::atomic::{Ordering, fence};

use crossbeam::queue::SegQueue;
use log::{debug, warn};
use sinetable_core::{HarmonicSpectrum, Waveform};
use spin::Mutex;

use crate::rt_processing::performance::{MonitorSnapshot, RenderMonitor};
use crate::rt_processing::waveform::synthesis::{normalize, synthesize};
use crate::rt_processing::waveform::tables::WavetableStore;

/// A waveform change requested at control rate.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    SelectWaveform(Waveform),
    /// Unknown names fall back to sine.
    SelectWaveformByName(String),
    /// Explicit weights, fundamental first.
    SetSpectrum(Vec<f32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// The calling thread ran the rebuild before returning.
    Applied,
    /// Another rebuild was running; its owner will apply this request.
    Queued,
}

/// Writer-side settings, guarded by the control lock.
#[derive(Debug)]
pub(crate) struct ControlState {
    /// Partial count for the canonical presets.
    pub(crate) harmonics: usize,
    pub(crate) normalize: bool,
}

/// What the table currently holds, as of the last completed rebuild.
#[derive(Debug, Clone)]
pub(crate) struct Installed {
    pub(crate) spectrum: HarmonicSpectrum,
    /// Preset behind `spectrum`, if it came from one.
    pub(crate) waveform: Option<Waveform>,
}

/// State shared between an oscillator and its control handles.
pub(crate) struct Shared {
    pub(crate) store: WavetableStore,
    /// Writer gate. Held only inside `submit` and by `&mut` resize.
    pub(crate) control: Mutex<ControlState>,
    pub(crate) installed: Mutex<Installed>,
    pending: SegQueue<ControlRequest>,
    pub(crate) monitor: RenderMonitor,
}

impl Shared {
    pub(crate) fn new(store: WavetableStore, state: ControlState, installed: Installed) -> Self {
        Self {
            store,
            control: Mutex::new(state),
            installed: Mutex::new(installed),
            pending: SegQueue::new(),
            monitor: RenderMonitor::default(),
        }
    }

    pub(crate) fn submit(&self, request: ControlRequest) -> RequestStatus {
        self.pending.push(request);
        // Pairs with the fence after unlock below: either we see the lock
        // free, or the holder sees our request.
        fence(Ordering::SeqCst);

        let mut applied = false;
        loop {
            let Some(mut state) = self.control.try_lock() else {
                break;
            };
            while let Some(next) = self.pending.pop() {
                self.execute(&state, next);
                applied = true;
            }
            drop(state);

            fence(Ordering::SeqCst);
            if self.pending.is_empty() {
                break;
            }
        }

        if applied {
            RequestStatus::Applied
        } else {
            self.monitor.increment_rebuilds_queued();
            RequestStatus::Queued
        }
    }

    fn execute(&self, state: &ControlState, request: ControlRequest) {
        let (spectrum, waveform) = match request {
            ControlRequest::SelectWaveform(waveform) => {
                (waveform.spectrum(state.harmonics), Some(waveform))
            }
            ControlRequest::SelectWaveformByName(name) => {
                let waveform = name.parse::<Waveform>().unwrap_or_else(|err| {
                    warn!("{err}");
                    Waveform::Sine
                });
                (waveform.spectrum(state.harmonics), Some(waveform))
            }
            ControlRequest::SetSpectrum(weights) => {
                let (spectrum, advisories) = HarmonicSpectrum::from_weights(&weights);
                for advisory in &advisories {
                    warn!("{advisory}");
                }
                (spectrum, None)
            }
        };

        if self.rebuild(&spectrum, state.normalize) {
            *self.installed.lock() = Installed { spectrum, waveform };
        }
    }

    pub(crate) fn spectrum(&self) -> HarmonicSpectrum {
        self.installed.lock().spectrum.clone()
    }

    pub(crate) fn waveform(&self) -> Option<Waveform> {
        self.installed.lock().waveform
    }

    /// Run one begin / synthesize / end bracket. Returns false only if another
    /// writer holds the table, which the control lock rules out.
    pub(crate) fn rebuild(&self, spectrum: &HarmonicSpectrum, normalize_peak: bool) -> bool {
        let started = self.monitor.now();
        let Some(mut rebuild) = self.store.begin_rebuild() else {
            warn!("wavetable rebuild already in progress, request dropped");
            return false;
        };

        synthesize(spectrum, rebuild.scratch());
        if normalize_peak {
            normalize(rebuild.scratch());
        }
        rebuild.commit();
        drop(rebuild);

        self.monitor.record_rebuild(started);
        debug!(
            "rebuilt {}-sample table from {} partials",
            self.store.len(),
            spectrum.partials().count()
        );
        true
    }
}

/// Cloneable, thread-safe handle for control-rate requests.
///
/// While any handle is alive the owning oscillator cannot be resized.
#[derive(Clone)]
pub struct ControlHandle {
    shared: Arc<Shared>,
}

impl ControlHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn apply(&self, request: ControlRequest) -> RequestStatus {
        self.shared.submit(request)
    }

    pub fn select_waveform(&self, waveform: Waveform) -> RequestStatus {
        self.apply(ControlRequest::SelectWaveform(waveform))
    }

    pub fn select_waveform_by_name(&self, name: &str) -> RequestStatus {
        self.apply(ControlRequest::SelectWaveformByName(name.to_string()))
    }

    pub fn set_spectrum(&self, weights: &[f32]) -> RequestStatus {
        self.apply(ControlRequest::SetSpectrum(weights.to_vec()))
    }

    /// Spectrum of the last completed rebuild.
    pub fn spectrum(&self) -> HarmonicSpectrum {
        self.shared.spectrum()
    }

    pub fn waveform(&self) -> Option<Waveform> {
        self.shared.waveform()
    }

    pub fn is_rebuilding(&self) -> bool {
        self.shared.store.is_rebuilding()
    }

    pub fn table_length(&self) -> usize {
        self.shared.store.len()
    }

    pub fn monitor_snapshot(&self) -> MonitorSnapshot {
        self.shared.monitor.snapshot(false)
    }
}
