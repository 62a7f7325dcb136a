use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use quanta::{Clock, Instant as QuantaInstant};

use crate::rt_processing::waveform::oscillators::BlockReport;

/// Snapshot of oscillator metrics (non-RT).
#[derive(Debug, Clone)]
pub struct MonitorSnapshot {
    pub blocks_rendered: u64,
    pub frames_rendered: u64,
    /// Samples served from the shadow table while a rebuild was running.
    pub shadow_reads: u64,
    /// Failed epoch re-checks on the render path.
    pub read_retries: u64,
    pub rebuilds_completed: u64,
    /// Control requests that found another rebuild running and were queued.
    pub rebuilds_queued: u64,
    pub min_block_nanos: Option<u64>,
    pub max_block_nanos: Option<u64>,
    /// EMA of block render duration in nanoseconds.
    pub ema_block_nanos: f64,
    pub max_rebuild_nanos: Option<u64>,
    pub timestamp: Instant,
}

/// Real-time-safe oscillator monitor.
///
/// The render path only calls `record_block` and `scoped_block`; both touch
/// atomics and the quanta clock, nothing else. Rebuild accounting runs on the
/// control path. `snapshot` is not real-time safe.
pub struct RenderMonitor {
    clock: Clock,

    blocks_rendered: AtomicU64,
    frames_rendered: AtomicU64,
    shadow_reads: AtomicU64,
    read_retries: AtomicU64,
    rebuilds_completed: AtomicU64,
    rebuilds_queued: AtomicU64,

    min_block_nanos: AtomicU64,
    max_block_nanos: AtomicU64,
    /// f64 bits
    ema_block_bits: AtomicU64,
    max_rebuild_nanos: AtomicU64,

    ema_alpha: f64,
}

impl RenderMonitor {
    /// `ema_alpha` is clamped into `(0, 1]`; around 0.05..0.2 tracks block
    /// timing well.
    pub fn new(ema_alpha: f64) -> Self {
        Self {
            clock: Clock::new(),
            blocks_rendered: AtomicU64::new(0),
            frames_rendered: AtomicU64::new(0),
            shadow_reads: AtomicU64::new(0),
            read_retries: AtomicU64::new(0),
            rebuilds_completed: AtomicU64::new(0),
            rebuilds_queued: AtomicU64::new(0),
            min_block_nanos: AtomicU64::new(u64::MAX),
            max_block_nanos: AtomicU64::new(0),
            ema_block_bits: AtomicU64::new(0),
            max_rebuild_nanos: AtomicU64::new(0),
            ema_alpha: ema_alpha.clamp(f64::EPSILON, 1.0),
        }
    }

    // ---------------------------
    // Render path
    // ---------------------------

    #[inline(always)]
    pub fn record_block(&self, report: &BlockReport) {
        self.blocks_rendered.fetch_add(1, Ordering::Relaxed);
        self.frames_rendered.fetch_add(report.frames as u64, Ordering::Relaxed);
        if report.shadow_reads > 0 {
            self.shadow_reads.fetch_add(report.shadow_reads as u64, Ordering::Relaxed);
        }
        if report.retries > 0 {
            self.read_retries.fetch_add(report.retries as u64, Ordering::Relaxed);
        }
    }

    #[inline(always)]
    pub fn record_block_duration_nanos(&self, nanos: u64) {
        self.min_block_nanos.fetch_min(nanos, Ordering::Relaxed);
        self.max_block_nanos.fetch_max(nanos, Ordering::Relaxed);

        // EMA_new = alpha * x + (1 - alpha) * EMA_old
        let alpha = self.ema_alpha;
        let mut old_bits = self.ema_block_bits.load(Ordering::Relaxed);
        loop {
            let old = f64::from_bits(old_bits);
            let new = alpha * (nanos as f64) + (1.0 - alpha) * old;
            match self.ema_block_bits.compare_exchange_weak(
                old_bits,
                new.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(found) => old_bits = found,
            }
        }
    }

    /// Guard that records the block duration when dropped.
    #[inline(always)]
    pub fn scoped_block(&self) -> BlockTimer<'_> {
        BlockTimer {
            monitor: self,
            start: self.clock.now(),
        }
    }

    // ---------------------------
    // Control path
    // ---------------------------

    pub fn now(&self) -> QuantaInstant {
        self.clock.now()
    }

    pub fn record_rebuild(&self, started: QuantaInstant) {
        let nanos = elapsed_nanos(self.clock.now(), started);
        self.rebuilds_completed.fetch_add(1, Ordering::Relaxed);
        self.max_rebuild_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    pub fn increment_rebuilds_queued(&self) {
        self.rebuilds_queued.fetch_add(1, Ordering::Relaxed);
    }

    // ---------------------------
    // Snapshot (non-RT)
    // ---------------------------

    /// Read all counters. With `reset_peaks`, min/max/EMA timings restart
    /// from scratch afterwards.
    pub fn snapshot(&self, reset_peaks: bool) -> MonitorSnapshot {
        let min_raw = self.min_block_nanos.load(Ordering::Relaxed);
        let max_raw = self.max_block_nanos.load(Ordering::Relaxed);
        let rebuild_raw = self.max_rebuild_nanos.load(Ordering::Relaxed);

        let snapshot = MonitorSnapshot {
            blocks_rendered: self.blocks_rendered.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            shadow_reads: self.shadow_reads.load(Ordering::Relaxed),
            read_retries: self.read_retries.load(Ordering::Relaxed),
            rebuilds_completed: self.rebuilds_completed.load(Ordering::Relaxed),
            rebuilds_queued: self.rebuilds_queued.load(Ordering::Relaxed),
            min_block_nanos: (min_raw != u64::MAX).then_some(min_raw),
            max_block_nanos: (max_raw != 0).then_some(max_raw),
            ema_block_nanos: f64::from_bits(self.ema_block_bits.load(Ordering::Relaxed)),
            max_rebuild_nanos: (rebuild_raw != 0).then_some(rebuild_raw),
            timestamp: Instant::now(),
        };

        if reset_peaks {
            self.min_block_nanos.store(u64::MAX, Ordering::Relaxed);
            self.max_block_nanos.store(0, Ordering::Relaxed);
            self.ema_block_bits.store(0, Ordering::Relaxed);
            self.max_rebuild_nanos.store(0, Ordering::Relaxed);
        }

        snapshot
    }

    pub fn reset_all(&self) {
        for counter in [
            &self.blocks_rendered,
            &self.frames_rendered,
            &self.shadow_reads,
            &self.read_retries,
            &self.rebuilds_completed,
            &self.rebuilds_queued,
            &self.max_block_nanos,
            &self.ema_block_bits,
            &self.max_rebuild_nanos,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.min_block_nanos.store(u64::MAX, Ordering::Relaxed);
    }
}

impl Default for RenderMonitor {
    fn default() -> Self {
        Self::new(0.1)
    }
}

fn elapsed_nanos(now: QuantaInstant, start: QuantaInstant) -> u64 {
    u64::try_from(now.saturating_duration_since(start).as_nanos()).unwrap_or(u64::MAX)
}

/// Records block latency on drop. Atomics only.
pub struct BlockTimer<'a> {
    monitor: &'a RenderMonitor,
    start: QuantaInstant,
}

impl Drop for BlockTimer<'_> {
    fn drop(&mut self) {
        let elapsed = elapsed_nanos(self.monitor.clock.now(), self.start);
        self.monitor.record_block_duration_nanos(elapsed);
    }
}
