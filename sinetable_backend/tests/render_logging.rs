//! Diagnostics emitted from the per-block path.
//!
//! Kept in its own test binary because it installs the process-wide logger.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{Level, LevelFilter, Log, Metadata, Record};
use sinetable_backend::sinetable_core::OscillatorConfig;
use sinetable_backend::{AudioSource, Oscillator};

struct CountingLogger {
    errors: AtomicUsize,
}

impl Log for CountingLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if record.level() == Level::Error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn flush(&self) {}
}

static LOGGER: CountingLogger = CountingLogger {
    errors: AtomicUsize::new(0),
};

fn render_blocks(osc: &mut Oscillator, sample_rate: f32, blocks: usize) {
    let frequency = [440.0; 64];
    let mut output = [0.0; 64];
    for _ in 0..blocks {
        osc.fill_buffer(&frequency, None, &mut output, sample_rate);
    }
}

#[test]
fn test_rejected_host_rate_is_reported_once() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Trace);
    let errors = || LOGGER.errors.load(Ordering::Relaxed);

    let mut osc = Oscillator::new(&OscillatorConfig::new().with_sample_rate(44_100.0));
    render_blocks(&mut osc, 44_100.0, 10);
    assert_eq!(errors(), 0);

    render_blocks(&mut osc, 0.0, 100);
    assert_eq!(errors(), 1);
    assert_eq!(osc.accumulator().sample_rate(), 44_100.0);

    render_blocks(&mut osc, f32::NAN, 100);
    assert_eq!(errors(), 2);

    // Back to the stored rate, then the same bad rate again: a new report.
    render_blocks(&mut osc, 44_100.0, 1);
    render_blocks(&mut osc, 0.0, 100);
    assert_eq!(errors(), 3);

    render_blocks(&mut osc, 48_000.0, 100);
    assert_eq!(errors(), 3);
    assert_eq!(osc.accumulator().sample_rate(), 48_000.0);
}
