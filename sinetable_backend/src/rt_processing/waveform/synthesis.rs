use std::f64::consts::TAU;

use sinetable_core::HarmonicSpectrum;

/// Fourier synthesis of one table cycle.
///
/// `target[j] = Σ amplitude(i) · sin(2π · i · j / len)` over the spectrum's
/// non-zero partials. The buffer is cleared first and nothing is allocated.
/// The sine argument is reduced to `(i · j) mod len` so large tables and high
/// partials keep full precision.
pub fn synthesize(spectrum: &HarmonicSpectrum, target: &mut [f32]) {
    target.fill(0.0);
    let length = target.len();
    if length == 0 {
        return;
    }

    let step = TAU / length as f64;
    let modulus = length as u64;
    for (harmonic, amplitude) in spectrum.partials() {
        let harmonic = harmonic as u64 % modulus;
        for (j, sample) in target.iter_mut().enumerate() {
            let k = (harmonic * j as u64) % modulus;
            *sample += amplitude * (step * k as f64).sin() as f32;
        }
    }
}

/// Rescale so the absolute peak is 1.0. Returns the peak found; a silent
/// buffer is left as is.
pub fn normalize(target: &mut [f32]) -> f32 {
    let peak = target.iter().fold(0.0f32, |max, s| max.max(s.abs()));
    if peak > 0.0 {
        let rescale = 1.0 / peak;
        for sample in target.iter_mut() {
            *sample *= rescale;
        }
    }
    peak
}
