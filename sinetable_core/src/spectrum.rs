use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OscillatorError, OscillatorResult};
use crate::MAX_HARMONICS;

/// Weights of harmonics 1..=N, fundamental first.
///
/// Harmonic 0 (DC) has no slot and is never synthesised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonicSpectrum {
    amplitudes: Vec<f32>,
}

impl HarmonicSpectrum {
    /// Strict constructor: rejects an empty or oversized list and non-finite weights.
    pub fn new(amplitudes: Vec<f32>) -> OscillatorResult<Self> {
        if amplitudes.is_empty() || amplitudes.len() > MAX_HARMONICS {
            return Err(OscillatorError::InvalidHarmonicCount {
                requested: amplitudes.len() as i64,
            });
        }
        if let Some(pos) = amplitudes.iter().position(|a| !a.is_finite()) {
            return Err(OscillatorError::NonFiniteAmplitude { harmonic: pos + 1 });
        }
        Ok(Self { amplitudes })
    }

    /// Lenient constructor used on the control path.
    ///
    /// An empty list becomes the sine spectrum, a list longer than
    /// `MAX_HARMONICS` is truncated and non-finite weights become zero. Every
    /// correction is returned as an advisory.
    pub fn from_weights(weights: &[f32]) -> (Self, Vec<OscillatorError>) {
        let mut advisories = Vec::new();

        if weights.is_empty() {
            advisories.push(OscillatorError::InvalidHarmonicCount { requested: 0 });
            return (Self::sine(), advisories);
        }

        if weights.len() > MAX_HARMONICS {
            advisories.push(OscillatorError::InvalidHarmonicCount {
                requested: weights.len() as i64,
            });
        }

        let amplitudes = weights
            .iter()
            .take(MAX_HARMONICS)
            .enumerate()
            .map(|(i, &w)| {
                if w.is_finite() {
                    w
                } else {
                    advisories.push(OscillatorError::NonFiniteAmplitude { harmonic: i + 1 });
                    0.0
                }
            })
            .collect();

        (Self { amplitudes }, advisories)
    }

    /// A single fundamental at full weight.
    pub fn sine() -> Self {
        Self { amplitudes: vec![1.0] }
    }

    /// Number of harmonic slots, including zero-weight ones.
    pub fn harmonic_count(&self) -> usize {
        self.amplitudes.len()
    }

    /// Weight of a 1-based harmonic. DC and out-of-range harmonics weigh zero.
    pub fn amplitude(&self, harmonic: usize) -> f32 {
        match harmonic {
            0 => 0.0,
            h => self.amplitudes.get(h - 1).copied().unwrap_or(0.0),
        }
    }

    /// `(harmonic, weight)` pairs for every non-zero partial.
    pub fn partials(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.amplitudes
            .iter()
            .enumerate()
            .filter(|(_, a)| **a != 0.0)
            .map(|(i, &a)| (i + 1, a))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.amplitudes
    }
}

impl Default for HarmonicSpectrum {
    fn default() -> Self {
        Self::sine()
    }
}

impl Add for &HarmonicSpectrum {
    type Output = HarmonicSpectrum;

    /// Weight-wise sum; the result is as long as the longer operand, capped at
    /// `MAX_HARMONICS`.
    fn add(self, rhs: Self) -> HarmonicSpectrum {
        let len = self.harmonic_count().max(rhs.harmonic_count()).min(MAX_HARMONICS);
        let amplitudes = (1..=len)
            .map(|h| self.amplitude(h) + rhs.amplitude(h))
            .collect();
        HarmonicSpectrum { amplitudes }
    }
}

/// Canonical waveform shapes, each expressed as a finite harmonic series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
    Sawtooth,
    Pulse,
}

impl Waveform {
    pub const ALL: [Waveform; 5] = [
        Waveform::Sine,
        Waveform::Triangle,
        Waveform::Square,
        Waveform::Sawtooth,
        Waveform::Pulse,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Triangle => "triangle",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Pulse => "pulse",
        }
    }

    /// Band-limited spectrum using partials `1..=harmonics`.
    ///
    /// `harmonics` is clamped into `[1, MAX_HARMONICS]`. Sine ignores it.
    pub fn spectrum(self, harmonics: usize) -> HarmonicSpectrum {
        let harmonics = harmonics.clamp(1, MAX_HARMONICS);
        let amplitudes = match self {
            Waveform::Sine => vec![1.0],
            Waveform::Triangle => {
                let mut sign = 1.0;
                (1..=harmonics)
                    .map(|i| {
                        if i % 2 == 1 {
                            let a = sign / (i * i) as f32;
                            sign = -sign;
                            a
                        } else {
                            0.0
                        }
                    })
                    .collect()
            }
            Waveform::Square => (1..=harmonics)
                .map(|i| if i % 2 == 1 { 1.0 / i as f32 } else { 0.0 })
                .collect(),
            Waveform::Sawtooth => (1..=harmonics).map(|i| 1.0 / i as f32).collect(),
            Waveform::Pulse => vec![1.0; harmonics],
        };
        HarmonicSpectrum { amplitudes }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Waveform {
    type Err = OscillatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Waveform::ALL
            .into_iter()
            .find(|w| w.name() == s)
            .ok_or_else(|| OscillatorError::UnknownWaveformName(s.to_string()))
    }
}
