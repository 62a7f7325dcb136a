use serde::{Deserialize, Serialize};

use crate::error::{OscillatorError, OscillatorResult};
use crate::spectrum::{HarmonicSpectrum, Waveform};
use crate::{
    DEFAULT_FREQUENCY, DEFAULT_HARMONICS, DEFAULT_SAMPLE_RATE, DEFAULT_TABLE_LENGTH,
    MAX_FREQUENCY, MAX_HARMONICS, MAX_TABLE_LENGTH, MIN_TABLE_LENGTH,
};

/// Table lookup strategy for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Truncated-index lookup.
    #[default]
    Nearest,
    /// Linear blend between `floor(phase)` and the next index.
    Linear,
}

/// Construction inputs as supplied by a host.
///
/// Values are taken as-is; call [`OscillatorConfig::sanitize`] to obtain the
/// corrected values the oscillator is actually built with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscillatorConfig {
    /// Initial frequency in Hz.
    pub frequency: f32,
    /// Samples per table cycle.
    pub table_length: i64,
    /// Canonical waveform name. Ignored when `spectrum` is set.
    pub waveform: String,
    /// Number of partials used by the canonical presets.
    pub harmonics: i64,
    /// Explicit weights, fundamental first.
    pub spectrum: Option<Vec<f32>>,
    pub sample_rate: f32,
    pub interpolation: Interpolation,
    /// Rescale each rebuilt table to a peak of 1.0.
    pub normalize: bool,
}

impl Default for OscillatorConfig {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_FREQUENCY,
            table_length: DEFAULT_TABLE_LENGTH as i64,
            waveform: Waveform::Sine.name().to_string(),
            harmonics: DEFAULT_HARMONICS as i64,
            spectrum: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            interpolation: Interpolation::Nearest,
            normalize: true,
        }
    }
}

impl OscillatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> OscillatorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_frequency(mut self, frequency: f32) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_table_length(mut self, table_length: i64) -> Self {
        self.table_length = table_length;
        self
    }

    pub fn with_waveform(mut self, waveform: impl Into<String>) -> Self {
        self.waveform = waveform.into();
        self
    }

    pub fn with_harmonics(mut self, harmonics: i64) -> Self {
        self.harmonics = harmonics;
        self
    }

    pub fn with_spectrum(mut self, weights: Vec<f32>) -> Self {
        self.spectrum = Some(weights);
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Replace every illegal value with its documented default.
    ///
    /// Never fails. Each substitution is reported once in
    /// [`SanitizedConfig::advisories`].
    pub fn sanitize(&self) -> SanitizedConfig {
        let mut advisories = Vec::new();

        let frequency = if self.frequency.is_finite() && self.frequency.abs() <= MAX_FREQUENCY {
            self.frequency
        } else {
            advisories.push(OscillatorError::InvalidFrequency(self.frequency));
            DEFAULT_FREQUENCY
        };

        let table_length = sanitize_table_length(self.table_length).unwrap_or_else(|err| {
            advisories.push(err);
            DEFAULT_TABLE_LENGTH
        });

        let harmonics = if (1..=MAX_HARMONICS as i64).contains(&self.harmonics) {
            self.harmonics as usize
        } else {
            advisories.push(OscillatorError::InvalidHarmonicCount {
                requested: self.harmonics,
            });
            DEFAULT_HARMONICS
        };

        let sample_rate = if self.sample_rate.is_finite() && self.sample_rate > 0.0 {
            self.sample_rate
        } else {
            advisories.push(OscillatorError::InvalidSampleRate(self.sample_rate));
            DEFAULT_SAMPLE_RATE
        };

        let source = match &self.spectrum {
            Some(weights) => {
                let (spectrum, mut notes) = HarmonicSpectrum::from_weights(weights);
                advisories.append(&mut notes);
                SpectrumSource::Explicit(spectrum)
            }
            None => match self.waveform.parse::<Waveform>() {
                Ok(waveform) => SpectrumSource::Preset(waveform),
                Err(err) => {
                    advisories.push(err);
                    SpectrumSource::Preset(Waveform::Sine)
                }
            },
        };

        SanitizedConfig {
            config: ValidatedConfig {
                frequency,
                table_length,
                harmonics,
                source,
                sample_rate,
                interpolation: self.interpolation,
                normalize: self.normalize,
            },
            advisories,
        }
    }
}

/// Checks a requested table length against `[MIN_TABLE_LENGTH, MAX_TABLE_LENGTH]`.
pub fn sanitize_table_length(requested: i64) -> OscillatorResult<usize> {
    if (MIN_TABLE_LENGTH as i64..=MAX_TABLE_LENGTH as i64).contains(&requested) {
        Ok(requested as usize)
    } else {
        Err(OscillatorError::InvalidLength { requested })
    }
}

/// Where the initial waveform comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SpectrumSource {
    Preset(Waveform),
    Explicit(HarmonicSpectrum),
}

impl SpectrumSource {
    pub fn resolve(&self, harmonics: usize) -> HarmonicSpectrum {
        match self {
            SpectrumSource::Preset(waveform) => waveform.spectrum(harmonics),
            SpectrumSource::Explicit(spectrum) => spectrum.clone(),
        }
    }
}

/// Construction inputs after default substitution; every field is in range.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    pub frequency: f32,
    pub table_length: usize,
    pub harmonics: usize,
    pub source: SpectrumSource,
    pub sample_rate: f32,
    pub interpolation: Interpolation,
    pub normalize: bool,
}

#[derive(Debug)]
pub struct SanitizedConfig {
    pub config: ValidatedConfig,
    pub advisories: Vec<OscillatorError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_pass_untouched() {
        let sanitized = OscillatorConfig::default().sanitize();
        assert!(sanitized.advisories.is_empty());
        assert_eq!(sanitized.config.table_length, DEFAULT_TABLE_LENGTH);
        assert_eq!(sanitized.config.source, SpectrumSource::Preset(Waveform::Sine));
        assert_eq!(sanitized.config.frequency, DEFAULT_FREQUENCY);
    }

    #[test]
    fn test_short_table_is_replaced() {
        let sanitized = OscillatorConfig::new().with_table_length(2).sanitize();
        assert_eq!(sanitized.config.table_length, DEFAULT_TABLE_LENGTH);
        assert!(matches!(
            sanitized.advisories[..],
            [OscillatorError::InvalidLength { requested: 2 }]
        ));
    }

    #[test]
    fn test_oversized_table_is_replaced() {
        let sanitized = OscillatorConfig::new()
            .with_table_length(MAX_TABLE_LENGTH as i64 + 1)
            .sanitize();
        assert_eq!(sanitized.config.table_length, DEFAULT_TABLE_LENGTH);

        let sanitized = OscillatorConfig::new()
            .with_table_length(MAX_TABLE_LENGTH as i64)
            .sanitize();
        assert_eq!(sanitized.config.table_length, MAX_TABLE_LENGTH);
    }

    #[test]
    fn test_bad_values_each_get_one_advisory() {
        let sanitized = OscillatorConfig::new()
            .with_frequency(2_000_000.0)
            .with_harmonics(0)
            .with_sample_rate(0.0)
            .with_waveform("wobble")
            .sanitize();

        let config = &sanitized.config;
        assert_eq!(config.frequency, DEFAULT_FREQUENCY);
        assert_eq!(config.harmonics, DEFAULT_HARMONICS);
        assert_eq!(config.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(config.source, SpectrumSource::Preset(Waveform::Sine));
        assert_eq!(sanitized.advisories.len(), 4);
        assert!(sanitized
            .advisories
            .iter()
            .any(|a| matches!(a, OscillatorError::UnknownWaveformName(n) if n == "wobble")));
    }

    #[test]
    fn test_negative_frequency_is_legal() {
        let sanitized = OscillatorConfig::new().with_frequency(-220.0).sanitize();
        assert!(sanitized.advisories.is_empty());
        assert_eq!(sanitized.config.frequency, -220.0);
    }

    #[test]
    fn test_explicit_spectrum_overrides_waveform() {
        let sanitized = OscillatorConfig::new()
            .with_waveform("square")
            .with_spectrum(vec![1.0, 0.0, 0.3])
            .sanitize();
        let spectrum = sanitized.config.source.resolve(sanitized.config.harmonics);
        assert_eq!(spectrum.as_slice(), &[1.0, 0.0, 0.3]);
    }

    #[test]
    fn test_from_json() {
        let config = OscillatorConfig::from_json(
            r#"{ "frequency": 110.0, "table_length": -4, "waveform": "pulse", "interpolation": "linear" }"#,
        )
        .unwrap();
        assert_eq!(config.interpolation, Interpolation::Linear);
        assert_eq!(config.harmonics, DEFAULT_HARMONICS as i64);

        let sanitized = config.sanitize();
        assert_eq!(sanitized.config.table_length, DEFAULT_TABLE_LENGTH);
        assert_eq!(sanitized.config.source, SpectrumSource::Preset(Waveform::Pulse));

        assert!(matches!(
            OscillatorConfig::from_json("{ \"frequency\": \"loud\" }"),
            Err(OscillatorError::Config(_))
        ));
    }
}
