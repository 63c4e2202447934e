//! Request defaults used when the caller leaves a field unset.

use serde::{Deserialize, Serialize};

/// Defaults for generation requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Number of candidate MIDI files asked of a chords job.
    #[serde(default = "DefaultsConfig::default_n_midi")]
    pub n_midi: u32,

    /// Beats given to each chord when no explicit beat list is sent.
    #[serde(default = "DefaultsConfig::default_beats_per_chord")]
    pub beats_per_chord: u32,

    /// Instrument tag for chords jobs.
    #[serde(default = "DefaultsConfig::default_instrument")]
    pub instrument: String,

    /// Interpolation points for mix-sweep jobs.
    #[serde(default = "DefaultsConfig::default_mix_alphas")]
    pub mix_alphas: Vec<f64>,

    /// Tempo sent when the project has none.
    #[serde(default = "DefaultsConfig::default_bpm")]
    pub bpm: f64,
}

impl DefaultsConfig {
    fn default_n_midi() -> u32 {
        5
    }

    fn default_beats_per_chord() -> u32 {
        4
    }

    fn default_instrument() -> String {
        "piano".to_string()
    }

    fn default_mix_alphas() -> Vec<f64> {
        vec![0.0, 0.25, 0.5, 0.75, 1.0]
    }

    fn default_bpm() -> f64 {
        120.0
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            n_midi: Self::default_n_midi(),
            beats_per_chord: Self::default_beats_per_chord(),
            instrument: Self::default_instrument(),
            mix_alphas: Self::default_mix_alphas(),
            bpm: Self::default_bpm(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = DefaultsConfig::default();
        assert_eq!(defaults.n_midi, 5);
        assert_eq!(defaults.beats_per_chord, 4);
        assert_eq!(defaults.instrument, "piano");
        assert_eq!(defaults.mix_alphas, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(defaults.bpm, 120.0);
    }
}
