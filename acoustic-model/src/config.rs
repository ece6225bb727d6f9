//! Configuration of an acoustic model, read from a JSON document.
//!
//! Every field is optional; missing fields take the defaults given by the
//! `default()` constructors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AcousticModelConfig {
    pub phonology: PhonologyConfig,
    pub allophones: AllophoneAlphabetConfig,
    pub hmm: HmmConfig,
    pub state_tying: StateTyingConfig,
    pub tdp: TransitionModelConfig,
    /// Names of the conditions that hold for this model, queried by decision trees.
    pub conditions: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PhonologyConfig {
    pub history_length: u32,
    pub future_length: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AllophoneAlphabetConfig {
    pub add_from_file: Option<PathBuf>,
    pub add_from_lexicon: bool,
    pub add_all: bool,
    pub store_to_file: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HmmConfig {
    pub states_per_phone: u8,
    pub state_repetitions: u8,
    pub across_word_model: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StateTyingType {
    #[serde(rename = "none")]
    NoTying,
    Monophone,
    Lut,
    Cart,
    OldCart,
}

impl StateTyingType {
    pub fn name(&self) -> &'static str {
        match self {
            StateTyingType::NoTying => "none",
            StateTyingType::Monophone => "monophone",
            StateTyingType::Lut => "lut",
            StateTyingType::Cart => "cart",
            StateTyingType::OldCart => "old-cart",
        }
    }
}

impl std::str::FromStr for StateTyingType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(StateTyingType::NoTying),
            "monophone" => Ok(StateTyingType::Monophone),
            "lut" => Ok(StateTyingType::Lut),
            "cart" => Ok(StateTyingType::Cart),
            "old-cart" => Ok(StateTyingType::OldCart),
            other => Err(format!("unknown state tying type: {}", other)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StateTyingConfig {
    #[serde(rename = "type")]
    pub type_: StateTyingType,
    pub file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionTyingType {
    Global,
    GlobalAndNonword,
    Cart,
}

/// Negative log probabilities of the four transition types.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransitionScores {
    #[serde(rename = "loop")]
    pub loop_: f32,
    pub forward: f32,
    pub skip: f32,
    pub exit: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TransitionModelConfig {
    pub tying_type: TransitionTyingType,
    pub scale: f32,
    /// Scores per model name (`entry-m1`, `silence`, `state-0`, `state-3-0`, ...).
    pub models: BTreeMap<String, TransitionScores>,
    /// JSON file with scores per model name, overriding `models`.
    pub file: Option<PathBuf>,
    pub nonword_phones: Vec<String>,
    /// State tying used by the `cart` tying type. Falls back to the model's tying.
    pub state_tying: Option<StateTyingConfig>,
}

impl AcousticModelConfig {
    pub const fn default() -> AcousticModelConfig {
        AcousticModelConfig {
            phonology: PhonologyConfig::default(),
            allophones: AllophoneAlphabetConfig::default(),
            hmm: HmmConfig::default(),
            state_tying: StateTyingConfig::default(),
            tdp: TransitionModelConfig::default(),
            conditions: Vec::new(),
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<AcousticModelConfig> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

impl std::str::FromStr for AcousticModelConfig {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<AcousticModelConfig> {
        Ok(serde_json::from_str(s)?)
    }
}

impl PhonologyConfig {
    pub const fn default() -> PhonologyConfig {
        PhonologyConfig {
            history_length: 1,
            future_length: 1,
        }
    }
}

impl AllophoneAlphabetConfig {
    pub const fn default() -> AllophoneAlphabetConfig {
        AllophoneAlphabetConfig {
            add_from_file: None,
            add_from_lexicon: true,
            add_all: false,
            store_to_file: None,
        }
    }
}

impl HmmConfig {
    pub const fn default() -> HmmConfig {
        HmmConfig {
            states_per_phone: 3,
            state_repetitions: 2,
            across_word_model: false,
        }
    }
}

impl StateTyingConfig {
    pub const fn default() -> StateTyingConfig {
        StateTyingConfig {
            type_: StateTyingType::Monophone,
            file: None,
        }
    }
}

impl TransitionScores {
    pub const fn default() -> TransitionScores {
        TransitionScores {
            loop_: 3.0,
            forward: 0.0,
            skip: 3.0,
            exit: 0.0,
        }
    }
}

impl TransitionModelConfig {
    pub const fn default() -> TransitionModelConfig {
        TransitionModelConfig {
            tying_type: TransitionTyingType::Global,
            scale: 1.0,
            models: BTreeMap::new(),
            file: None,
            nonword_phones: Vec::new(),
            state_tying: None,
        }
    }

    /// Configured scores for a named model, or the defaults.
    pub fn scores(&self, name: &str) -> TransitionScores {
        self.models
            .get(name)
            .copied()
            .unwrap_or_else(TransitionScores::default)
    }
}

macro_rules! impl_default {
    ($($ty:ident),*) => {
        $(
            impl Default for $ty {
                fn default() -> Self {
                    $ty::default()
                }
            }
        )*
    };
}

impl_default!(
    AcousticModelConfig,
    PhonologyConfig,
    AllophoneAlphabetConfig,
    HmmConfig,
    StateTyingConfig,
    TransitionScores,
    TransitionModelConfig
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn empty_document_gives_defaults() {
        let config = AcousticModelConfig::from_str("{}").unwrap();
        assert_eq!(config.phonology.history_length, 1);
        assert_eq!(config.hmm.states_per_phone, 3);
        assert_eq!(config.hmm.state_repetitions, 2);
        assert!(!config.hmm.across_word_model);
        assert!(config.allophones.add_from_lexicon);
        assert_eq!(config.state_tying.type_, StateTyingType::Monophone);
        assert_eq!(config.tdp.tying_type, TransitionTyingType::Global);
    }

    #[test]
    fn partial_scores_keep_defaults() {
        let config = AcousticModelConfig::from_str(
            r#"{
                "hmm": { "across-word-model": true },
                "state-tying": { "type": "cart", "file": "tree.json" },
                "tdp": { "tying-type": "global-and-nonword", "models": { "silence": { "loop": 1.5 } } }
            }"#,
        )
        .unwrap();
        assert!(config.hmm.across_word_model);
        assert_eq!(config.state_tying.type_, StateTyingType::Cart);
        let silence = config.tdp.scores("silence");
        assert_eq!(silence.loop_, 1.5);
        assert_eq!(silence.skip, 3.0);
        assert_eq!(config.tdp.scores("state-0"), TransitionScores::default());
    }
}
