use crate::config::HmmConfig;
use crate::dependency::DependencySet;
use crate::error::{Error, Result};
use crate::types::PhonemeId;

/// Shape of the HMM of one phoneme: distinct phone states, each repeated
/// `n_sub_states` times.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HmmTopology {
    n_phone_states: u8,
    n_sub_states: u8,
}

impl HmmTopology {
    pub const fn new(n_phone_states: u8, n_sub_states: u8) -> HmmTopology {
        HmmTopology {
            n_phone_states,
            n_sub_states,
        }
    }

    #[inline(always)]
    pub fn n_phone_states(&self) -> u8 {
        self.n_phone_states
    }

    #[inline(always)]
    pub fn n_sub_states(&self) -> u8 {
        self.n_sub_states
    }
}

#[derive(Clone, Debug)]
pub struct HmmTopologySet {
    default: HmmTopology,
    silence_topology: HmmTopology,
    silence: Option<PhonemeId>,
    across_word_model: bool,
}

impl HmmTopologySet {
    pub fn new(config: &HmmConfig, silence: Option<PhonemeId>) -> Result<HmmTopologySet> {
        if config.states_per_phone == 0 || config.states_per_phone > 16 {
            return Err(Error::Config(format!(
                "states-per-phone must be between 1 and 16, got {}",
                config.states_per_phone
            )));
        }
        Ok(HmmTopologySet {
            default: HmmTopology::new(config.states_per_phone, config.state_repetitions.max(1)),
            silence_topology: HmmTopology::new(1, 1),
            silence,
            across_word_model: config.across_word_model,
        })
    }

    #[inline(always)]
    pub fn get(&self, phoneme: PhonemeId) -> &HmmTopology {
        if Some(phoneme) == self.silence {
            &self.silence_topology
        } else {
            &self.default
        }
    }

    #[inline(always)]
    pub fn default_topology(&self) -> &HmmTopology {
        &self.default
    }

    #[inline(always)]
    pub fn silence(&self) -> Option<PhonemeId> {
        self.silence
    }

    #[inline(always)]
    pub fn is_across_word_model_enabled(&self) -> bool {
        self.across_word_model
    }

    pub fn dependencies(&self) -> DependencySet {
        let mut set = DependencySet::new();
        set.add_value("states-per-phone", self.default.n_phone_states.to_string());
        set.add_value("state-repetitions", self.default.n_sub_states.to_string());
        set.add_value("across-word-model", self.across_word_model.to_string());
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_has_its_own_topology() {
        let set = HmmTopologySet::new(&HmmConfig::default(), Some(PhonemeId::new(1))).unwrap();
        assert_eq!(set.get(PhonemeId::new(1)), &HmmTopology::new(1, 1));
        assert_eq!(set.get(PhonemeId::new(2)), &HmmTopology::new(3, 2));
    }

    #[test]
    fn rejects_unpackable_state_counts() {
        let mut config = HmmConfig::default();
        config.states_per_phone = 17;
        assert!(HmmTopologySet::new(&config, None).is_err());
    }
}
