use std::sync::Arc;

use crate::allophone::{Allophone, AllophoneAlphabet, AllophoneState, AllophoneStateAlphabet};
use crate::hmm::{HmmTopology, HmmTopologySet};
use crate::lexicon::PhonemeInventory;
use crate::phonology::Phonology;
use crate::types::AllophoneIndex;

/// Everything a state tying needs to know about allophone states.
#[derive(Debug, Clone)]
pub struct ClassicStateModel {
    phonology: Arc<Phonology>,
    allophones: Arc<AllophoneAlphabet>,
    allophone_states: Arc<AllophoneStateAlphabet>,
    hmm: Arc<HmmTopologySet>,
    conditions: Vec<String>,
}

impl ClassicStateModel {
    pub fn new(
        phonology: Arc<Phonology>,
        allophones: Arc<AllophoneAlphabet>,
        allophone_states: Arc<AllophoneStateAlphabet>,
        hmm: Arc<HmmTopologySet>,
        conditions: Vec<String>,
    ) -> ClassicStateModel {
        ClassicStateModel {
            phonology,
            allophones,
            allophone_states,
            hmm,
            conditions,
        }
    }

    #[inline(always)]
    pub fn phonology(&self) -> &Arc<Phonology> {
        &self.phonology
    }

    #[inline(always)]
    pub fn phoneme_inventory(&self) -> &Arc<PhonemeInventory> {
        self.phonology.inventory()
    }

    #[inline(always)]
    pub fn allophone_alphabet(&self) -> &Arc<AllophoneAlphabet> {
        &self.allophones
    }

    #[inline(always)]
    pub fn allophone_state_alphabet(&self) -> &Arc<AllophoneStateAlphabet> {
        &self.allophone_states
    }

    #[inline(always)]
    pub fn hmm_topologies(&self) -> &Arc<HmmTopologySet> {
        &self.hmm
    }

    #[inline(always)]
    pub fn hmm_topology(&self, allophone: &Allophone) -> &HmmTopology {
        self.hmm.get(allophone.central)
    }

    /// Names of the conditions holding for this model.
    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    pub fn has_condition(&self, name: &str) -> bool {
        self.conditions.iter().any(|c| c == name)
    }

    pub fn allophone_state(&self, index: AllophoneIndex, state: u8) -> AllophoneState {
        self.allophone_states.allophone_state_of(index, state)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::HmmConfig;
    use crate::lexicon::Lexicon;

    /// Model over {sil, a, b} with window 1/1, all allophones added.
    pub(crate) fn model(conditions: &[&str]) -> Arc<ClassicStateModel> {
        let mut pi = PhonemeInventory::new();
        pi.add("sil", false).unwrap();
        pi.add("a", true).unwrap();
        pi.add("b", true).unwrap();
        let mut lexicon = Lexicon::new(pi);
        lexicon.add_lemma(["[SILENCE]"], &["sil"], Some("silence")).unwrap();

        let phonology = Arc::new(Phonology::new(
            Arc::clone(lexicon.phoneme_inventory()),
            1,
            1,
            false,
        ));
        let mut allophones = AllophoneAlphabet::new(Arc::clone(&phonology));
        allophones.add_all().unwrap();
        allophones.set_silence(&lexicon);
        let allophones = Arc::new(allophones);
        let hmm = Arc::new(HmmTopologySet::new(&HmmConfig::default(), allophones.silence()).unwrap());
        let states = Arc::new(AllophoneStateAlphabet::new(
            Arc::clone(&allophones),
            Arc::clone(&hmm),
        ));
        Arc::new(ClassicStateModel::new(
            phonology,
            allophones,
            states,
            hmm,
            conditions.iter().map(|c| c.to_string()).collect(),
        ))
    }

    #[test]
    fn conditions_are_looked_up_by_name() {
        let model = model(&["female"]);
        assert!(model.has_condition("female"));
        assert!(!model.has_condition("male"));
        assert_eq!(model.allophone_state_alphabet().n_classes(), 100);
    }
}
