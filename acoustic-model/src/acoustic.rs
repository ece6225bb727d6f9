use std::sync::Arc;

use crate::allophone::{AllophoneAlphabet, AllophoneStateAlphabet};
use crate::config::AcousticModelConfig;
use crate::dependency::DependencySet;
use crate::error::{Error, Result};
use crate::hmm::HmmTopologySet;
use crate::lexicon::Lexicon;
use crate::model::ClassicStateModel;
use crate::phonology::Phonology;
use crate::state_tying::{ClassicStateTying, StateTyingRegistry};
use crate::transition::TransitionModel;
use crate::types::PhonemeId;

/// Anything that scores feature vectors against a fixed number of mixtures.
pub trait FeatureScorer {
    fn n_mixtures(&self) -> u32;
}

/// Allophones, HMM topologies, state tying and transition model built
/// from one configuration and lexicon.
#[derive(Debug)]
pub struct AcousticModel {
    lexicon: Arc<Lexicon>,
    model: Arc<ClassicStateModel>,
    state_tying: ClassicStateTying,
    transition_model: TransitionModel,
}

impl AcousticModel {
    pub fn build(config: &AcousticModelConfig, lexicon: Lexicon) -> Result<AcousticModel> {
        AcousticModel::build_with_registry(config, lexicon, &StateTyingRegistry::default())
    }

    pub fn build_with_registry(
        config: &AcousticModelConfig,
        lexicon: Lexicon,
        registry: &StateTyingRegistry,
    ) -> Result<AcousticModel> {
        let lexicon = Arc::new(lexicon);
        let phonology = Arc::new(Phonology::new(
            Arc::clone(lexicon.phoneme_inventory()),
            config.phonology.history_length as usize,
            config.phonology.future_length as usize,
            config.hmm.across_word_model,
        ));

        let mut allophones = AllophoneAlphabet::new(Arc::clone(&phonology));
        allophones.set_silence(&lexicon);
        if allophones.silence().is_none() {
            log::warn!("lexicon has no silence lemma");
        }
        let population = &config.allophones;
        if let Some(path) = &population.add_from_file {
            log::info!("add allophones from {}", path.display());
            allophones.load(path)?;
        }
        if population.add_from_lexicon {
            allophones.add_from_lexicon(&lexicon)?;
        }
        if population.add_all {
            allophones.add_all()?;
        }
        if allophones.is_empty() {
            return Err(Error::Config("allophone alphabet is empty".to_string()));
        }
        if let Some(path) = &population.store_to_file {
            allophones.store(path)?;
        }
        let allophones = Arc::new(allophones);

        let hmm = Arc::new(HmmTopologySet::new(&config.hmm, allophones.silence())?);
        let states = Arc::new(AllophoneStateAlphabet::new(
            Arc::clone(&allophones),
            Arc::clone(&hmm),
        ));
        let model = Arc::new(ClassicStateModel::new(
            phonology,
            allophones,
            states,
            hmm,
            config.conditions.clone(),
        ));

        let state_tying = registry.build(&config.state_tying, Arc::clone(&model))?;
        let transition_model = TransitionModel::new(&config.tdp, Arc::clone(&model), registry, &config.state_tying)?;
        Ok(AcousticModel {
            lexicon,
            model,
            state_tying,
            transition_model,
        })
    }

    #[inline(always)]
    pub fn lexicon(&self) -> &Arc<Lexicon> {
        &self.lexicon
    }

    #[inline(always)]
    pub fn state_model(&self) -> &Arc<ClassicStateModel> {
        &self.model
    }

    #[inline(always)]
    pub fn phonology(&self) -> &Arc<Phonology> {
        self.model.phonology()
    }

    #[inline(always)]
    pub fn allophone_alphabet(&self) -> &Arc<AllophoneAlphabet> {
        self.model.allophone_alphabet()
    }

    #[inline(always)]
    pub fn allophone_state_alphabet(&self) -> &Arc<AllophoneStateAlphabet> {
        self.model.allophone_state_alphabet()
    }

    #[inline(always)]
    pub fn hmm_topologies(&self) -> &Arc<HmmTopologySet> {
        self.model.hmm_topologies()
    }

    #[inline(always)]
    pub fn state_tying(&self) -> &ClassicStateTying {
        &self.state_tying
    }

    #[inline(always)]
    pub fn transition_model(&self) -> &TransitionModel {
        &self.transition_model
    }

    pub fn silence(&self) -> Option<PhonemeId> {
        self.allophone_alphabet().silence()
    }

    pub fn is_across_word_model_enabled(&self) -> bool {
        self.hmm_topologies().is_across_word_model_enabled()
    }

    pub fn emission_count(&self) -> u32 {
        self.state_tying.n_classes()
    }

    /// Checks that `scorer` has one mixture per emission class.
    pub fn set_feature_scorer(&self, scorer: &dyn FeatureScorer) -> bool {
        let mixtures = scorer.n_mixtures();
        if mixtures != self.emission_count() {
            log::error!(
                "mismatch in dimension: state tying has {} classes, feature scorer has {} mixtures",
                self.emission_count(),
                mixtures
            );
            return false;
        }
        true
    }

    pub fn dependencies(&self) -> DependencySet {
        let mut set = DependencySet::new();
        set.add_set("phonology", self.phonology().dependencies());
        set.add_set("allophones", self.allophone_alphabet().dependencies());
        set.add_set("hmm", self.hmm_topologies().dependencies());
        set.add_set("state-tying", self.state_tying.dependencies());
        set.add_set("transition-model", self.transition_model.dependencies());
        set
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::StateTyingType;
    use crate::lexicon::tests::LEXICON_XML;
    use std::str::FromStr;

    pub(crate) fn acoustic_model(config: &str) -> AcousticModel {
        let config = AcousticModelConfig::from_str(config).unwrap();
        let lexicon = Lexicon::from_bytes(LEXICON_XML.as_bytes()).unwrap();
        AcousticModel::build(&config, lexicon).unwrap()
    }

    struct Mixtures(u32);

    impl FeatureScorer for Mixtures {
        fn n_mixtures(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn builds_from_lexicon() {
        let am = acoustic_model("{}");
        assert_eq!(am.silence(), am.lexicon().phoneme_inventory().by_symbol("si"));
        assert!(!am.is_across_word_model_enabled());
        assert_eq!(am.state_tying().kind(), StateTyingType::Monophone);
        // si has one state, a and b three each
        assert_eq!(am.emission_count(), 7);
        assert!(am.allophone_alphabet().len() > 0);
    }

    #[test]
    fn feature_scorer_must_match_the_class_count() {
        let am = acoustic_model("{}");
        assert!(am.set_feature_scorer(&Mixtures(7)));
        assert!(!am.set_feature_scorer(&Mixtures(8)));
    }

    #[test]
    fn dependencies_change_with_the_configuration() {
        let a = acoustic_model("{}");
        let b = acoustic_model(r#"{ "tdp": { "models": { "state-0": { "loop": 1.0 } } } }"#);
        assert!(a.dependencies().satisfies(&a.dependencies()));
        assert!(!a.dependencies().satisfies(&b.dependencies()));
    }

    #[test]
    fn allophones_are_stored_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("allophones.txt");
        let config = format!(
            r#"{{ "allophones": {{ "store-to-file": {:?} }} }}"#,
            path.to_str().unwrap()
        );
        let am = acoustic_model(&config);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.lines().next(),
            Some(format!("# Number of allophones: {}", am.allophone_alphabet().len()).as_str())
        );
    }

    #[test]
    fn unsupported_tying_is_an_error() {
        let config = AcousticModelConfig::from_str(r#"{ "state-tying": { "type": "old-cart" } }"#).unwrap();
        let lexicon = Lexicon::from_bytes(LEXICON_XML.as_bytes()).unwrap();
        assert!(matches!(
            AcousticModel::build(&config, lexicon),
            Err(Error::UnsupportedStateTying(_))
        ));
    }
}
