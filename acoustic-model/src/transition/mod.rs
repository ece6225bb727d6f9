//! Time distortion penalties: loop, forward, skip and exit scores per
//! class of HMM state.

mod apply;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use hashbrown::HashSet;
use smol_str::SmolStr;

use crate::allophone::{AllophoneState, AllophoneStateAlphabet, Boundary};
use crate::allophone::Allophone;
use crate::config::{StateTyingConfig, TransitionModelConfig, TransitionScores, TransitionTyingType};
use crate::dependency::DependencySet;
use crate::error::{Error, Result};
use crate::fsa::StaticAutomaton;
use crate::model::ClassicStateModel;
use crate::state_tying::{ClassicStateTying, StateTyingRegistry};
use crate::types::{AllophoneStateIndex, EmissionIndex, Label, Weight};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionType {
    Loop = 0,
    Forward = 1,
    Skip = 2,
    Exit = 3,
}

impl TransitionType {
    pub const ALL: [TransitionType; 4] = [
        TransitionType::Loop,
        TransitionType::Forward,
        TransitionType::Skip,
        TransitionType::Exit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TransitionType::Loop => "loop",
            TransitionType::Forward => "forward",
            TransitionType::Skip => "skip",
            TransitionType::Exit => "exit",
        }
    }
}

/// Index of a [`StateTransitionModel`] within a [`TransitionModel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct StateType(pub(crate) u32);

impl StateType {
    pub const ENTRY_M1: Self = StateType(0);
    pub const ENTRY_M2: Self = StateType(1);
    pub const SILENCE: Self = StateType(2);
    pub const PHONE_0: Self = StateType(3);
    pub const PHONE_1: Self = StateType(4);
    pub const NONWORD_0: Self = StateType(5);
    pub const NONWORD_1: Self = StateType(6);

    #[inline(always)]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn clip(score: f32) -> f32 {
    score.max(-f32::MAX).min(f32::MAX)
}

/// Scores of the four transition types for one class of states.
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransitionModel {
    name: SmolStr,
    scores: [f32; 4],
}

impl StateTransitionModel {
    pub fn new(name: &str) -> StateTransitionModel {
        StateTransitionModel {
            name: name.into(),
            scores: [0.0; 4],
        }
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn load(&mut self, scores: &TransitionScores, scale: f32) {
        let raw = [scores.loop_, scores.forward, scores.skip, scores.exit];
        for (score, raw) in self.scores.iter_mut().zip(raw.iter()) {
            *score = clip(scale * raw);
            debug_assert!(!score.is_nan());
        }
    }

    pub fn clear(&mut self) {
        self.scores = [0.0; 4];
    }

    #[inline(always)]
    pub fn get(&self, t: TransitionType) -> Weight {
        Weight(self.scores[t as usize])
    }

    #[inline(always)]
    pub fn set(&mut self, t: TransitionType, weight: Weight) {
        self.scores[t as usize] = weight.0;
    }

    pub fn dependency_value(&self) -> String {
        TransitionType::ALL
            .iter()
            .map(|&t| format!("{}={:.6}", t.name(), self.scores[t as usize]))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl std::ops::AddAssign<&StateTransitionModel> for StateTransitionModel {
    fn add_assign(&mut self, other: &StateTransitionModel) {
        for (score, other) in self.scores.iter_mut().zip(other.scores.iter()) {
            *score = clip(*score + other);
        }
    }
}

#[derive(Debug)]
pub enum TransitionModelKind {
    /// One class per sub-state, whatever the phoneme.
    Global,
    /// Like global, with separate classes for the states of non-word phonemes.
    NonWordAware {
        nonword_states: HashSet<AllophoneStateIndex>,
    },
    /// One class per emission class of a state tying.
    Cart { tying: ClassicStateTying },
}

#[derive(Debug)]
pub struct TransitionModel {
    model: Arc<ClassicStateModel>,
    kind: TransitionModelKind,
    models: Vec<StateTransitionModel>,
    scale: f32,
}

impl TransitionModel {
    /// Builds and loads a transition model. `default_tying` is used by the
    /// `cart` tying type when the configuration names no state tying of its own.
    pub fn new(
        config: &TransitionModelConfig,
        model: Arc<ClassicStateModel>,
        registry: &StateTyingRegistry,
        default_tying: &StateTyingConfig,
    ) -> Result<TransitionModel> {
        let mut names = vec!["entry-m1".to_string(), "entry-m2".to_string(), "silence".to_string()];
        let kind = match config.tying_type {
            TransitionTyingType::Global => {
                names.extend(["state-0".to_string(), "state-1".to_string()]);
                TransitionModelKind::Global
            }
            TransitionTyingType::GlobalAndNonword => {
                names.extend(["state-0", "state-1", "nonword-0", "nonword-1"].iter().map(|s| s.to_string()));
                TransitionModelKind::NonWordAware {
                    nonword_states: nonword_states(&model, &config.nonword_phones),
                }
            }
            TransitionTyingType::Cart => {
                let tying_config = config.state_tying.as_ref().unwrap_or(default_tying);
                let tying = registry.build(tying_config, Arc::clone(&model))?;
                // class 0 is silence and shares the silence model
                names.extend((1..tying.n_classes()).map(|c| format!("state-{}-0", c)));
                TransitionModelKind::Cart { tying }
            }
        };

        let mut tm = TransitionModel {
            model,
            kind,
            models: names.iter().map(|n| StateTransitionModel::new(n)).collect(),
            scale: config.scale,
        };
        tm.load(config)?;
        Ok(tm)
    }

    fn load(&mut self, config: &TransitionModelConfig) -> Result<()> {
        let from_file: BTreeMap<String, TransitionScores> = match &config.file {
            Some(path) => {
                log::info!("load transition scores from {}", path.display());
                let file = std::fs::File::open(path)?;
                serde_json::from_reader(std::io::BufReader::new(file))?
            }
            None => BTreeMap::new(),
        };
        for m in self.models.iter_mut() {
            let scores = from_file
                .get(m.name())
                .copied()
                .unwrap_or_else(|| config.scores(m.name()));
            m.load(&scores, config.scale);
        }
        if let Some(unknown) = from_file
            .keys()
            .find(|name| !self.models.iter().any(|m| m.name() == name.as_str()))
        {
            return Err(Error::TransitionModel(format!(
                "scores given for unknown model `{}`",
                unknown
            )));
        }
        self.correct();
        Ok(())
    }

    #[inline(always)]
    pub fn kind(&self) -> &TransitionModelKind {
        &self.kind
    }

    #[inline(always)]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    #[inline(always)]
    pub fn n_models(&self) -> usize {
        self.models.len()
    }

    #[inline(always)]
    pub fn models(&self) -> &[StateTransitionModel] {
        &self.models
    }

    pub fn get(&self, t: StateType) -> &StateTransitionModel {
        &self.models[t.0 as usize]
    }

    pub fn get_mut(&mut self, t: StateType) -> &mut StateTransitionModel {
        &mut self.models[t.0 as usize]
    }

    /// The state tying behind a `cart` transition model.
    pub fn state_tying(&self) -> Option<&ClassicStateTying> {
        match &self.kind {
            TransitionModelKind::Cart { tying } => Some(tying),
            _ => None,
        }
    }

    /// Transition class of an allophone state. Under `cart` tying a state
    /// whose emission class has no model is an error.
    pub fn classify(&self, state: &AllophoneState, sub_state: u8) -> Result<StateType> {
        let sub = sub_state.min(1) as u32;
        Ok(match &self.kind {
            TransitionModelKind::Cart { tying } => {
                let emission = tying.classify(state);
                if !emission.is_valid() {
                    return Err(Error::TransitionModel(format!(
                        "state tying has no class for {}",
                        self.model.allophone_state_alphabet().format(state)
                    )));
                }
                self.cart_class(emission)?
            }
            _ if self.model.allophone_alphabet().is_silence(state.allophone()) => StateType::SILENCE,
            TransitionModelKind::NonWordAware { nonword_states }
                if nonword_states.contains(&AllophoneStateAlphabet::pack(state.allophone_index(), state.state())) =>
            {
                StateType(StateType::NONWORD_0.0 + sub)
            }
            _ => StateType(StateType::PHONE_0.0 + sub),
        })
    }

    pub fn classify_index(&self, id: AllophoneStateIndex) -> Result<StateType> {
        let state = self.model.allophone_state_alphabet().allophone_state(id);
        self.classify(&state, 0)
    }

    /// Model of an emission class under `cart` tying, one past silence.
    pub(crate) fn cart_class(&self, emission: EmissionIndex) -> Result<StateType> {
        match StateType::SILENCE.0.checked_add(emission.value()) {
            Some(t) if emission.is_valid() && (t as usize) < self.models.len() => Ok(StateType(t)),
            _ => Err(Error::TransitionModel(format!(
                "no transition model for emission class {}",
                emission.value()
            ))),
        }
    }

    /// Forbids loops in the entry states. Returns whether nothing needed fixing.
    pub fn correct(&mut self) -> bool {
        let mut ok = true;
        for t in [StateType::ENTRY_M1, StateType::ENTRY_M2] {
            let m = &mut self.models[t.0 as usize];
            let score = m.get(TransitionType::Loop);
            if !score.is_max() {
                ok = false;
                log::warn!(
                    "changing loop probability for entry state {} to zero, was: {}",
                    m.name(),
                    (-score.0).exp()
                );
                m.set(TransitionType::Loop, Weight::MAX);
            }
        }
        ok
    }

    pub fn clear(&mut self) {
        for m in self.models.iter_mut() {
            m.clear();
        }
    }

    /// Adds the scores of a model of the same shape, then corrects.
    pub fn combine(&mut self, other: &TransitionModel) -> Result<()> {
        if self.models.len() != other.models.len() {
            return Err(Error::TransitionModel(format!(
                "cannot combine transition models with {} and {} classes",
                self.models.len(),
                other.models.len()
            )));
        }
        for (m, o) in self.models.iter_mut().zip(other.models.iter()) {
            *m += o;
        }
        self.correct();
        Ok(())
    }

    pub fn dependencies(&self) -> DependencySet {
        let mut scores = DependencySet::new();
        for m in self.models.iter() {
            scores.add_value(m.name(), m.dependency_value());
        }
        let mut set = DependencySet::new();
        set.add_set("tdp", scores);
        if let Some(tying) = self.state_tying() {
            set.add_set("state-tying", tying.dependencies());
        }
        set
    }

    /// Adds loop, skip and exit transitions to a flat automaton whose input
    /// labels are emissions or allophone states, then trims the result.
    pub fn apply(
        &self,
        input: &StaticAutomaton,
        silence_label: Label,
        apply_exit_to_final_states: bool,
    ) -> Result<StaticAutomaton> {
        Ok(apply::Applicator::new(self, input, silence_label, apply_exit_to_final_states)?.run())
    }
}

fn nonword_states(model: &ClassicStateModel, patterns: &[String]) -> HashSet<AllophoneStateIndex> {
    let pi = model.phoneme_inventory();
    let allophones = model.allophone_alphabet();
    let mut states = HashSet::new();
    for pattern in patterns.iter() {
        for phoneme in pi.selection(pattern) {
            let allophone = Allophone::new(phoneme, Boundary::INITIAL_FINAL);
            if allophones.is_silence(&allophone) {
                continue;
            }
            let index = match allophones.index(&allophone) {
                Some(index) => index,
                None => {
                    log::warn!("non-word allophone {} is not in the alphabet", allophones.format(&allophone));
                    continue;
                }
            };
            log::info!("using non-word scores for allophone {}", allophones.format(&allophone));
            for state in 0..model.hmm_topology(&allophone).n_phone_states() {
                states.insert(AllophoneStateAlphabet::pack(index, state));
            }
        }
    }
    if states.is_empty() {
        log::warn!("no non-word phone defined");
    }
    states
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::StateTyingType;
    use crate::fsa::AlphabetKind;
    use crate::model::tests::model;
    use std::io::Write;

    pub(crate) fn global(model: Arc<ClassicStateModel>) -> TransitionModel {
        TransitionModel::new(
            &TransitionModelConfig::default(),
            model,
            &StateTyingRegistry::default(),
            &StateTyingConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn global_classes_depend_on_the_sub_state_only() {
        let model = model(&[]);
        let tm = global(Arc::clone(&model));
        assert_eq!(tm.n_models(), 5);
        for state in model.allophone_state_alphabet().allophone_states() {
            if model.allophone_alphabet().is_silence(state.allophone()) {
                assert_eq!(tm.classify(&state, 0).unwrap(), StateType::SILENCE);
                continue;
            }
            assert_eq!(tm.classify(&state, 0).unwrap(), StateType::PHONE_0);
            assert_eq!(tm.classify(&state, 1).unwrap(), StateType::PHONE_1);
        }
    }

    #[test]
    fn entry_loops_are_corrected() {
        let model = model(&[]);
        let mut tm = global(model);
        assert!(tm.get(StateType::ENTRY_M1).get(TransitionType::Loop).is_max());
        assert!(tm.correct());

        tm.get_mut(StateType::ENTRY_M2).set(TransitionType::Loop, Weight(1.0));
        assert!(!tm.correct());
        assert!(tm.get(StateType::ENTRY_M2).get(TransitionType::Loop).is_max());
        assert!(tm.correct());
    }

    #[test]
    fn scores_are_scaled_and_clipped() {
        let mut config = TransitionModelConfig::default();
        config.scale = 2.0;
        config.models.insert(
            "state-0".to_string(),
            TransitionScores {
                loop_: 1.0,
                forward: 0.5,
                skip: f32::MAX,
                exit: 0.0,
            },
        );
        let tm = TransitionModel::new(
            &config,
            model(&[]),
            &StateTyingRegistry::default(),
            &StateTyingConfig::default(),
        )
        .unwrap();
        let m = tm.get(StateType::PHONE_0);
        assert_eq!(m.get(TransitionType::Loop), Weight(2.0));
        assert_eq!(m.get(TransitionType::Forward), Weight(1.0));
        assert_eq!(m.get(TransitionType::Skip), Weight::MAX);
        assert_eq!(tm.get(StateType::PHONE_1).get(TransitionType::Loop), Weight(6.0));
        assert_eq!(
            m.dependency_value(),
            format!("loop=2.000000; forward=1.000000; skip={:.6}; exit=0.000000", f32::MAX)
        );
    }

    #[test]
    fn nonword_phones_get_their_own_classes() {
        let model = model(&[]);
        let mut config = TransitionModelConfig::default();
        config.tying_type = TransitionTyingType::GlobalAndNonword;
        config.nonword_phones = vec!["b".to_string(), "si*".to_string()];
        let tm = TransitionModel::new(
            &config,
            Arc::clone(&model),
            &StateTyingRegistry::default(),
            &StateTyingConfig::default(),
        )
        .unwrap();
        assert_eq!(tm.n_models(), 7);

        let states = model.allophone_state_alphabet();
        let noise = states.allophone_alphabet().parse("b{#+#}@i@f").unwrap();
        let noise = states.allophone_state(states.index_of(&noise, 1).unwrap());
        assert_eq!(tm.classify(&noise, 1).unwrap(), StateType::NONWORD_1);
        let word = states.allophone_alphabet().parse("b{a+#}@f").unwrap();
        let word = states.allophone_state(states.index_of(&word, 1).unwrap());
        assert_eq!(tm.classify(&word, 0).unwrap(), StateType::PHONE_0);
    }

    #[test]
    fn cart_models_follow_the_state_tying() {
        let model = model(&[]);
        let mut config = TransitionModelConfig::default();
        config.tying_type = TransitionTyingType::Cart;
        let monophone = StateTyingConfig {
            type_: StateTyingType::Monophone,
            file: None,
        };
        let tm = TransitionModel::new(&config, Arc::clone(&model), &StateTyingRegistry::default(), &monophone).unwrap();
        // entry-m1, entry-m2, silence and six phone classes
        assert_eq!(tm.n_models(), 9);
        assert_eq!(tm.models()[3].name(), "state-1-0");

        let states = model.allophone_state_alphabet();
        let a = states.allophone_alphabet().parse("a{#+#}").unwrap();
        let a2 = states.allophone_state(states.index_of(&a, 2).unwrap());
        assert_eq!(tm.classify(&a2, 0).unwrap(), StateType(StateType::SILENCE.0 + 3));
        let sil = states.allophone_alphabet().parse("sil{#+#}@i@f").unwrap();
        let sil = states.allophone_state(states.index_of(&sil, 0).unwrap());
        assert_eq!(tm.classify(&sil, 0).unwrap(), StateType::SILENCE);
        assert!(tm.dependencies().get("state-tying").is_some());
    }

    #[test]
    fn combining_adds_scores() {
        let model = model(&[]);
        let mut a = global(Arc::clone(&model));
        let b = global(model);
        a.combine(&b).unwrap();
        assert_eq!(a.get(StateType::PHONE_0).get(TransitionType::Loop), Weight(6.0));
        assert!(a.get(StateType::ENTRY_M1).get(TransitionType::Loop).is_max());
    }

    #[test]
    fn cart_classes_without_a_model_are_errors() {
        let model = model(&[]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sil{{#+#}}@i@f.0 0").unwrap();
        writeln!(file, "a{{#+#}}.1 1").unwrap();
        file.flush().unwrap();
        let lut = StateTyingConfig {
            type_: StateTyingType::Lut,
            file: Some(file.path().to_path_buf()),
        };
        let mut config = TransitionModelConfig::default();
        config.tying_type = TransitionTyingType::Cart;
        let tm = TransitionModel::new(&config, Arc::clone(&model), &StateTyingRegistry::default(), &lut).unwrap();
        assert_eq!(tm.n_models(), 4);

        let states = model.allophone_state_alphabet();
        let a = states.allophone_alphabet().parse("a{#+#}").unwrap();
        let a1 = states.allophone_state(states.index_of(&a, 1).unwrap());
        assert_eq!(tm.classify(&a1, 0).unwrap(), StateType(StateType::SILENCE.0 + 1));
        let a2 = states.allophone_state(states.index_of(&a, 2).unwrap());
        assert!(matches!(tm.classify(&a2, 0), Err(Error::TransitionModel(_))));
        assert!(matches!(tm.cart_class(EmissionIndex::new(2)), Err(Error::TransitionModel(_))));
        assert!(matches!(tm.cart_class(EmissionIndex::INVALID), Err(Error::TransitionModel(_))));

        // emission 7 has no transition model
        let mut flat = StaticAutomaton::new(AlphabetKind::Emissions, AlphabetKind::Allophones);
        let s0 = flat.new_state();
        let s1 = flat.new_state();
        flat.set_initial(s0);
        flat.add_arc(s0, s1, Label::from(EmissionIndex::new(1)), Label::EPSILON, Weight::ONE);
        flat.add_arc(s1, s0, Label::from(EmissionIndex::new(7)), Label::EPSILON, Weight::ONE);
        flat.set_final(s0, Weight::ONE);
        let silence = Label::from(EmissionIndex::new(0));
        assert!(matches!(tm.apply(&flat, silence, false), Err(Error::TransitionModel(_))));

        let mut known = StaticAutomaton::new(AlphabetKind::Emissions, AlphabetKind::Allophones);
        let s0 = known.new_state();
        let s1 = known.new_state();
        known.set_initial(s0);
        known.add_arc(s0, s1, Label::from(EmissionIndex::new(1)), Label::EPSILON, Weight::ONE);
        known.set_final(s1, Weight::ONE);
        assert!(tm.apply(&known, silence, false).is_ok());
    }
}
