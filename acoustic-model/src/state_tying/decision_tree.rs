use std::path::Path;

use crate::allophone::AllophoneState;
use itertools::Itertools;

use crate::cart::{Answer, DecisionTree, Properties, PropertyMap, ValueIndex};
use crate::dependency::DependencySet;
use crate::error::Result;
use crate::model::ClassicStateModel;
use crate::types::{EmissionIndex, PhonemeId};

const BOUNDARY_VALUES: [&str; 4] = [
    "within-lemma",
    "begin-of-lemma",
    "end-of-lemma",
    "single-phoneme-lemma",
];
const CONDITION_VALUES: [&str; 2] = ["false", "true"];

/// Keys and values of allophone-state properties as questions see them.
///
/// Keys in order: `hmm-state`, `boundary`, `history[H-1]` .. `history[0]`,
/// `central`, `future[0]` .. `future[F-1]`, then one key per condition.
/// Phoneme-valued keys use `#` for a missing context phoneme.
pub fn standard_property_map(model: &ClassicStateModel) -> PropertyMap {
    let pi = model.phoneme_inventory();
    let phonemes: Vec<&str> = std::iter::once("#")
        .chain(pi.iter().map(|p| p.symbol()))
        .collect();
    let states: Vec<String> = (0..model.hmm_topologies().default_topology().n_phone_states())
        .map(|s| s.to_string())
        .collect();

    let mut map = PropertyMap::new();
    map.add_key("hmm-state", states.iter().map(|s| s.as_str()));
    map.add_key("boundary", BOUNDARY_VALUES.iter().copied());
    for i in (0..model.phonology().max_history()).rev() {
        map.add_key(&format!("history[{}]", i), phonemes.iter().copied());
    }
    map.add_key("central", phonemes.iter().copied());
    for i in 0..model.phonology().max_future() {
        map.add_key(&format!("future[{}]", i), phonemes.iter().copied());
    }
    for c in model.conditions() {
        map.add_key(c, CONDITION_VALUES.iter().copied());
    }
    map
}

#[derive(Debug, Clone, Copy)]
enum Source {
    HmmState,
    Boundary,
    History(usize),
    Central,
    Future(usize),
    Condition(bool),
}

/// How to read one tree key off an allophone state: where the value comes
/// from and the tree's value index for every raw value.
#[derive(Debug, Clone)]
struct Feature {
    source: Source,
    values: Vec<Option<ValueIndex>>,
}

impl Feature {
    fn new(tree: &DecisionTree, key: usize, model: &ClassicStateModel) -> Feature {
        let map = tree.map();
        let name = map.key_name(key);
        let source = if name == "hmm-state" {
            Source::HmmState
        } else if name == "boundary" {
            Source::Boundary
        } else if name == "central" {
            Source::Central
        } else if let Some(i) = context_position(name, "history[") {
            Source::History(i)
        } else if let Some(i) = context_position(name, "future[") {
            Source::Future(i)
        } else {
            Source::Condition(model.has_condition(name))
        };

        let lookup = |names: &mut dyn Iterator<Item = String>| -> Vec<Option<ValueIndex>> {
            names.map(|n| map.value(key, &n)).collect()
        };
        let pi = model.phoneme_inventory();
        let values = match source {
            Source::HmmState => lookup(&mut (0..=crate::allophone::MAX_STATE_ID).map(|s| s.to_string())),
            Source::Boundary => lookup(&mut BOUNDARY_VALUES.iter().map(|s| s.to_string())),
            Source::History(_) | Source::Central | Source::Future(_) => lookup(
                &mut (0..=pi.len() as u16).map(|p| pi.symbol(PhonemeId::new(p)).to_string()),
            ),
            Source::Condition(_) => lookup(&mut CONDITION_VALUES.iter().map(|s| s.to_string())),
        };
        Feature { source, values }
    }

    fn value(&self, state: &AllophoneState) -> Option<ValueIndex> {
        let allophone = state.allophone();
        let raw = match self.source {
            Source::HmmState => state.state() as usize,
            Source::Boundary => allophone.boundary.bits() as usize,
            Source::History(i) => allophone.history_at(i).value() as usize,
            Source::Central => allophone.central.value() as usize,
            Source::Future(i) => allophone.future_at(i).value() as usize,
            Source::Condition(holds) => holds as usize,
        };
        self.values.get(raw).copied().flatten()
    }
}

fn context_position(name: &str, prefix: &str) -> Option<usize> {
    name.strip_prefix(prefix)?.strip_suffix(']')?.parse().ok()
}

/// Classes from a decision tree. Silence is class 0 and never reaches the
/// tree; the leaves get classes `1..=L` in ascending leaf id order.
#[derive(Debug)]
pub struct DecisionTreeTying {
    tree: DecisionTree,
    features: Vec<Feature>,
    classes: hashbrown::HashMap<u32, EmissionIndex>,
    silence: Option<PhonemeId>,
    dependencies: DependencySet,
}

impl DecisionTreeTying {
    pub fn from_path<P: AsRef<Path>>(path: P, model: &ClassicStateModel) -> Result<DecisionTreeTying> {
        let path = path.as_ref();
        let tree = DecisionTree::from_path(path, &standard_property_map(model))?;
        let mut dependencies = DependencySet::new();
        dependencies.add_file("file", path)?;
        Ok(DecisionTreeTying::new(tree, model, dependencies))
    }

    pub fn new(mut tree: DecisionTree, model: &ClassicStateModel, dependencies: DependencySet) -> DecisionTreeTying {
        let silence = model.allophone_alphabet().silence();
        if let Some(s) = silence {
            let symbol = model.phoneme_inventory().symbol(s).to_string();
            if tree.remove_silence_branch(&symbol) {
                log::info!("silence is classified outside the decision tree");
            }
        }

        let features = (0..tree.map().len())
            .map(|k| Feature::new(&tree, k, model))
            .collect();
        let classes = tree
            .leaf_ids()
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, EmissionIndex::new(i as u32 + 1)))
            .collect();
        DecisionTreeTying {
            tree,
            features,
            classes,
            silence,
            dependencies,
        }
    }

    #[inline(always)]
    pub fn tree(&self) -> &DecisionTree {
        &self.tree
    }

    pub fn n_classes(&self) -> u32 {
        self.classes.len() as u32 + 1
    }

    pub(crate) fn dependencies(&self) -> &DependencySet {
        &self.dependencies
    }

    pub fn properties(&self, state: &AllophoneState) -> Properties {
        Properties(self.features.iter().map(|f| f.value(state)).collect())
    }

    /// Questions the tree asks about `state` with their answers, and every
    /// class reachable when some answers are undefined.
    pub fn explain(&self, state: &AllophoneState) -> (Vec<(String, Answer)>, Vec<EmissionIndex>) {
        if Some(state.allophone().central) == self.silence {
            return (Vec::new(), vec![EmissionIndex::new(0)]);
        }
        let properties = self.properties(state);
        let map = self.tree.map();
        let (path, _) = self.tree.find_path(&properties);
        let steps = path
            .iter()
            .map(|step| (self.tree.questions()[step.question].describe(map), step.answer))
            .collect();
        let classes = self
            .tree
            .find_all(&properties)
            .into_iter()
            .map(|leaf| self.classes.get(&leaf).copied().unwrap_or(EmissionIndex::INVALID))
            .sorted()
            .dedup()
            .collect();
        (steps, classes)
    }

    pub(crate) fn classify(&self, _model: &ClassicStateModel, state: &AllophoneState) -> EmissionIndex {
        if Some(state.allophone().central) == self.silence {
            return EmissionIndex::new(0);
        }
        let leaf = self.tree.find(&self.properties(state));
        self.classes.get(&leaf).copied().unwrap_or(EmissionIndex::INVALID)
    }
}
