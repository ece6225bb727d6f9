//! State tying: mapping allophone states onto emission classes.

mod decision_tree;
mod lut;
mod registry;

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::allophone::{AllophoneState, AllophoneStateAlphabet};
use crate::config::StateTyingType;
use crate::dependency::DependencySet;
use crate::model::ClassicStateModel;
use crate::types::{AllophoneStateIndex, EmissionIndex};

pub use self::decision_tree::{standard_property_map, DecisionTreeTying};
pub use self::lut::LookupTable;
pub use self::registry::{StateTyingBuilder, StateTyingRegistry};

/// Class per (central phoneme, phone state), numbered phoneme-major.
#[derive(Debug, Clone)]
pub struct MonophoneTable {
    table: Vec<EmissionIndex>,
    stride: usize,
    n_classes: u32,
}

impl MonophoneTable {
    pub fn new(model: &ClassicStateModel) -> MonophoneTable {
        let pi = model.phoneme_inventory();
        let hmm = model.hmm_topologies();
        let stride = pi.len() + 1;
        let max_states = pi
            .iter()
            .map(|p| hmm.get(p.id()).n_phone_states() as usize)
            .max()
            .unwrap_or(0);

        let mut table = vec![EmissionIndex::INVALID; stride * max_states];
        let mut n_classes = 0;
        for p in pi.iter() {
            for state in 0..hmm.get(p.id()).n_phone_states() as usize {
                table[p.id().value() as usize + state * stride] = EmissionIndex::new(n_classes);
                n_classes += 1;
            }
        }
        MonophoneTable {
            table,
            stride,
            n_classes,
        }
    }

    fn classify(&self, state: &AllophoneState) -> EmissionIndex {
        let i = state.allophone().central.value() as usize + state.state() as usize * self.stride;
        self.table.get(i).copied().unwrap_or(EmissionIndex::INVALID)
    }
}

#[derive(Debug)]
pub enum StateTying {
    NoTying,
    Monophone(MonophoneTable),
    Lut(LookupTable),
    DecisionTree(DecisionTreeTying),
}

impl StateTying {
    pub fn kind(&self) -> StateTyingType {
        match self {
            StateTying::NoTying => StateTyingType::NoTying,
            StateTying::Monophone(_) => StateTyingType::Monophone,
            StateTying::Lut(_) => StateTyingType::Lut,
            StateTying::DecisionTree(_) => StateTyingType::Cart,
        }
    }
}

/// A state tying together with the model it classifies and a memo of
/// classifications already made.
#[derive(Debug)]
pub struct ClassicStateTying {
    model: Arc<ClassicStateModel>,
    tying: StateTying,
    cache: RwLock<HashMap<AllophoneStateIndex, EmissionIndex>>,
}

impl ClassicStateTying {
    pub fn new(model: Arc<ClassicStateModel>, tying: StateTying) -> ClassicStateTying {
        log::info!(
            "{} state tying with {} classes",
            tying.kind().name(),
            class_count(&model, &tying)
        );
        ClassicStateTying {
            model,
            tying,
            cache: RwLock::new(HashMap::new()),
        }
    }

    #[inline(always)]
    pub fn model(&self) -> &Arc<ClassicStateModel> {
        &self.model
    }

    #[inline(always)]
    pub fn tying(&self) -> &StateTying {
        &self.tying
    }

    #[inline(always)]
    pub fn kind(&self) -> StateTyingType {
        self.tying.kind()
    }

    pub fn classify(&self, state: &AllophoneState) -> EmissionIndex {
        self.classify_index(AllophoneStateAlphabet::pack(
            state.allophone_index(),
            state.state(),
        ))
    }

    pub fn classify_index(&self, id: AllophoneStateIndex) -> EmissionIndex {
        if let Some(&e) = self.cache.read().get(&id) {
            return e;
        }
        let state = self.model.allophone_state_alphabet().allophone_state(id);
        let e = self.classify_uncached(&state);
        self.cache.write().insert(id, e);
        e
    }

    pub(crate) fn classify_uncached(&self, state: &AllophoneState) -> EmissionIndex {
        match &self.tying {
            StateTying::NoTying => EmissionIndex::new(
                AllophoneStateAlphabet::pack(state.allophone_index(), state.state()).value(),
            ),
            StateTying::Monophone(table) => table.classify(state),
            StateTying::Lut(lut) => lut.classify(&self.model, state),
            StateTying::DecisionTree(tree) => tree.classify(&self.model, state),
        }
    }

    pub fn n_classes(&self) -> u32 {
        class_count(&self.model, &self.tying)
    }

    pub fn dependencies(&self) -> DependencySet {
        let mut set = DependencySet::new();
        set.add_value("type", self.kind().name());
        match &self.tying {
            StateTying::Lut(lut) => set.add_set("lookup-table", lut.dependencies().clone()),
            StateTying::DecisionTree(tree) => set.add_set("decision-tree", tree.dependencies().clone()),
            _ => {}
        }
        set.add_set("hmm", self.model.hmm_topologies().dependencies());
        set
    }
}

fn class_count(model: &ClassicStateModel, tying: &StateTying) -> u32 {
    match tying {
        StateTying::NoTying => model.allophone_state_alphabet().n_classes(),
        StateTying::Monophone(table) => table.n_classes,
        StateTying::Lut(lut) => lut.n_classes(),
        StateTying::DecisionTree(tree) => tree.n_classes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::model;
    use crate::types::AllophoneIndex;

    #[test]
    fn no_tying_is_the_identity() {
        let model = model(&[]);
        let tying = ClassicStateTying::new(Arc::clone(&model), StateTying::NoTying);
        assert_eq!(tying.n_classes(), 100);
        let id = AllophoneStateAlphabet::pack(AllophoneIndex(7), 2);
        assert_eq!(tying.classify_index(id), EmissionIndex::new(id.value()));
    }

    #[test]
    fn monophone_classes_are_dense() {
        let model = model(&[]);
        let tying = ClassicStateTying::new(
            Arc::clone(&model),
            StateTying::Monophone(MonophoneTable::new(&model)),
        );
        // sil has one state, a and b three each
        assert_eq!(tying.n_classes(), 7);

        let mut seen = vec![false; 7];
        for state in model.allophone_state_alphabet().allophone_states() {
            let e = tying.classify(&state);
            assert!(e.is_valid());
            seen[e.value() as usize] = true;
            let expected = match (state.allophone().central.value(), state.state()) {
                (1, 0) => 0,
                (2, s) => 1 + s as u32,
                (3, s) => 4 + s as u32,
                other => panic!("unexpected state {:?}", other),
            };
            assert_eq!(e, EmissionIndex::new(expected));
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn memoized_equals_uncached() {
        let model = model(&[]);
        let tying = ClassicStateTying::new(
            Arc::clone(&model),
            StateTying::Monophone(MonophoneTable::new(&model)),
        );
        for state in model.allophone_state_alphabet().allophone_states() {
            let first = tying.classify(&state);
            assert_eq!(tying.classify(&state), first);
            assert_eq!(tying.classify_uncached(&state), first);
        }
        assert_eq!(tying.cache.read().len(), 100);
    }
}
