use std::sync::Arc;

use crate::allophone::{Allophone, Boundary};
use crate::dependency::DependencySet;
use crate::lexicon::PhonemeInventory;
use crate::types::PhonemeId;

/// Context window model: how many neighbouring phonemes an allophone sees.
#[derive(Debug, Clone)]
pub struct Phonology {
    inventory: Arc<PhonemeInventory>,
    max_history: usize,
    max_future: usize,
    cross_word: bool,
}

impl Phonology {
    pub fn new(
        inventory: Arc<PhonemeInventory>,
        max_history: usize,
        max_future: usize,
        cross_word: bool,
    ) -> Phonology {
        Phonology {
            inventory,
            max_history,
            max_future,
            cross_word,
        }
    }

    #[inline(always)]
    pub fn inventory(&self) -> &Arc<PhonemeInventory> {
        &self.inventory
    }

    #[inline(always)]
    pub fn max_history(&self) -> usize {
        self.max_history
    }

    #[inline(always)]
    pub fn max_future(&self) -> usize {
        self.max_future
    }

    #[inline(always)]
    pub fn is_cross_word(&self) -> bool {
        self.cross_word
    }

    /// The within-word allophone at `position` of `pronunciation`.
    ///
    /// Context-independent phonemes get no context at all; for the others the
    /// window extends in both directions until it is full or hits a
    /// context-independent phoneme.
    pub fn context_of(&self, pronunciation: &[PhonemeId], position: usize) -> Allophone {
        let central = pronunciation[position];
        let mut allophone = Allophone::new(central, Boundary::WITHIN);
        if !self.inventory.is_context_dependent(central) {
            return allophone;
        }

        for &p in pronunciation[..position].iter().rev().take(self.max_history) {
            if !self.inventory.is_context_dependent(p) {
                break;
            }
            allophone.history.push(p);
        }
        for &p in pronunciation[position + 1..].iter().take(self.max_future) {
            if !self.inventory.is_context_dependent(p) {
                break;
            }
            allophone.future.push(p);
        }
        allophone
    }

    /// Adds `p` as the new outermost history element if there is room.
    pub fn append_history(&self, allophone: &mut Allophone, p: PhonemeId) {
        if allophone.history.len() < self.max_history {
            allophone.history.push(p);
        }
    }

    pub fn append_future(&self, allophone: &mut Allophone, p: PhonemeId) {
        if allophone.future.len() < self.max_future {
            allophone.future.push(p);
        }
    }

    /// Makes `p` the nearest history element, dropping what falls out of the window.
    pub fn push_history(&self, history: &mut Vec<PhonemeId>, p: PhonemeId) {
        push(history, p, self.max_history);
    }

    pub fn push_future(&self, future: &mut Vec<PhonemeId>, p: PhonemeId) {
        push(future, p, self.max_future);
    }

    pub fn dependencies(&self) -> DependencySet {
        let mut set = DependencySet::new();
        set.add_value("history-length", self.max_history.to_string());
        set.add_value("future-length", self.max_future.to_string());
        set.add_value("cross-word", self.cross_word.to_string());
        set
    }
}

fn push(context: &mut Vec<PhonemeId>, p: PhonemeId, max: usize) {
    context.insert(0, p);
    context.truncate(max);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory() -> (Arc<PhonemeInventory>, PhonemeId, PhonemeId, PhonemeId) {
        let mut pi = PhonemeInventory::new();
        let sil = pi.add("sil", false).unwrap();
        let a = pi.add("a", true).unwrap();
        let b = pi.add("b", true).unwrap();
        (Arc::new(pi), sil, a, b)
    }

    #[test]
    fn context_stops_at_independent_phonemes() {
        let (pi, sil, a, b) = inventory();
        let phonology = Phonology::new(pi, 2, 1, false);
        let pron = vec![b, sil, a, b, a];

        let at_a = phonology.context_of(&pron, 2);
        assert_eq!(at_a.central, a);
        assert!(at_a.history.is_empty());
        assert_eq!(at_a.future, vec![b]);

        let at_last = phonology.context_of(&pron, 4);
        assert_eq!(at_last.history, vec![b, a]);
        assert!(at_last.future.is_empty());

        let at_sil = phonology.context_of(&pron, 1);
        assert!(at_sil.history.is_empty() && at_sil.future.is_empty());
    }

    #[test]
    fn push_keeps_nearest_and_truncates() {
        let (pi, _, a, b) = inventory();
        let phonology = Phonology::new(pi, 1, 2, false);
        let mut history = vec![a];
        phonology.push_history(&mut history, b);
        assert_eq!(history, vec![b]);

        let mut allophone = Allophone::new(a, Boundary::WITHIN);
        phonology.append_future(&mut allophone, a);
        phonology.append_future(&mut allophone, b);
        phonology.append_future(&mut allophone, b);
        assert_eq!(allophone.future, vec![a, b]);
    }
}
