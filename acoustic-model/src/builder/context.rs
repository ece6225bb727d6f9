//! The context-dependency transducer, mapping allophones to phonemes.
//!
//! States are labelled by the last phonemes read, `a-b` inside a word and
//! `a|b` across a word boundary. An allophone `a-b-c` is one arc from `a-b`
//! to `b-c` with `c` as output: the output runs one phoneme ahead of the
//! input, which keeps the transducer deterministic on its input.
//!
//! Within-word models always use the open context at word ends. The word
//! end emits a phoneme disambiguator and moves to a final state per
//! disambiguator; the matching allophone disambiguator is read when the
//! next word starts.
//!
//! Across-word models pass disambiguators through on loops at every state.
//! Word-initial phonemes are output shifted by `initial_phone_offset` so
//! that `a-b-c` and `a-b|c` stay apart. Context-independent phonemes loop
//! on the start state `#|#`, which is also the only final state.

use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};
use itertools::Itertools;

use super::TransducerBuilder;
use crate::allophone::{Allophone, Boundary};
use crate::error::{Error, Result};
use crate::fsa::{AlphabetKind, StateId, StaticAutomaton};
use crate::types::{AllophoneIndex, Label, PhonemeId, Weight};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PhoneContext {
    phones: Vec<PhonemeId>,
    boundary: bool,
    disambiguator: Option<u32>,
}

impl PhoneContext {
    fn new(phones: &[PhonemeId], boundary: bool) -> PhoneContext {
        PhoneContext {
            phones: phones.to_vec(),
            boundary,
            disambiguator: None,
        }
    }
}

/// A state reached at a within-word word end, leaving on the allophone
/// disambiguator `input` into the next word.
struct WordEnd {
    state: StateId,
    input: Label,
}

/// Automaton whose states are keyed by phone contexts. A state exists as
/// soon as it is referenced; it only gets arcs once it is set up.
struct ContextGraph {
    automaton: StaticAutomaton,
    states: HashMap<PhoneContext, StateId>,
    set_up: HashSet<StateId>,
}

impl ContextGraph {
    fn state(&mut self, context: PhoneContext) -> StateId {
        if let Some(&s) = self.states.get(&context) {
            return s;
        }
        let s = self.automaton.new_state();
        self.states.insert(context, s);
        s
    }

    /// Marks `s` as set up; returns whether it was not before.
    fn set_up(&mut self, s: StateId) -> bool {
        self.set_up.insert(s)
    }

    fn is_set_up(&self, s: StateId) -> bool {
        self.set_up.contains(&s)
    }

    fn arc(&mut self, from: StateId, to: StateId, input: Label, output: Label) {
        self.automaton.add_arc(from, to, input, output, Weight::ONE);
    }
}

impl<'a> TransducerBuilder<'a> {
    /// Allophone-to-phoneme transducer for context windows of at most one
    /// phoneme on either side; trimmed and minimized.
    pub fn create_minimized_context_dependency_transducer(
        &self,
        initial_phone_offset: u32,
    ) -> Result<StaticAutomaton> {
        let am = self.am;
        let alphabet = am.allophone_alphabet();
        let inventory = am.state_model().phoneme_inventory();
        let across_word = am.is_across_word_model_enabled();
        let silence = am
            .silence()
            .ok_or_else(|| Error::Builder("acoustic model has no silence phoneme".into()))?;
        let allophones = alphabet.allophones();

        let mut max_history = 0;
        let mut max_future = 0;
        let mut non_coarticulated: BTreeMap<PhonemeId, AllophoneIndex> = BTreeMap::new();
        let mut initial_coarticulated = Vec::new();
        let mut initial_non_coarticulated = Vec::new();
        for (i, a) in allophones.iter().enumerate() {
            max_history = max_history.max(a.history.len());
            max_future = max_future.max(a.future.len());
            if !inventory.is_context_dependent(a.central) && (a.boundary.is_initial() || a.boundary.is_final()) {
                non_coarticulated.insert(a.central, AllophoneIndex(i as u32));
            }
            if a.history.is_empty() {
                if a.boundary.is_initial() {
                    initial_non_coarticulated.push(a.central);
                } else {
                    initial_coarticulated.push(a.central);
                }
            }
        }
        if max_history > 1 || max_future > 1 {
            return Err(Error::Builder(format!(
                "context-dependency transducer supports at most one phoneme of context, got history {} and future {}",
                max_history, max_future
            )));
        }
        let initial_coarticulated: Vec<PhonemeId> = initial_coarticulated.into_iter().sorted().dedup().collect();
        let initial_non_coarticulated: Vec<PhonemeId> =
            initial_non_coarticulated.into_iter().sorted().dedup().collect();

        let shifted = |p: PhonemeId| Label::new(initial_phone_offset + p.value() as u32);
        let width = max_history + max_future;
        let open = vec![PhonemeId::TERM; width];

        let mut graph = ContextGraph {
            automaton: StaticAutomaton::new(AlphabetKind::Allophones, AlphabetKind::Phonemes),
            states: HashMap::new(),
            set_up: HashSet::new(),
        };
        let initial = graph.state(PhoneContext::new(&open, true));
        graph.set_up(initial);
        graph.automaton.set_initial(initial);
        if across_word {
            graph.automaton.set_final(initial, Weight::ONE);
            for d in 0..self.n_disambiguators {
                graph.arc(initial, initial, alphabet.disambiguator(d), Label::disambiguator(d));
            }
            for (&p, &index) in non_coarticulated.iter() {
                graph.arc(initial, initial, Label::from(index), shifted(p));
            }
        }

        let mut word_ends: Vec<WordEnd> = Vec::new();
        for (i, a) in allophones.iter().enumerate() {
            let label = Label::from(AllophoneIndex(i as u32));
            let mut phones = vec![PhonemeId::TERM; max_history + 1 + max_future];
            for (k, &p) in a.history.iter().enumerate() {
                phones[max_history - 1 - k] = p;
            }
            phones[max_history] = a.central;
            for (k, &p) in a.future.iter().enumerate() {
                phones[max_history + 1 + k] = p;
            }
            let next = phones.get(max_history + 1).copied().unwrap_or(PhonemeId::TERM);
            let from_context = PhoneContext::new(&phones[..phones.len() - 1], a.boundary.is_initial());
            let to_context = |boundary| PhoneContext::new(&phones[1..], boundary);

            if across_word {
                if a.central == silence && !is_symmetric_silence(a) {
                    continue;
                }
                if a.boundary.is_initial() && non_coarticulated.contains_key(&a.central) {
                    continue;
                }

                let from = graph.state(from_context);
                if graph.set_up(from) {
                    for d in 0..self.n_disambiguators {
                        graph.arc(from, from, alphabet.disambiguator(d), Label::disambiguator(d));
                    }
                    // coarticulated silence inside a phrase
                    if a.boundary == Boundary::WITHIN && a.central == silence && a.history.is_empty() {
                        if let Some(index) = alphabet.index(&Allophone::new(silence, Boundary::WITHIN)) {
                            for &p in initial_coarticulated.iter() {
                                let mut phones = open.clone();
                                phones[max_history] = p;
                                let to = graph.state(PhoneContext::new(&phones, false));
                                graph.arc(from, to, Label::from(index), Label::from(p));
                            }
                        }
                    }
                }

                if a.boundary.is_final() {
                    if next.is_term() {
                        graph.arc(from, initial, label, Label::EPSILON);
                    } else {
                        let to = graph.state(to_context(true));
                        graph.arc(from, to, label, shifted(next));
                    }
                } else if next.is_term() {
                    // word boundary inside a phrase, continued by silence
                    if a.central != silence {
                        let mut phones = open.clone();
                        phones[max_history] = silence;
                        let to = graph.state(PhoneContext::new(&phones, false));
                        graph.arc(from, to, label, Label::from(silence));
                    } else {
                        graph.arc(from, from, label, Label::from(silence));
                    }
                } else {
                    let to = graph.state(to_context(false));
                    graph.arc(from, to, label, Label::from(next));
                }
            } else {
                let from = graph.state(from_context);
                graph.set_up(from);
                if a.boundary.is_final() {
                    assert!(
                        next.is_term(),
                        "within-word allophone {} has a right context across the word end",
                        alphabet.format(a)
                    );
                    for d in 0..self.n_disambiguators {
                        let context = PhoneContext {
                            phones: open.clone(),
                            boundary: true,
                            disambiguator: Some(d),
                        };
                        let to = graph.state(context);
                        if graph.set_up(to) {
                            graph.automaton.set_final(to, Weight::ONE);
                            word_ends.push(WordEnd {
                                state: to,
                                input: alphabet.disambiguator(d),
                            });
                        }
                        graph.arc(from, to, label, Label::disambiguator(d));
                    }
                } else {
                    let to = graph.state(to_context(false));
                    graph.arc(from, to, label, Label::from(next));
                }
            }
        }

        // word starts: from the start state and from every within-word word end
        for &p in initial_non_coarticulated.iter() {
            let mut phones = open.clone();
            phones[max_history] = p;
            let s = graph.state(PhoneContext::new(&phones, true));
            if !graph.is_set_up(s) {
                continue;
            }
            if across_word {
                if !non_coarticulated.contains_key(&p) {
                    graph.arc(initial, s, Label::EPSILON, shifted(p));
                }
            } else {
                graph.arc(initial, s, Label::EPSILON, Label::from(p));
            }
            for end in word_ends.iter() {
                graph.arc(end.state, s, end.input, Label::from(p));
            }
        }

        let mut c = graph.automaton;
        let n_states = c.n_states();
        c.minimize();
        log::info!(
            "context-dependency transducer: {} states before, {} after minimization",
            n_states,
            c.n_states()
        );
        Ok(c)
    }
}

/// Silence is only kept with context on both sides or on neither, and
/// initial exactly when final.
fn is_symmetric_silence(a: &Allophone) -> bool {
    a.history.is_empty() == a.future.is_empty() && a.boundary.is_initial() == a.boundary.is_final()
}
