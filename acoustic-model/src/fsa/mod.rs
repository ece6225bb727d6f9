//! A small static weighted transducer over the tropical semiring.

mod minimize;

use std::collections::{BTreeMap, VecDeque};
use std::io::Write;

use crate::types::{Label, Weight};

pub type StateId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphabetKind {
    Phonemes,
    Allophones,
    AllophoneStates,
    Emissions,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub target: StateId,
    pub weight: Weight,
    pub input: Label,
    pub output: Label,
}

impl Transition {
    #[inline(always)]
    pub fn new(target: StateId, weight: Weight, input: Label, output: Label) -> Transition {
        Transition {
            target,
            weight,
            input,
            output,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct State {
    transitions: Vec<Transition>,
    final_weight: Option<Weight>,
}

impl State {
    #[inline(always)]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    #[inline(always)]
    pub fn final_weight(&self) -> Option<Weight> {
        self.final_weight
    }

    #[inline(always)]
    pub fn is_final(&self) -> bool {
        self.final_weight.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct StaticAutomaton {
    states: Vec<State>,
    initial: Option<StateId>,
    input: AlphabetKind,
    output: AlphabetKind,
}

impl StaticAutomaton {
    pub fn new(input: AlphabetKind, output: AlphabetKind) -> StaticAutomaton {
        StaticAutomaton {
            states: Vec::new(),
            initial: None,
            input,
            output,
        }
    }

    #[inline(always)]
    pub fn input_alphabet(&self) -> AlphabetKind {
        self.input
    }

    #[inline(always)]
    pub fn output_alphabet(&self) -> AlphabetKind {
        self.output
    }

    pub fn new_state(&mut self) -> StateId {
        self.states.push(State::default());
        (self.states.len() - 1) as StateId
    }

    #[inline(always)]
    pub fn initial(&self) -> Option<StateId> {
        self.initial
    }

    pub fn set_initial(&mut self, s: StateId) {
        self.initial = Some(s);
    }

    pub fn set_final(&mut self, s: StateId, weight: Weight) {
        self.states[s as usize].final_weight = Some(weight);
    }

    pub fn add_transition(&mut self, from: StateId, transition: Transition) {
        self.states[from as usize].transitions.push(transition);
    }

    pub fn add_arc(&mut self, from: StateId, to: StateId, input: Label, output: Label, weight: Weight) {
        self.add_transition(from, Transition::new(to, weight, input, output));
    }

    #[inline(always)]
    pub fn state(&self, s: StateId) -> &State {
        &self.states[s as usize]
    }

    #[inline(always)]
    pub fn states(&self) -> &[State] {
        &self.states
    }

    #[inline(always)]
    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    pub fn n_transitions(&self) -> usize {
        self.states.iter().map(|s| s.transitions.len()).sum()
    }

    pub fn n_final_states(&self) -> usize {
        self.states.iter().filter(|s| s.is_final()).count()
    }

    /// Removes states that are not on a path from the initial state to a
    /// final state and renumbers the rest in their previous order.
    pub fn trim(&mut self) {
        let n = self.states.len();
        let initial = match self.initial {
            Some(s) => s,
            None => {
                self.states.clear();
                return;
            }
        };

        let mut reverse: Vec<Vec<StateId>> = vec![Vec::new(); n];
        for (s, state) in self.states.iter().enumerate() {
            for t in state.transitions.iter() {
                reverse[t.target as usize].push(s as StateId);
            }
        }

        let mut forward = vec![false; n];
        let mut queue = VecDeque::new();
        forward[initial as usize] = true;
        queue.push_back(initial);
        while let Some(s) = queue.pop_front() {
            for t in self.states[s as usize].transitions.iter() {
                if !forward[t.target as usize] {
                    forward[t.target as usize] = true;
                    queue.push_back(t.target);
                }
            }
        }

        let mut backward = vec![false; n];
        for (s, state) in self.states.iter().enumerate() {
            if state.is_final() {
                backward[s] = true;
                queue.push_back(s as StateId);
            }
        }
        while let Some(s) = queue.pop_front() {
            for &p in reverse[s as usize].iter() {
                if !backward[p as usize] {
                    backward[p as usize] = true;
                    queue.push_back(p);
                }
            }
        }

        let keep: Vec<bool> = (0..n).map(|s| forward[s] && backward[s]).collect();
        if !keep[initial as usize] {
            log::debug!("automaton accepts nothing, trimmed to empty");
            self.states.clear();
            self.initial = None;
            return;
        }
        self.retain(&keep);
    }

    fn retain(&mut self, keep: &[bool]) {
        let mut renumber = vec![StateId::MAX; keep.len()];
        let mut next = 0;
        for (s, &k) in keep.iter().enumerate() {
            if k {
                renumber[s] = next;
                next += 1;
            }
        }
        if next as usize == keep.len() {
            return;
        }

        let states = std::mem::take(&mut self.states);
        self.states = states
            .into_iter()
            .zip(keep.iter())
            .filter(|(_, k)| **k)
            .map(|(mut state, _)| {
                state.transitions.retain(|t| keep[t.target as usize]);
                for t in state.transitions.iter_mut() {
                    t.target = renumber[t.target as usize];
                }
                state
            })
            .collect();
        self.initial = self.initial.map(|s| renumber[s as usize]);
    }

    /// Trims, then merges states with identical futures.
    pub fn minimize(&mut self) {
        self.trim();
        minimize::merge_equivalent_states(self);
    }

    /// Writes the automaton as AT&T text: one `source target input output
    /// weight` line per transition, one `state weight` line per final state.
    pub fn write_att<W, I, O>(&self, mut writer: W, input: I, output: O) -> std::io::Result<()>
    where
        W: Write,
        I: Fn(Label) -> String,
        O: Fn(Label) -> String,
    {
        let mut order: Vec<StateId> = (0..self.states.len() as StateId).collect();
        // AT&T readers take the first source state as the initial one
        if let Some(initial) = self.initial {
            order.swap(0, initial as usize);
        }
        for &s in order.iter() {
            for t in self.states[s as usize].transitions.iter() {
                writeln!(
                    writer,
                    "{}\t{}\t{}\t{}\t{}",
                    s,
                    t.target,
                    input(t.input),
                    output(t.output),
                    t.weight
                )?;
            }
        }
        for &s in order.iter() {
            if let Some(w) = self.states[s as usize].final_weight {
                writeln!(writer, "{}\t{}", s, w)?;
            }
        }
        Ok(())
    }

    /// Output sequences (epsilons dropped) for the input sequence `input`,
    /// with the best weight of each. Epsilon cycles are followed at most
    /// once around.
    pub fn transduce(&self, input: &[Label]) -> BTreeMap<Vec<Label>, f32> {
        let mut results = BTreeMap::new();
        if let Some(initial) = self.initial {
            let mut output = Vec::new();
            let mut on_path = Vec::new();
            self.walk(initial, input, 0.0, &mut output, &mut on_path, &mut results);
        }
        results
    }

    pub fn accepts(&self, input: &[Label]) -> bool {
        !self.transduce(input).is_empty()
    }

    fn walk(
        &self,
        s: StateId,
        input: &[Label],
        weight: f32,
        output: &mut Vec<Label>,
        on_path: &mut Vec<StateId>,
        results: &mut BTreeMap<Vec<Label>, f32>,
    ) {
        let state = &self.states[s as usize];
        if input.is_empty() {
            if let Some(w) = state.final_weight {
                let total = weight + w.0;
                let best = results.entry(output.clone()).or_insert(f32::INFINITY);
                if total < *best {
                    *best = total;
                }
            }
        }
        for t in state.transitions.iter() {
            let rest = if t.input.is_epsilon() {
                if on_path.contains(&t.target) {
                    continue;
                }
                input
            } else if input.first() == Some(&t.input) {
                &input[1..]
            } else {
                continue;
            };
            let pushed = !t.output.is_epsilon();
            if pushed {
                output.push(t.output);
            }
            if t.input.is_epsilon() {
                on_path.push(s);
                self.walk(t.target, rest, weight + t.weight.0, output, on_path, results);
                on_path.pop();
            } else {
                let mut fresh = Vec::new();
                self.walk(t.target, rest, weight + t.weight.0, output, &mut fresh, results);
            }
            if pushed {
                output.pop();
            }
        }
    }
}
