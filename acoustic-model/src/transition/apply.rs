//! Expansion of flat automata with loop, skip and exit transitions.
//!
//! States of the result pair a state of the input ("right" state) with what
//! the expansion remembers on the left: which transitions are allowed, the
//! most recent emission and the scores to charge. A state whose emission is
//! epsilon is "discharged". Where a right state has several emitting arcs in
//! and several out, the emission is discharged through epsilon arcs first
//! instead of connecting every predecessor with every successor.
//!
//! Disambiguators mark word boundaries: they are never looped or skipped and
//! the state before them cannot be skipped either.

use hashbrown::HashMap;

use super::{StateType, TransitionModel, TransitionModelKind, TransitionType};
use crate::error::Result;
use crate::fsa::{AlphabetKind, StateId, StaticAutomaton, Transition};
use crate::types::{AllophoneStateIndex, EmissionIndex, Label, Weight};

type Mask = u8;

const ALLOW_LOOP: Mask = 1 << TransitionType::Loop as u8;
const ALLOW_FORWARD: Mask = 1 << TransitionType::Forward as u8;
const ALLOW_SKIP: Mask = 1 << TransitionType::Skip as u8;
const ALLOW_EXIT: Mask = 1 << TransitionType::Exit as u8;
const IS_FINAL: Mask = 1 << 4;
const EMITTING: Mask = ALLOW_LOOP | ALLOW_FORWARD | ALLOW_SKIP | ALLOW_EXIT | IS_FINAL;
const ENTERING: Mask = ALLOW_FORWARD | ALLOW_SKIP | ALLOW_EXIT | IS_FINAL;

#[derive(Clone, Copy)]
enum Direction {
    Incoming = 0,
    Outgoing = 2,
}

#[derive(Clone, Copy)]
enum ArcKind {
    Emitting = 0,
    Epsilon = 4,
    Disambiguating = 8,
}

const NONE: u8 = 0x00;
const ONE: u8 = 0x01;
const MANY: u8 = 0x03;

/// None, one or many arcs per direction and kind, two bits each.
#[derive(Debug, Clone, Copy, Default)]
struct Degree(u16);

impl Degree {
    fn add(&mut self, direction: Direction, kind: ArcKind) {
        let shift = direction as u16 + kind as u16;
        if self.0 & ((ONE as u16) << shift) != 0 {
            self.0 |= (MANY as u16) << shift;
        } else {
            self.0 |= (ONE as u16) << shift;
        }
    }

    fn get(&self, direction: Direction, kind: ArcKind) -> u8 {
        let shift = direction as u16 + kind as u16;
        ((self.0 >> shift) & 0x03) as u8
    }
}

fn arc_kind(label: Label) -> ArcKind {
    if label.is_epsilon() {
        ArcKind::Epsilon
    } else if label.is_disambiguator() {
        ArcKind::Disambiguating
    } else {
        ArcKind::Emitting
    }
}

/// Degrees of the states reachable from the initial state.
fn degrees(input: &StaticAutomaton) -> Vec<Degree> {
    let mut degrees = vec![Degree::default(); input.n_states()];
    let initial = match input.initial() {
        Some(s) => s,
        None => return degrees,
    };
    let mut seen = vec![false; input.n_states()];
    let mut stack = vec![initial];
    seen[initial as usize] = true;
    while let Some(s) = stack.pop() {
        for t in input.state(s).transitions() {
            let kind = arc_kind(t.input);
            degrees[s as usize].add(Direction::Outgoing, kind);
            degrees[t.target as usize].add(Direction::Incoming, kind);
            if !seen[t.target as usize] {
                seen[t.target as usize] = true;
                stack.push(t.target);
            }
        }
    }
    degrees
}

/// Transition class of every emitting input label.
fn state_types(
    tm: &TransitionModel,
    input: &StaticAutomaton,
    silence: Label,
) -> Result<HashMap<Label, StateType>> {
    let mut types = HashMap::new();
    for s in 0..input.n_states() as StateId {
        for t in input.state(s).transitions() {
            let label = t.input;
            if !matches!(arc_kind(label), ArcKind::Emitting) || types.contains_key(&label) {
                continue;
            }
            let class = if label == silence {
                StateType::SILENCE
            } else {
                match tm.kind() {
                    TransitionModelKind::Cart { .. } if input.input_alphabet() == AlphabetKind::Emissions => {
                        tm.cart_class(EmissionIndex(label.value()))?
                    }
                    TransitionModelKind::Cart { .. } => tm.classify_index(AllophoneStateIndex(label.value()))?,
                    _ => StateType::PHONE_0,
                }
            };
            types.insert(label, class);
        }
    }
    Ok(types)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Left {
    mask: Mask,
    emission: Label,
    weights: Option<StateType>,
    right: StateId,
}

impl Left {
    fn is_legitimate(&self) -> bool {
        if self.emission.is_disambiguator() {
            return false;
        }
        let epsilon = self.emission.is_epsilon();
        match (self.mask, self.weights) {
            // word start and post-epsilon states
            (ENTERING, Some(w)) => epsilon && (w == StateType::ENTRY_M1 || w >= StateType::SILENCE),
            (EMITTING, Some(w)) => !epsilon && w >= StateType::SILENCE,
            // discharged forward and intermediate skip state
            (ALLOW_FORWARD, None) => epsilon,
            // discharged skip and exit state
            (m, Some(_)) if m == ALLOW_SKIP | ALLOW_EXIT => epsilon,
            _ => false,
        }
    }
}

pub(super) struct Applicator<'a> {
    tm: &'a TransitionModel,
    input: &'a StaticAutomaton,
    silence: Label,
    exit_to_final: bool,
    degrees: Vec<Degree>,
    types: HashMap<Label, StateType>,
    result: StaticAutomaton,
    states: HashMap<Left, StateId>,
    todo: Vec<(Left, StateId)>,
}

impl<'a> Applicator<'a> {
    pub(super) fn new(
        tm: &'a TransitionModel,
        input: &'a StaticAutomaton,
        silence: Label,
        exit_to_final: bool,
    ) -> Result<Applicator<'a>> {
        Ok(Applicator {
            tm,
            input,
            silence,
            exit_to_final,
            degrees: degrees(input),
            types: state_types(tm, input, silence)?,
            result: StaticAutomaton::new(input.input_alphabet(), input.output_alphabet()),
            states: HashMap::new(),
            todo: Vec::new(),
        })
    }

    fn state_id(&mut self, mask: Mask, emission: Label, weights: Option<StateType>, right: StateId) -> StateId {
        let left = Left {
            mask,
            emission,
            weights,
            right,
        };
        if let Some(&id) = self.states.get(&left) {
            return id;
        }
        debug_assert!(left.is_legitimate(), "illegitimate state {:?}", left);
        let id = self.result.new_state();
        if mask & IS_FINAL != 0 {
            if let Some(mut w) = self.input.state(right).final_weight() {
                if self.exit_to_final {
                    w += self.weight(&left, TransitionType::Exit);
                }
                self.result.set_final(id, w);
            }
        }
        self.states.insert(left, id);
        self.todo.push((left, id));
        id
    }

    fn weight(&self, left: &Left, t: TransitionType) -> Weight {
        match left.weights {
            Some(w) => self.tm.get(w).get(t),
            None => Weight::ONE,
        }
    }

    fn state_type(&self, emission: Label) -> StateType {
        // every emitting input label was classified up front
        self.types.get(&emission).copied().unwrap_or(StateType::PHONE_0)
    }

    fn do_epsilon(&mut self, current: &Left, id: StateId, arc: &Transition) {
        let target = self.state_id(current.mask & !ALLOW_LOOP, Label::EPSILON, current.weights, arc.target);
        self.result
            .add_arc(id, target, Label::EPSILON, arc.output, arc.weight);
    }

    fn do_forward(&mut self, current: &Left, id: StateId, arc: &Transition) {
        let target = self.state_id(EMITTING, arc.input, Some(self.state_type(arc.input)), arc.target);
        let weight = arc.weight + self.weight(current, TransitionType::Forward);
        self.result.add_arc(id, target, arc.input, arc.output, weight);
    }

    fn do_loop(&mut self, current: &Left, id: StateId) {
        debug_assert!(!current.emission.is_epsilon());
        let weight = self.weight(current, TransitionType::Loop);
        self.result
            .add_arc(id, id, current.emission, Label::EPSILON, weight);
    }

    fn do_skip(&mut self, current: &Left, id: StateId, arc: &Transition) {
        let target_degree = self.degrees[arc.target as usize];
        let dead_end = target_degree.get(Direction::Outgoing, ArcKind::Emitting)
            + target_degree.get(Direction::Outgoing, ArcKind::Epsilon)
            == NONE;
        if dead_end {
            return;
        }
        let skip = self.weight(current, TransitionType::Skip);
        if skip.is_max() {
            return;
        }

        // skip straight onto the next emission if it is the only way on
        let mut next = None;
        if target_degree.get(Direction::Outgoing, ArcKind::Disambiguating) == NONE
            && target_degree.get(Direction::Outgoing, ArcKind::Epsilon) == NONE
            && target_degree.get(Direction::Outgoing, ArcKind::Emitting) == ONE
        {
            let arcs = self.input.state(arc.target).transitions();
            assert_eq!(arcs.len(), 1, "degree of state {} out of date", arc.target);
            if arcs[0].output.is_epsilon() {
                next = Some(arcs[0]);
            }
        }

        let weight = arc.weight + skip;
        match next {
            Some(next) => {
                let target = self.state_id(EMITTING, next.input, Some(self.state_type(next.input)), next.target);
                self.result
                    .add_arc(id, target, next.input, arc.output, weight + next.weight);
            }
            None => {
                let target = self.state_id(ALLOW_FORWARD, Label::EPSILON, None, arc.target);
                self.result
                    .add_arc(id, target, Label::EPSILON, arc.output, weight);
            }
        }
    }

    fn do_exit(&mut self, current: &Left, id: StateId, arc: &Transition) {
        assert!(
            !self.exit_to_final,
            "exit scores cannot go both on word boundaries and on final states"
        );
        let target = self.state_id(ENTERING, Label::EPSILON, Some(StateType::ENTRY_M1), arc.target);
        let weight = arc.weight + self.weight(current, TransitionType::Exit);
        self.result.add_arc(id, target, arc.input, arc.output, weight);
    }

    fn do_discharge(&mut self, current: &Left, id: StateId) {
        let forward = self.state_id(ALLOW_FORWARD, Label::EPSILON, None, current.right);
        let weight = self.weight(current, TransitionType::Forward);
        self.result
            .add_arc(id, forward, Label::EPSILON, Label::EPSILON, weight);
        let exit = self.state_id(ALLOW_SKIP | ALLOW_EXIT, Label::EPSILON, current.weights, current.right);
        self.result
            .add_arc(id, exit, Label::EPSILON, Label::EPSILON, Weight::ONE);
    }

    pub(super) fn run(mut self) -> StaticAutomaton {
        let initial = match self.input.initial() {
            Some(s) => s,
            None => return self.result,
        };
        let initial = self.state_id(ENTERING, Label::EPSILON, Some(StateType::ENTRY_M1), initial);
        self.result.set_initial(initial);

        let input = self.input;
        while let Some((current, id)) = self.todo.pop() {
            let degree = self.degrees[current.right as usize];
            let discharge = degree.get(Direction::Incoming, ArcKind::Emitting) == MANY
                && (degree.get(Direction::Outgoing, ArcKind::Emitting) == MANY
                    || degree.get(Direction::Outgoing, ArcKind::Disambiguating) == MANY);

            if current.mask & ALLOW_LOOP != 0 {
                self.do_loop(&current, id);
            }
            if !current.emission.is_epsilon() && discharge {
                self.do_discharge(&current, id);
                continue;
            }
            for arc in input.state(current.right).transitions() {
                if arc.input.is_epsilon() {
                    self.do_epsilon(&current, id, arc);
                } else if arc.input.is_disambiguator() {
                    if current.mask & ALLOW_EXIT != 0 {
                        self.do_exit(&current, id, arc);
                    }
                } else {
                    if current.mask & ALLOW_FORWARD != 0 {
                        self.do_forward(&current, id, arc);
                    }
                    if current.mask & ALLOW_SKIP != 0 {
                        self.do_skip(&current, id, arc);
                    }
                }
            }
        }
        log::debug!(
            "transition model expanded {} states into {}",
            input.n_states(),
            self.result.n_states()
        );

        self.result.trim();
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsa::tests::l;
    use crate::model::tests::model;
    use crate::transition::tests::global;

    const SIL: u32 = 100;

    /// `1:10 2:eps` followed by an optional silence.
    fn flat() -> StaticAutomaton {
        let mut a = StaticAutomaton::new(AlphabetKind::Emissions, AlphabetKind::Allophones);
        let s: Vec<StateId> = (0..4).map(|_| a.new_state()).collect();
        a.set_initial(s[0]);
        a.add_arc(s[0], s[1], l(1), l(10), Weight::ONE);
        a.add_arc(s[1], s[2], l(2), Label::EPSILON, Weight::ONE);
        a.add_arc(s[2], s[3], l(SIL), Label::EPSILON, Weight::ONE);
        a.set_final(s[2], Weight::ONE);
        a.set_final(s[3], Weight::ONE);
        a
    }

    #[test]
    fn loops_and_skips_are_scored() {
        let tm = global(model(&[]));
        let expanded = tm.apply(&flat(), l(SIL), false).unwrap();

        let best = |labels: &[u32]| {
            let input: Vec<Label> = labels.iter().map(|&v| l(v)).collect();
            expanded.transduce(&input).get(&vec![l(10)]).copied()
        };
        assert_eq!(best(&[1, 2]), Some(0.0));
        // loops cost 3 for phones and silence alike
        assert_eq!(best(&[1, 1, 2]), Some(3.0));
        assert_eq!(best(&[1, 2, 2, 2]), Some(6.0));
        assert_eq!(best(&[1, 2, SIL, SIL]), Some(3.0));
        // skipping the first emission jumps straight to the second
        assert_eq!(best(&[2]), Some(3.0));
        assert_eq!(best(&[1]), None);
        assert!(!expanded.accepts(&[]));
    }

    #[test]
    fn exit_scores_go_on_word_boundaries() {
        let mut config = crate::config::TransitionModelConfig::default();
        config.models.insert(
            "state-0".to_string(),
            crate::config::TransitionScores {
                loop_: 3.0,
                forward: 0.0,
                skip: 3.0,
                exit: 1.5,
            },
        );
        let tm = TransitionModel::new(
            &config,
            model(&[]),
            &crate::state_tying::StateTyingRegistry::default(),
            &crate::config::StateTyingConfig::default(),
        )
        .unwrap();

        let mut a = StaticAutomaton::new(AlphabetKind::Emissions, AlphabetKind::Allophones);
        let s: Vec<StateId> = (0..3).map(|_| a.new_state()).collect();
        a.set_initial(s[0]);
        a.add_arc(s[0], s[1], l(1), l(10), Weight::ONE);
        a.add_arc(s[1], s[2], Label::disambiguator(0), Label::EPSILON, Weight::ONE);
        a.set_final(s[2], Weight::ONE);

        let expanded = tm.apply(&a, l(SIL), false).unwrap();
        let result = expanded.transduce(&[l(1), Label::disambiguator(0)]);
        assert_eq!(result.get(&vec![l(10)]), Some(&1.5));
        // the boundary is never looped
        assert!(!expanded.accepts(&[l(1), Label::disambiguator(0), Label::disambiguator(0)]));

        let mut b = StaticAutomaton::new(AlphabetKind::Emissions, AlphabetKind::Allophones);
        let s: Vec<StateId> = (0..2).map(|_| b.new_state()).collect();
        b.set_initial(s[0]);
        b.add_arc(s[0], s[1], l(1), l(10), Weight::ONE);
        b.set_final(s[1], Weight::ONE);
        let expanded = tm.apply(&b, l(SIL), true).unwrap();
        assert_eq!(expanded.transduce(&[l(1)]).get(&vec![l(10)]), Some(&1.5));
    }

    #[test]
    fn branching_states_are_discharged() {
        // two emissions into state 2 and two out of it
        let mut a = StaticAutomaton::new(AlphabetKind::Emissions, AlphabetKind::Allophones);
        let s: Vec<StateId> = (0..5).map(|_| a.new_state()).collect();
        a.set_initial(s[0]);
        a.add_arc(s[0], s[1], l(1), l(10), Weight::ONE);
        a.add_arc(s[0], s[1], l(2), l(20), Weight::ONE);
        a.add_arc(s[1], s[2], l(3), Label::EPSILON, Weight::ONE);
        a.add_arc(s[1], s[3], l(4), Label::EPSILON, Weight::ONE);
        a.add_arc(s[2], s[4], l(5), Label::EPSILON, Weight::ONE);
        a.add_arc(s[3], s[4], l(5), Label::EPSILON, Weight::ONE);
        a.set_final(s[4], Weight::ONE);

        let tm = global(model(&[]));
        let expanded = tm.apply(&a, l(SIL), false).unwrap();
        for (first, out) in [(1, 10), (2, 20)] {
            for second in [3, 4] {
                let input = [l(first), l(second), l(5)];
                assert_eq!(expanded.transduce(&input).get(&vec![l(out)]), Some(&0.0));
                let looped = [l(first), l(first), l(second), l(5)];
                assert_eq!(expanded.transduce(&looped).get(&vec![l(out)]), Some(&3.0));
            }
            // skip over the middle emission through the discharged state
            let skipped = [l(first), l(5)];
            assert_eq!(expanded.transduce(&skipped).get(&vec![l(out)]), Some(&3.0));
        }
    }
}
