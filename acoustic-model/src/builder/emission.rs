use hashbrown::HashMap;

use super::{emission_label, TransducerBuilder};
use crate::allophone::AllophoneStateAlphabet;
use crate::error::Result;
use crate::fsa::{AlphabetKind, StateId, StaticAutomaton};
use crate::transition::{StateType, TransitionType};
use crate::types::{AllophoneIndex, Label, Weight};

impl<'a> TransducerBuilder<'a> {
    /// Loop over the HMM state sequences of all allophones, outputting the
    /// allophone on its first arc.
    ///
    /// Allophones whose remaining label sequences agree share states. With
    /// `transition_model` the input are emission labels and the states carry
    /// loop, forward, skip and exit scores; otherwise the input are
    /// allophone states and all weights are one.
    pub fn create_emission_loop_transducer(&self, transition_model: bool) -> Result<StaticAutomaton> {
        let am = self.am;
        let alphabet = am.allophone_alphabet();
        let input = if transition_model {
            AlphabetKind::Emissions
        } else {
            AlphabetKind::AllophoneStates
        };
        let label = |index: AllophoneIndex, state: u8| {
            if transition_model {
                emission_label(am, index, state)
            } else {
                Ok(Label::from(AllophoneStateAlphabet::pack(index, state)))
            }
        };

        let mut a = StaticAutomaton::new(input, AlphabetKind::Allophones);
        let initial = a.new_state();
        a.set_initial(initial);
        a.set_final(initial, Weight::ONE);

        let tm = am.transition_model();
        let entry = tm.get(StateType::ENTRY_M1).get(TransitionType::Forward);
        let mut minimized: HashMap<Vec<Label>, StateId> = HashMap::new();

        for (i, allophone) in alphabet.allophones().iter().enumerate() {
            let index = AllophoneIndex(i as u32);
            let topology = am.state_model().hmm_topology(allophone);
            let n_sub_states = topology.n_sub_states() as usize;
            let n_states = topology.n_phone_states() as usize * n_sub_states;
            let tdp = if Some(allophone.central) == am.silence() {
                tm.get(StateType::SILENCE)
            } else {
                tm.get(StateType::PHONE_0)
            };
            let hmm: Vec<Label> = (0..n_states)
                .map(|s| label(index, (s / n_sub_states) as u8))
                .collect::<Result<_>>()?;

            let mut from = initial;
            let mut from_skip: Option<StateId> = None;
            let mut forward = Weight::ONE;
            for s in 0..n_states {
                let first = s == 0;
                let last = s == n_states - 1;
                let input = hmm[s];
                let shared = minimized.get(&hmm[s..]).copied();
                let to = match shared {
                    Some(to) => to,
                    None if last && !transition_model => initial,
                    None => {
                        let to = a.new_state();
                        minimized.insert(hmm[s..].to_vec(), to);
                        if transition_model {
                            a.add_arc(to, to, input, Label::EPSILON, tdp.get(TransitionType::Loop));
                            if last {
                                a.add_arc(to, initial, Label::EPSILON, Label::EPSILON, Weight::ONE);
                            }
                        }
                        to
                    }
                };

                if transition_model {
                    forward = if first {
                        let mut w = entry;
                        if allophone.boundary.is_final() {
                            w += tdp.get(TransitionType::Exit);
                        }
                        w
                    } else {
                        tdp.get(TransitionType::Forward)
                    };
                    let skip = tdp.get(TransitionType::Skip);
                    if let Some(from_skip) = from_skip {
                        if !skip.is_max() {
                            let output = if from_skip == initial {
                                Label::from(index)
                            } else {
                                Label::EPSILON
                            };
                            a.add_arc(from_skip, to, input, output, skip);
                        }
                    }
                }

                let output = if first { Label::from(index) } else { Label::EPSILON };
                a.add_arc(from, to, input, output, forward);
                if shared.is_some() {
                    break;
                }
                from_skip = Some(from);
                from = to;
            }
        }

        for d in 0..self.n_disambiguators {
            let input = if transition_model {
                Label::disambiguator(d)
            } else {
                alphabet.disambiguator(d)
            };
            a.add_arc(initial, initial, input, alphabet.disambiguator(d), Weight::ONE);
        }
        log::debug!(
            "emission loop: {} states, {} arcs for {} allophones",
            a.n_states(),
            a.n_transitions(),
            alphabet.len()
        );
        Ok(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acoustic::tests::acoustic_model;
    use crate::allophone::Boundary;
    use crate::builder::tests::allophone;

    #[test]
    fn flat_emission_loop_reads_allophone_states() {
        let am = acoustic_model("{}");
        let builder = TransducerBuilder::new(&am);
        let t = builder.create_emission_loop_transducer(false).unwrap();
        assert_eq!(t.input_alphabet(), AlphabetKind::AllophoneStates);

        let index = allophone(&am, "a", &[], &["b"], Boundary::INITIAL);
        let input: Vec<Label> = (0..3u8)
            .flat_map(|s| {
                let l = Label::from(AllophoneStateAlphabet::pack(index, s));
                [l, l]
            })
            .collect();
        let results = t.transduce(&input);
        assert_eq!(results.len(), 1);
        assert_eq!(results.get(&vec![Label::from(index)]), Some(&0.0));
        // no loops without a transition model
        assert!(!t.accepts(&[input[0], input[0], input[0]]));

        let mut twice = input.clone();
        twice.extend(input.iter().copied());
        assert_eq!(
            t.transduce(&twice).get(&vec![Label::from(index), Label::from(index)]),
            Some(&0.0)
        );
    }

    #[test]
    fn emission_loop_with_transition_model() {
        let am = acoustic_model(r#"{ "tdp": { "models": { "entry-m1": { "forward": 1.0 }, "state-0": { "exit": 2.0 } } } }"#);
        let mut builder = TransducerBuilder::new(&am);
        builder.set_disambiguators(1);
        let t = builder.create_emission_loop_transducer(true).unwrap();
        assert_eq!(t.input_alphabet(), AlphabetKind::Emissions);

        let index = allophone(&am, "a", &[], &["b"], Boundary::INITIAL);
        let e: Vec<Label> = (0..3u8)
            .map(|s| Label::from(am.state_tying().classify(&am.state_model().allophone_state(index, s))))
            .collect();
        let flat = [e[0], e[0], e[1], e[1], e[2], e[2]];
        let results = t.transduce(&flat);
        // every allophone of `a` has the same monophone labels
        let n_a = am
            .allophone_alphabet()
            .allophones()
            .iter()
            .filter(|a| a.central == am.lexicon().phoneme_inventory().by_symbol("a").unwrap())
            .count();
        assert_eq!(results.len(), n_a);
        assert_eq!(results.get(&vec![Label::from(index)]), Some(&1.0));

        let final_index = allophone(&am, "a", &[], &[], Boundary::INITIAL_FINAL);
        assert_eq!(results.get(&vec![Label::from(final_index)]), Some(&3.0));

        let looped = [e[0], e[0], e[0], e[1], e[1], e[2], e[2]];
        assert_eq!(t.transduce(&looped).get(&vec![Label::from(index)]), Some(&4.0));
        // a{#+b}@i is the first `a` in the alphabet and built the shared
        // chain, so only it skips straight out of the initial state
        let skipped = [e[0], e[1], e[1], e[2], e[2]];
        let results = t.transduce(&skipped);
        assert_eq!(results.get(&vec![Label::from(index)]), Some(&3.0));
        assert_eq!(results.get(&vec![Label::from(final_index)]), Some(&6.0));

        let d = Label::disambiguator(0);
        assert_eq!(t.transduce(&[d]).get(&vec![d]), Some(&0.0));
    }
}
