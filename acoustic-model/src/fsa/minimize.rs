use hashbrown::HashMap;

use super::{State, StateId, StaticAutomaton, Transition};

type ArcKey = (u32, u32, u32, StateId);

fn arc_keys(state: &State, block: &[StateId]) -> Vec<ArcKey> {
    let mut keys: Vec<ArcKey> = state
        .transitions
        .iter()
        .map(|t| (t.input.0, t.output.0, t.weight.0.to_bits(), block[t.target as usize]))
        .collect();
    keys.sort_unstable();
    keys.dedup();
    keys
}

/// Partition refinement: states stay together while they agree on final
/// weight and on their arcs' labels, weights and target blocks.
pub(super) fn merge_equivalent_states(a: &mut StaticAutomaton) {
    let n = a.states.len();
    if n <= 1 {
        return;
    }

    let mut block: Vec<StateId> = vec![0; n];
    let mut n_blocks = 1;
    loop {
        let mut signatures: HashMap<(StateId, Option<u32>, Vec<ArcKey>), StateId> = HashMap::new();
        let mut next = Vec::with_capacity(n);
        for (s, state) in a.states.iter().enumerate() {
            let key = (
                block[s],
                state.final_weight.map(|w| w.0.to_bits()),
                arc_keys(state, &block),
            );
            let id = signatures.len() as StateId;
            next.push(*signatures.entry(key).or_insert(id));
        }
        block = next;
        if signatures.len() == n_blocks {
            break;
        }
        n_blocks = signatures.len();
    }

    if n_blocks == n {
        return;
    }
    log::debug!("minimization merged {} states into {}", n, n_blocks);

    let mut states: Vec<Option<State>> = vec![None; n_blocks];
    for (s, state) in a.states.iter().enumerate() {
        let b = block[s] as usize;
        if states[b].is_some() {
            continue;
        }
        let transitions = arc_keys(state, &block)
            .into_iter()
            .map(|(input, output, weight, target)| Transition {
                target,
                weight: crate::types::Weight(f32::from_bits(weight)),
                input: crate::types::Label(input),
                output: crate::types::Label(output),
            })
            .collect();
        states[b] = Some(State {
            transitions,
            final_weight: state.final_weight,
        });
    }
    a.states = states.into_iter().flatten().collect();
    a.initial = a.initial.map(|s| block[s as usize]);
}
