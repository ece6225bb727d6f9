use std::cmp::Ordering;
use std::collections::BTreeMap;

use hashbrown::HashMap;

use super::{emission_label, TransducerBuilder};
use crate::acoustic::AcousticModel;
use crate::allophone::{Allophone, AllophoneStateAlphabet, Boundary};
use crate::error::{Error, Result};
use crate::fsa::{AlphabetKind, StateId, StaticAutomaton};
use crate::hmm::HmmTopology;
use crate::lexicon::{Coarticulated, Pronunciation};
use crate::types::{AllophoneIndex, Label, PhonemeId, Weight};

const INTRA_WORD: u8 = 0;
const WORD_START: u8 = 1;
const WORD_END: u8 = 2;

/// Context and word-boundary position shared by all allophones that meet
/// at one state of a phone loop.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PhoneBoundary {
    history: Vec<PhonemeId>,
    future: Vec<PhonemeId>,
    flag: u8,
}

impl PhoneBoundary {
    #[inline(always)]
    fn is_word_start(&self) -> bool {
        self.flag & WORD_START != 0
    }

    #[inline(always)]
    fn is_word_end(&self) -> bool {
        self.flag & WORD_END != 0
    }

    #[inline(always)]
    fn is_coarticulated(&self) -> bool {
        !self.history.is_empty() || !self.future.is_empty()
    }
}

/// The rest of an allophone's state chain from some sub-state onwards.
#[derive(Clone, Copy, Debug)]
struct AllophoneSuffix {
    allophone: AllophoneIndex,
    state: u8,
    sub_state: u8,
    topology: HmmTopology,
    target: StateId,
}

#[derive(Debug, Default)]
struct Statistics {
    boundary_states: BTreeMap<(u8, bool), u32>,
    n_allophones: usize,
}

impl Statistics {
    fn accumulate(&mut self, boundary: &PhoneBoundary) {
        *self
            .boundary_states
            .entry((boundary.flag, boundary.is_coarticulated()))
            .or_insert(0) += 1;
    }

    fn log(&self) {
        log::info!("{} distinct allophones", self.n_allophones);
        for (&(flag, coarticulated), n) in self.boundary_states.iter() {
            let boundary = match flag {
                INTRA_WORD => "intra-word",
                WORD_START => "word-start",
                WORD_END => "word-end",
                _ => "word-start|word-end",
            };
            log::info!(
                "{} phone boundary states (boundary: {}, coarticulated: {})",
                n,
                boundary,
                coarticulated
            );
        }
    }
}

/// One automaton under construction together with the state sharing tables.
pub(super) struct Construction<'b> {
    am: &'b AcousticModel,
    input: AlphabetKind,
    coarticulated_single_pronunciation: bool,
    n_disambiguators: u32,
    product: StaticAutomaton,
    boundaries: HashMap<PhoneBoundary, StateId>,
    suffixes: HashMap<u64, Vec<(AllophoneSuffix, StateId)>>,
    statistics: Statistics,
}

impl<'b> Construction<'b> {
    pub(super) fn new(builder: &TransducerBuilder<'b>, output: AlphabetKind) -> Construction<'b> {
        Construction {
            am: builder.am,
            input: builder.input,
            coarticulated_single_pronunciation: builder.coarticulated_single_pronunciation,
            n_disambiguators: builder.n_disambiguators,
            product: StaticAutomaton::new(builder.input, output),
            boundaries: HashMap::new(),
            suffixes: HashMap::with_capacity(2500),
            statistics: Statistics::default(),
        }
    }

    #[inline(always)]
    pub(super) fn n_disambiguators(&self) -> u32 {
        self.n_disambiguators
    }

    pub(super) fn into_product(self) -> StaticAutomaton {
        self.product
    }

    fn phone_boundary_state(&mut self, boundary: PhoneBoundary) -> StateId {
        if let Some(&s) = self.boundaries.get(&boundary) {
            return s;
        }
        let s = self.product.new_state();
        if boundary.is_word_start() && !boundary.is_coarticulated() {
            self.setup_word_start(s);
        }
        self.statistics.accumulate(&boundary);
        self.boundaries.insert(boundary.clone(), s);
        if boundary.is_word_end() {
            self.setup_word_end(s, boundary);
        }
        s
    }

    fn setup_word_start(&mut self, s: StateId) {
        self.product.set_initial(s);
        if !self.coarticulated_single_pronunciation {
            self.product.set_final(s, Weight::ONE);
        }
    }

    fn setup_word_end(&mut self, s: StateId, mut boundary: PhoneBoundary) {
        if self.coarticulated_single_pronunciation {
            self.product.set_final(s, Weight::ONE);
        } else {
            boundary.flag &= !WORD_END;
            boundary.flag |= WORD_START;
            let start = self.phone_boundary_state(boundary);
            self.build_word_boundary_links(s, start);
        }
    }

    fn phone_start_state(&mut self, allophone: &Allophone) -> StateId {
        let mut boundary = PhoneBoundary {
            history: allophone.history.clone(),
            future: allophone.future.clone(),
            flag: INTRA_WORD,
        };
        self.am
            .phonology()
            .push_future(&mut boundary.future, allophone.central);
        if allophone.boundary.is_initial() {
            boundary.flag |= WORD_START;
            if self.coarticulated_single_pronunciation {
                boundary.history.clear();
            }
        }
        // context-independent phonemes also occur inside words, e.g. noise sequences
        if boundary.history.is_empty() {
            boundary.future.clear();
        }
        self.phone_boundary_state(boundary)
    }

    fn phone_end_state(&mut self, allophone: &Allophone) -> StateId {
        let mut boundary = PhoneBoundary {
            history: allophone.history.clone(),
            future: allophone.future.clone(),
            flag: INTRA_WORD,
        };
        self.am
            .phonology()
            .push_history(&mut boundary.history, allophone.central);
        if allophone.boundary.is_final() {
            boundary.flag |= WORD_END;
            if self.coarticulated_single_pronunciation {
                boundary.future.clear();
            }
        }
        if boundary.future.is_empty() {
            boundary.history.clear();
        }
        self.phone_boundary_state(boundary)
    }

    fn build_allophone(
        &mut self,
        index: AllophoneIndex,
        allophone: &Allophone,
        start: StateId,
        end: StateId,
    ) -> Result<()> {
        match self.input {
            AlphabetKind::Allophones => {
                self.product.add_arc(
                    start,
                    end,
                    Label::from(index),
                    Label::from(allophone.central),
                    Weight::ONE,
                );
                Ok(())
            }
            _ => self.build_allophone_states(index, allophone, start, end),
        }
    }

    /// Builds `allophone` from `start` into a new state and returns it.
    fn build_allophone_from(&mut self, allophone: &Allophone, start: StateId) -> Result<StateId> {
        let index = self.am.allophone_alphabet().index_or_insert(allophone)?;
        let end = self.product.new_state();
        self.build_allophone(index, allophone, start, end)?;
        Ok(end)
    }

    fn state_label(&self, allophone: AllophoneIndex, state: u8) -> Label {
        match self.input {
            AlphabetKind::AllophoneStates => Label::from(AllophoneStateAlphabet::pack(allophone, state)),
            AlphabetKind::Emissions => Label::from(
                self.am
                    .state_tying()
                    .classify(&self.am.state_model().allophone_state(allophone, state)),
            ),
            other => unreachable!("{:?} input has no state labels", other),
        }
    }

    fn hash_suffix(&self, suffix: &AllophoneSuffix) -> u64 {
        let mut h = suffix.target as u64;
        for state in suffix.state..suffix.topology.n_phone_states() {
            h = (h << 11) ^ (h >> 21);
            h ^= self.state_label(suffix.allophone, state).value() as u64;
        }
        h.wrapping_add(suffix.topology.n_sub_states() as u64)
            .wrapping_add(suffix.sub_state as u64)
    }

    fn compare_suffixes(&self, l: &AllophoneSuffix, r: &AllophoneSuffix) -> Ordering {
        let head = l
            .target
            .cmp(&r.target)
            .then(l.sub_state.cmp(&r.sub_state))
            .then(l.topology.n_sub_states().cmp(&r.topology.n_sub_states()));
        if head != Ordering::Equal {
            return head;
        }
        let (mut ls, mut rs) = (l.state, r.state);
        loop {
            let l_done = ls >= l.topology.n_phone_states();
            let r_done = rs >= r.topology.n_phone_states();
            match (l_done, r_done) {
                (true, true) => return Ordering::Equal,
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                _ => {}
            }
            let order = self
                .state_label(l.allophone, ls)
                .value()
                .cmp(&self.state_label(r.allophone, rs).value());
            if order != Ordering::Equal {
                return order;
            }
            ls += 1;
            rs += 1;
        }
    }

    fn find_suffix(&self, suffix: &AllophoneSuffix) -> Option<StateId> {
        self.suffixes.get(&self.hash_suffix(suffix)).and_then(|bucket| {
            bucket
                .iter()
                .find(|(other, _)| self.compare_suffixes(suffix, other) == Ordering::Equal)
                .map(|&(_, s)| s)
        })
    }

    fn insert_suffix(&mut self, suffix: AllophoneSuffix, s: StateId) {
        let h = self.hash_suffix(&suffix);
        self.suffixes.entry(h).or_insert_with(Vec::new).push((suffix, s));
    }

    /// Chain of sub-state arcs from `start` to `end`. The chain joins an
    /// existing one as soon as the remaining labels and target agree.
    fn build_allophone_states(
        &mut self,
        index: AllophoneIndex,
        allophone: &Allophone,
        start: StateId,
        end: StateId,
    ) -> Result<()> {
        let topology = *self.am.state_model().hmm_topology(allophone);
        if self.input == AlphabetKind::Emissions {
            for state in 0..topology.n_phone_states() {
                emission_label(self.am, index, state)?;
            }
        }
        let mut suffix = AllophoneSuffix {
            allophone: index,
            state: 0,
            sub_state: 0,
            topology,
            target: end,
        };
        let mut output = match self.product.output_alphabet() {
            AlphabetKind::Phonemes => Label::from(allophone.central),
            AlphabetKind::Allophones => Label::from(index),
            _ => Label::EPSILON,
        };

        let mut from = start;
        loop {
            let input = self.state_label(suffix.allophone, suffix.state);
            suffix.sub_state += 1;
            if suffix.sub_state >= topology.n_sub_states() {
                suffix.sub_state = 0;
                suffix.state += 1;
            }
            let target = if suffix.state >= topology.n_phone_states() {
                Some(end)
            } else {
                self.find_suffix(&suffix)
            };
            match target {
                Some(target) => {
                    self.product.add_arc(from, target, input, output, Weight::ONE);
                    return Ok(());
                }
                None => {
                    let next = self.product.new_state();
                    self.product.add_arc(from, next, input, output, Weight::ONE);
                    self.insert_suffix(suffix, next);
                    from = next;
                }
            }
            output = Label::EPSILON;
        }
    }

    fn build_word_boundary_links(&mut self, from: StateId, to: StateId) {
        if self.n_disambiguators == 0 {
            self.product
                .add_arc(from, to, Label::EPSILON, Label::EPSILON, Weight::ONE);
            return;
        }
        let alphabet = self.am.allophone_alphabet();
        for d in 0..self.n_disambiguators {
            let input = match self.input {
                AlphabetKind::Emissions => Label::disambiguator(d),
                _ => alphabet.disambiguator(d),
            };
            let output = match self.product.output_alphabet() {
                AlphabetKind::Allophones => alphabet.disambiguator(d),
                _ => Label::disambiguator(d),
            };
            self.product.add_arc(from, to, input, output, Weight::ONE);
        }
    }

    pub(super) fn build_phone_loop(&mut self) -> Result<()> {
        if self.coarticulated_single_pronunciation && self.n_disambiguators > 0 {
            return Err(Error::Builder(
                "disambiguators cannot be used with coarticulated single pronunciations".into(),
            ));
        }
        let alphabet = self.am.allophone_alphabet();
        let allophones = alphabet.allophones();
        log::debug!("building state model transducer over {} allophones", allophones.len());
        for (i, allophone) in allophones.iter().enumerate() {
            let start = self.phone_start_state(allophone);
            let end = self.phone_end_state(allophone);
            self.build_allophone(AllophoneIndex(i as u32), allophone, start, end)?;
            log::trace!("{}", alphabet.format(allophone));
        }
        self.statistics.n_allophones = allophones.len();
        self.statistics.log();
        Ok(())
    }

    pub(super) fn build_allophone_loop(&mut self) -> Result<()> {
        let allophones = self.am.allophone_alphabet().allophones();
        let initial = self.product.new_state();
        self.product.set_initial(initial);
        self.product.set_final(initial, Weight::ONE);
        for (i, allophone) in allophones.iter().enumerate() {
            self.build_allophone(AllophoneIndex(i as u32), allophone, initial, initial)?;
        }
        self.suffixes.clear();
        self.build_word_boundary_links(initial, initial);
        Ok(())
    }

    /// Silence and noise loops after the word ending in `s`; returns the new final state.
    fn build_silence_and_noise_loops(&mut self, silences: &[Pronunciation], s: StateId) -> Result<StateId> {
        let alphabet = self.am.allophone_alphabet();
        alphabet.disambiguator(0);
        self.n_disambiguators = alphabet.n_disambiguators();

        let final_state = self.product.new_state();
        self.build_word_boundary_links(s, final_state);
        let phonology = self.am.phonology();
        for pronunciation in silences.iter() {
            match pronunciation.len() {
                0 => {}
                1 => {
                    let mut allophone = phonology.context_of(pronunciation, 0);
                    allophone.boundary = Boundary::INITIAL_FINAL;
                    if phonology.inventory().is_context_dependent(allophone.central) {
                        return Err(Error::Builder(format!(
                            "silence or noise phoneme {} is context dependent",
                            phonology.inventory().symbol(allophone.central)
                        )));
                    }
                    let index = alphabet.index_or_insert(&allophone)?;
                    self.build_allophone(index, &allophone, final_state, s)?;
                }
                n => {
                    return Err(Error::Builder(format!(
                        "silence and noise pronunciations have at most one phoneme, got {}",
                        n
                    )))
                }
            }
        }
        Ok(final_state)
    }

    pub(super) fn build_pronunciation(
        &mut self,
        coarticulated: &Coarticulated,
        silences: Option<&[Pronunciation]>,
    ) -> Result<()> {
        self.n_disambiguators = 0;
        let phonology = self.am.phonology();
        let inventory = phonology.inventory();
        let across_word = self.am.is_across_word_model_enabled();
        let p = &coarticulated.pronunciation;
        let left = coarticulated.left_context;
        let right = coarticulated.right_context;
        let crosses = |allophone: &Allophone| across_word && inventory.is_context_dependent(allophone.central);

        let mut s = self.product.new_state();
        self.product.set_initial(s);
        if p.len() == 1 {
            let mut allophone = phonology.context_of(p, 0);
            allophone.boundary = Boundary::INITIAL_FINAL;
            if crosses(&allophone) {
                if !left.is_term() {
                    phonology.append_history(&mut allophone, left);
                }
                if !right.is_term() {
                    phonology.append_future(&mut allophone, right);
                }
            }
            s = self.build_allophone_from(&allophone, s)?;
        } else if p.len() > 1 {
            let mut initial = phonology.context_of(p, 0);
            initial.boundary = Boundary::INITIAL;
            if !left.is_term() && crosses(&initial) {
                phonology.append_history(&mut initial, left);
            }
            s = self.build_allophone_from(&initial, s)?;

            for i in 1..p.len() - 1 {
                let allophone = phonology.context_of(p, i);
                s = self.build_allophone_from(&allophone, s)?;
            }

            let mut last = phonology.context_of(p, p.len() - 1);
            last.boundary = Boundary::FINAL;
            if !right.is_term() && crosses(&last) {
                phonology.append_future(&mut last, right);
            }
            s = self.build_allophone_from(&last, s)?;
        }

        if let Some(silences) = silences {
            if right.is_term() {
                s = self.build_silence_and_noise_loops(silences, s)?;
            }
        }
        self.product.set_final(s, Weight::ONE);
        Ok(())
    }
}
