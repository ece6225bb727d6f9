//! Construction of state-model transducers.
//!
//! A [`TransducerBuilder`] is configured once and can then produce phoneme
//! loops, single pronunciations, allophone and emission loops and the
//! context-dependency transducer for one acoustic model. Every build
//! operation starts from a fresh automaton; configuration is never changed
//! by building.

mod construction;
mod context;
mod emission;

use crate::acoustic::AcousticModel;
use crate::allophone::{Allophone, AllophoneStateAlphabet, Boundary};
use crate::error::{Error, Result};
use crate::fsa::{AlphabetKind, StaticAutomaton};
use crate::lexicon::{Coarticulated, Pronunciation};
use crate::types::{AllophoneIndex, Label};

use self::construction::Construction;

#[derive(Debug, Clone)]
pub struct TransducerBuilder<'a> {
    am: &'a AcousticModel,
    input: AlphabetKind,
    n_disambiguators: u32,
    apply_transition_model: bool,
    coarticulated_single_pronunciation: bool,
    silences_and_noises: Option<Vec<Pronunciation>>,
}

impl<'a> TransducerBuilder<'a> {
    /// A builder reading emission labels, applying the transition model and
    /// using non-coarticulated sentence boundaries.
    pub fn new(am: &'a AcousticModel) -> TransducerBuilder<'a> {
        TransducerBuilder {
            am,
            input: AlphabetKind::Emissions,
            n_disambiguators: 0,
            apply_transition_model: true,
            coarticulated_single_pronunciation: false,
            silences_and_noises: None,
        }
    }

    #[inline(always)]
    pub fn acoustic_model(&self) -> &'a AcousticModel {
        self.am
    }

    #[inline(always)]
    pub fn input_alphabet(&self) -> AlphabetKind {
        self.input
    }

    #[inline(always)]
    pub fn n_disambiguators(&self) -> u32 {
        self.n_disambiguators
    }

    pub fn set_disambiguators(&mut self, n: u32) -> &mut Self {
        self.n_disambiguators = n;
        self
    }

    pub fn select_allophones_from_lexicon(&mut self) -> Result<&mut Self> {
        let alphabet = self.am.allophone_alphabet();
        alphabet.add_from_lexicon(self.am.lexicon())?;
        log::info!("{} distinct allophones found", alphabet.len());
        Ok(self)
    }

    pub fn select_all_allophones(&mut self) -> Result<&mut Self> {
        let alphabet = self.am.allophone_alphabet();
        alphabet.add_all()?;
        log::info!("{} distinct allophones possible", alphabet.len());
        Ok(self)
    }

    pub fn select_non_coarticulated_sentence_boundaries(&mut self) -> &mut Self {
        self.coarticulated_single_pronunciation = false;
        self
    }

    /// Word boundary states become final instead of looping back to the
    /// start, so a phone loop accepts exactly one coarticulated word.
    pub fn select_coarticulated_single_pronunciation(&mut self) -> &mut Self {
        self.coarticulated_single_pronunciation = true;
        self
    }

    pub fn select_flat_model(&mut self) -> &mut Self {
        self.apply_transition_model = false;
        self
    }

    pub fn select_transition_model(&mut self) -> &mut Self {
        self.apply_transition_model = true;
        self
    }

    /// Pronunciations that may follow a word built by
    /// [`create_pronunciation_transducer`](Self::create_pronunciation_transducer).
    pub fn set_silences_and_noises(&mut self, pronunciations: Vec<Pronunciation>) -> &mut Self {
        self.silences_and_noises = Some(pronunciations);
        self
    }

    pub fn select_allophones_as_input(&mut self) -> &mut Self {
        self.input = AlphabetKind::Allophones;
        self
    }

    pub fn select_allophone_states_as_input(&mut self) -> &mut Self {
        self.input = AlphabetKind::AllophoneStates;
        self
    }

    pub fn select_emission_labels_as_input(&mut self) -> &mut Self {
        self.input = AlphabetKind::Emissions;
        self
    }

    /// Loop over all allophones of the alphabet, linked through shared
    /// phone-boundary states; the output are phonemes.
    pub fn create_phoneme_loop_transducer(&self) -> Result<StaticAutomaton> {
        let mut construction = Construction::new(self, AlphabetKind::Phonemes);
        construction.build_phone_loop()?;
        self.finalize(construction)
    }

    pub fn create_pronunciation_transducer(&self, coarticulated: &Coarticulated) -> Result<StaticAutomaton> {
        let mut construction = Construction::new(self, AlphabetKind::Phonemes);
        construction.build_pronunciation(coarticulated, self.silences_and_noises.as_deref())?;
        self.finalize(construction)
    }

    /// Single-state loop over all allophones with allophones as output.
    pub fn create_allophone_loop_transducer(&self) -> Result<StaticAutomaton> {
        if self.input == AlphabetKind::Allophones {
            return Err(Error::Builder(
                "an allophone loop needs allophone states or emissions as input".into(),
            ));
        }
        let mut construction = Construction::new(self, AlphabetKind::Allophones);
        construction.build_allophone_loop()?;
        self.finalize(construction)
    }

    /// Expands a flat automaton with the loop, skip and exit transitions of
    /// the transition model. Exit scores go on final states when no
    /// disambiguators are configured.
    pub fn apply_transition_model(&self, automaton: &StaticAutomaton) -> Result<StaticAutomaton> {
        self.apply(automaton, self.n_disambiguators == 0)
    }

    fn apply(&self, automaton: &StaticAutomaton, exit_to_final: bool) -> Result<StaticAutomaton> {
        let silence = self.silence_label(automaton.input_alphabet())?;
        self.am
            .transition_model()
            .apply(automaton, silence, exit_to_final)
    }

    /// Input label of the first state of the context-independent silence.
    fn silence_label(&self, input: AlphabetKind) -> Result<Label> {
        if !matches!(input, AlphabetKind::AllophoneStates | AlphabetKind::Emissions) {
            return Err(Error::Builder(format!(
                "cannot apply the transition model to {:?} input",
                input
            )));
        }
        let silence = self
            .am
            .silence()
            .ok_or_else(|| Error::Builder("acoustic model has no silence phoneme".into()))?;
        let alphabet = self.am.allophone_alphabet();
        let allophone = Allophone::new(silence, Boundary::INITIAL_FINAL);
        let index = alphabet.index(&allophone).ok_or_else(|| {
            Error::Builder(format!("silence allophone {} is not in the alphabet", alphabet.format(&allophone)))
        })?;
        match input {
            AlphabetKind::Emissions => emission_label(self.am, index, 0),
            _ => Ok(Label::from(AllophoneStateAlphabet::pack(index, 0))),
        }
    }

    fn finalize(&self, construction: Construction<'_>) -> Result<StaticAutomaton> {
        let exit_to_final = construction.n_disambiguators() == 0;
        let mut product = construction.into_product();
        if self.apply_transition_model {
            product = self.apply(&product, exit_to_final)?;
        }
        product.trim();
        log::debug!(
            "state model transducer: {} states, {} arcs",
            product.n_states(),
            product.n_transitions()
        );
        Ok(product)
    }
}

/// Emission class of an allophone state as an input label. A state the
/// tying cannot classify is an error: its invalid class would read as epsilon.
fn emission_label(am: &AcousticModel, index: AllophoneIndex, state: u8) -> Result<Label> {
    let allophone_state = am.state_model().allophone_state(index, state);
    let emission = am.state_tying().classify(&allophone_state);
    if !emission.is_valid() {
        return Err(Error::Builder(format!(
            "state tying has no emission class for {}",
            am.allophone_state_alphabet().format(&allophone_state)
        )));
    }
    Ok(Label::from(emission))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::acoustic::tests::acoustic_model;
    use crate::types::{PhonemeId, Weight};

    pub(crate) fn phoneme(am: &AcousticModel, symbol: &str) -> PhonemeId {
        am.lexicon().phoneme_inventory().by_symbol(symbol).unwrap()
    }

    pub(crate) fn allophone(
        am: &AcousticModel,
        central: &str,
        history: &[&str],
        future: &[&str],
        boundary: Boundary,
    ) -> AllophoneIndex {
        let allophone = Allophone::with_context(
            phoneme(am, central),
            history.iter().map(|s| phoneme(am, s)).collect(),
            future.iter().map(|s| phoneme(am, s)).collect(),
            boundary,
        );
        am.allophone_alphabet().index(&allophone).unwrap()
    }

    /// State labels of an allophone with the default three states repeated twice.
    fn state_labels(index: AllophoneIndex) -> Vec<Label> {
        (0..3u8)
            .flat_map(|s| {
                let label = Label::from(AllophoneStateAlphabet::pack(index, s));
                [label, label]
            })
            .collect()
    }

    fn labels(am: &AcousticModel, symbols: &[&str]) -> Vec<Label> {
        symbols.iter().map(|s| Label::from(phoneme(am, s))).collect()
    }

    #[test]
    fn phoneme_loop_on_allophones() {
        let am = acoustic_model("{}");
        let mut builder = TransducerBuilder::new(&am);
        builder.select_allophones_as_input().select_flat_model();
        let t = builder.create_phoneme_loop_transducer().unwrap();

        let a = Label::from(allophone(&am, "a", &[], &["b"], Boundary::INITIAL));
        let b = Label::from(allophone(&am, "b", &["a"], &[], Boundary::FINAL));
        let si = Label::from(allophone(&am, "si", &[], &[], Boundary::INITIAL_FINAL));

        let results = t.transduce(&[a, b, si]);
        assert_eq!(results.len(), 1);
        assert_eq!(results.get(&labels(&am, &["a", "b", "si"])), Some(&0.0));
        assert!(t.accepts(&[]));
        assert!(!t.accepts(&[a]));
        assert!(!t.accepts(&[b, a]));
    }

    #[test]
    fn phoneme_loop_on_allophone_states() {
        let am = acoustic_model("{}");
        let mut builder = TransducerBuilder::new(&am);
        builder.select_allophone_states_as_input().select_flat_model();
        let t = builder.create_phoneme_loop_transducer().unwrap();

        let mut input = state_labels(allophone(&am, "b", &[], &["a"], Boundary::INITIAL));
        input.extend(state_labels(allophone(&am, "a", &["b"], &["b"], Boundary::WITHIN)));
        input.extend(state_labels(allophone(&am, "b", &["a"], &[], Boundary::FINAL)));
        assert_eq!(
            t.transduce(&input).keys().collect::<Vec<_>>(),
            vec![&labels(&am, &["b", "a", "b"])]
        );
        assert!(!t.accepts(&input[..input.len() - 1]));
    }

    #[test]
    fn coarticulated_single_pronunciation_ends_at_the_word_end() {
        let am = acoustic_model("{}");
        let mut builder = TransducerBuilder::new(&am);
        builder
            .select_allophones_as_input()
            .select_flat_model()
            .select_coarticulated_single_pronunciation();
        let t = builder.create_phoneme_loop_transducer().unwrap();

        let a = Label::from(allophone(&am, "a", &[], &[], Boundary::INITIAL_FINAL));
        assert!(t.accepts(&[a]));
        assert!(!t.accepts(&[a, a]));
        assert!(!t.accepts(&[]));

        builder.set_disambiguators(1);
        assert!(matches!(
            builder.create_phoneme_loop_transducer(),
            Err(Error::Builder(_))
        ));
    }

    #[test]
    fn word_boundaries_carry_disambiguators() {
        let am = acoustic_model("{}");
        let mut builder = TransducerBuilder::new(&am);
        builder
            .select_allophones_as_input()
            .select_flat_model()
            .set_disambiguators(2);
        let t = builder.create_phoneme_loop_transducer().unwrap();

        let a = Label::from(allophone(&am, "a", &[], &[], Boundary::INITIAL_FINAL));
        assert!(!t.accepts(&[a, a]));
        // every word end needs a disambiguator to get back to the start
        assert!(!t.accepts(&[a, Label::disambiguator(1), a]));
        let results = t.transduce(&[a, Label::disambiguator(1), a, Label::disambiguator(0)]);
        let mut expected = labels(&am, &["a"]);
        expected.push(Label::disambiguator(1));
        expected.extend(labels(&am, &["a"]));
        expected.push(Label::disambiguator(0));
        assert_eq!(results.keys().collect::<Vec<_>>(), vec![&expected]);
    }

    #[test]
    fn pronunciation_with_silence_loops() {
        let am = acoustic_model("{}");
        let mut builder = TransducerBuilder::new(&am);
        builder
            .select_allophone_states_as_input()
            .select_flat_model()
            .set_silences_and_noises(vec![vec![phoneme(&am, "si")]]);
        let word = Coarticulated::new(vec![phoneme(&am, "a"), phoneme(&am, "b")]);
        let t = builder.create_pronunciation_transducer(&word).unwrap();

        let mut input = state_labels(allophone(&am, "a", &[], &["b"], Boundary::INITIAL));
        input.extend(state_labels(allophone(&am, "b", &["a"], &[], Boundary::FINAL)));
        let si = allophone(&am, "si", &[], &[], Boundary::INITIAL_FINAL);
        let si = Label::from(AllophoneStateAlphabet::pack(si, 0));

        let mut ab = labels(&am, &["a", "b"]);
        assert!(t.transduce(&input).is_empty());
        input.push(Label::disambiguator(0));
        ab.push(Label::disambiguator(0));
        assert!(t.transduce(&input).contains_key(&ab));

        input.extend([si, Label::disambiguator(0)]);
        ab.extend(labels(&am, &["si"]));
        ab.push(Label::disambiguator(0));
        assert!(t.transduce(&input).contains_key(&ab));
        // the configured count is left alone
        assert_eq!(builder.n_disambiguators(), 0);
    }

    #[test]
    fn pronunciation_with_transition_model() {
        let am = acoustic_model("{}");
        let builder = TransducerBuilder::new(&am);
        let word = Coarticulated::new(vec![phoneme(&am, "a")]);
        let t = builder.create_pronunciation_transducer(&word).unwrap();
        assert_eq!(t.input_alphabet(), AlphabetKind::Emissions);

        let index = allophone(&am, "a", &[], &[], Boundary::INITIAL_FINAL);
        let e: Vec<Label> = (0..3u8)
            .map(|s| Label::from(am.state_tying().classify(&am.state_model().allophone_state(index, s))))
            .collect();
        let a = labels(&am, &["a"]);

        let flat = [e[0], e[0], e[1], e[1], e[2], e[2]];
        assert_eq!(t.transduce(&flat).get(&a), Some(&0.0));
        let looped = [e[0], e[0], e[0], e[1], e[1], e[2], e[2]];
        assert_eq!(t.transduce(&looped).get(&a), Some(&3.0));
    }

    #[test]
    fn transition_model_is_applied_on_request() {
        let am = acoustic_model("{}");
        let mut builder = TransducerBuilder::new(&am);
        builder.select_flat_model();
        let word = Coarticulated::new(vec![phoneme(&am, "a")]);
        let flat = builder.create_pronunciation_transducer(&word).unwrap();

        let index = allophone(&am, "a", &[], &[], Boundary::INITIAL_FINAL);
        let e: Vec<Label> = (0..3u8)
            .map(|s| Label::from(am.state_tying().classify(&am.state_model().allophone_state(index, s))))
            .collect();
        let looped = [e[0], e[0], e[0], e[1], e[1], e[2], e[2]];
        assert!(!flat.accepts(&looped));

        let applied = builder.apply_transition_model(&flat).unwrap();
        assert_eq!(applied.input_alphabet(), AlphabetKind::Emissions);
        assert_eq!(applied.transduce(&looped).get(&labels(&am, &["a"])), Some(&3.0));
    }

    #[test]
    fn allophone_loop_shares_state_suffixes() {
        let am = acoustic_model("{}");
        let mut builder = TransducerBuilder::new(&am);
        builder.select_flat_model();
        let t = builder.create_allophone_loop_transducer().unwrap();
        assert_eq!(t.output_alphabet(), AlphabetKind::Allophones);
        // monophone classes: every allophone of a phoneme shares the chain
        // after its first arc
        assert_eq!(t.n_states(), 1 + 5 + 5);

        let index = allophone(&am, "b", &["a"], &[], Boundary::FINAL);
        let e: Vec<Label> = (0..3u8)
            .map(|s| Label::from(am.state_tying().classify(&am.state_model().allophone_state(index, s))))
            .collect();
        let results = t.transduce(&[e[0], e[0], e[1], e[1], e[2], e[2]]);
        assert!(results.contains_key(&vec![Label::from(index)]));
        assert_eq!(
            results.len(),
            am.allophone_alphabet()
                .allophones()
                .iter()
                .filter(|a| a.central == phoneme(&am, "b"))
                .count()
        );

        builder.select_allophones_as_input();
        assert!(matches!(
            builder.create_allophone_loop_transducer(),
            Err(Error::Builder(_))
        ));
    }

    #[test]
    fn transition_model_needs_state_input() {
        let am = acoustic_model("{}");
        let builder = TransducerBuilder::new(&am);
        let mut a = StaticAutomaton::new(AlphabetKind::Allophones, AlphabetKind::Phonemes);
        let s = a.new_state();
        a.set_initial(s);
        a.set_final(s, Weight::ONE);
        assert!(matches!(builder.apply_transition_model(&a), Err(Error::Builder(_))));
    }

    #[test]
    fn unclassified_states_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tying.lut");
        std::fs::write(&path, "si{#+#}@i@f.0 0\n").unwrap();
        let am = acoustic_model(&format!(
            r#"{{ "state-tying": {{ "type": "lut", "file": {:?} }} }}"#,
            path.to_str().unwrap()
        ));
        let mut builder = TransducerBuilder::new(&am);
        builder.select_flat_model();
        assert!(matches!(builder.create_emission_loop_transducer(true), Err(Error::Builder(_))));
        assert!(matches!(builder.create_allophone_loop_transducer(), Err(Error::Builder(_))));
        let word = Coarticulated::new(vec![phoneme(&am, "a")]);
        assert!(matches!(builder.create_pronunciation_transducer(&word), Err(Error::Builder(_))));

        // allophone state labels need no tying
        assert!(builder.create_emission_loop_transducer(false).is_ok());
        builder.select_allophone_states_as_input();
        assert!(builder.create_allophone_loop_transducer().is_ok());
        assert!(builder.create_pronunciation_transducer(&word).is_ok());
    }
}
