//! Phoneme inventory and pronunciation lexicon.
//!
//! Only the parts an acoustic model consumes are modelled: phoneme symbols
//! with their context dependency, lemmas with pronunciations, and special
//! lemmas such as `silence`.

use std::path::Path;
use std::sync::Arc;

use hashbrown::HashMap;
use serde::Deserialize;
use serde_xml_rs::{from_reader, ParserConfig};
use smol_str::SmolStr;
use thiserror::Error;

use crate::types::PhonemeId;

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed lexicon: {0}")]
    Xml(#[from] serde_xml_rs::Error),
    #[error("bad phoneme symbol `{0}`: must not contain `{{`, `}}` or `+`, nor `-` after a leading `[`")]
    BadPhonemeSymbol(String),
    #[error("phoneme `{0}` is defined twice")]
    DuplicatePhoneme(String),
    #[error("unknown phoneme `{symbol}` in pronunciation `{pronunciation}`")]
    UnknownPhoneme {
        symbol: String,
        pronunciation: String,
    },
}

#[derive(Debug, Clone)]
pub struct Phoneme {
    pub(crate) id: PhonemeId,
    pub(crate) symbol: SmolStr,
    pub(crate) context_dependent: bool,
}

impl Phoneme {
    #[inline(always)]
    pub fn id(&self) -> PhonemeId {
        self.id
    }

    #[inline(always)]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[inline(always)]
    pub fn is_context_dependent(&self) -> bool {
        self.context_dependent
    }
}

#[derive(Debug, Clone, Default)]
pub struct PhonemeInventory {
    phonemes: Vec<Phoneme>,
    by_symbol: HashMap<SmolStr, PhonemeId>,
}

fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && !symbol.contains(|c| c == '{' || c == '}' || c == '+')
        && !(symbol.contains('-') && symbol.starts_with('['))
        && symbol != "#"
}

impl PhonemeInventory {
    pub fn new() -> PhonemeInventory {
        PhonemeInventory::default()
    }

    pub fn add(&mut self, symbol: &str, context_dependent: bool) -> Result<PhonemeId, LexiconError> {
        if !is_valid_symbol(symbol) {
            return Err(LexiconError::BadPhonemeSymbol(symbol.to_string()));
        }
        if self.by_symbol.contains_key(symbol) {
            return Err(LexiconError::DuplicatePhoneme(symbol.to_string()));
        }
        let id = PhonemeId(self.phonemes.len() as u16).incr();
        self.phonemes.push(Phoneme {
            id,
            symbol: symbol.into(),
            context_dependent,
        });
        self.by_symbol.insert(symbol.into(), id);
        Ok(id)
    }

    /// Number of phonemes, not counting the term sentinel.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.phonemes.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.phonemes.is_empty()
    }

    #[inline(always)]
    pub fn phoneme(&self, id: PhonemeId) -> Option<&Phoneme> {
        if id.is_term() {
            return None;
        }
        self.phonemes.get(id.0 as usize - 1)
    }

    #[inline(always)]
    pub fn by_symbol(&self, symbol: &str) -> Option<PhonemeId> {
        self.by_symbol.get(symbol).copied()
    }

    /// Symbol of a phoneme; the term sentinel prints as `#`.
    pub fn symbol(&self, id: PhonemeId) -> &str {
        match self.phoneme(id) {
            Some(p) => p.symbol(),
            None => "#",
        }
    }

    #[inline(always)]
    pub fn is_context_dependent(&self, id: PhonemeId) -> bool {
        self.phoneme(id).map(|p| p.context_dependent).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Phoneme> {
        self.phonemes.iter()
    }

    /// Phonemes matching `pattern`; a `*` at the start or end matches any
    /// suffix or prefix of the symbol.
    pub fn selection(&self, pattern: &str) -> Vec<PhonemeId> {
        let (prefix_any, rest) = match pattern.strip_prefix('*') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };
        let (suffix_any, core) = match rest.strip_suffix('*') {
            Some(core) => (true, core),
            None => (false, rest),
        };
        self.phonemes
            .iter()
            .filter(|p| {
                let s = p.symbol();
                match (prefix_any, suffix_any) {
                    (false, false) => s == core,
                    (true, false) => s.ends_with(core),
                    (false, true) => s.starts_with(core),
                    (true, true) => s.contains(core),
                }
            })
            .map(|p| p.id)
            .collect()
    }
}

pub type Pronunciation = Vec<PhonemeId>;

/// A pronunciation together with the phonemes of its neighbouring words.
/// [`PhonemeId::TERM`] marks a missing neighbour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coarticulated {
    pub pronunciation: Pronunciation,
    pub left_context: PhonemeId,
    pub right_context: PhonemeId,
}

impl Coarticulated {
    pub fn new(pronunciation: Pronunciation) -> Coarticulated {
        Coarticulated {
            pronunciation,
            left_context: PhonemeId::TERM,
            right_context: PhonemeId::TERM,
        }
    }

    pub fn with_context(
        pronunciation: Pronunciation,
        left_context: PhonemeId,
        right_context: PhonemeId,
    ) -> Coarticulated {
        Coarticulated {
            pronunciation,
            left_context,
            right_context,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lemma {
    pub(crate) orth: Vec<SmolStr>,
    pub(crate) special: Option<SmolStr>,
    pub(crate) pronunciations: Vec<usize>,
}

impl Lemma {
    pub fn orth(&self) -> &[SmolStr] {
        &self.orth
    }

    pub fn special(&self) -> Option<&str> {
        self.special.as_deref()
    }
}

#[derive(Debug)]
pub struct Lexicon {
    inventory: Arc<PhonemeInventory>,
    lemmas: Vec<Lemma>,
    pronunciations: Vec<Pronunciation>,
    pronunciation_index: HashMap<Pronunciation, usize>,
}

#[derive(Debug, Deserialize)]
struct LexiconDocument {
    #[serde(rename = "phoneme-inventory")]
    phoneme_inventory: PhonemeInventoryDocument,
    #[serde(rename = "lemma", default)]
    lemmas: Vec<LemmaDocument>,
}

#[derive(Debug, Deserialize)]
struct PhonemeInventoryDocument {
    #[serde(rename = "phoneme", default)]
    phonemes: Vec<PhonemeDocument>,
}

#[derive(Debug, Deserialize)]
struct PhonemeDocument {
    symbol: String,
    #[serde(default)]
    variation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LemmaDocument {
    #[serde(default)]
    special: Option<String>,
    #[serde(default)]
    orth: Vec<String>,
    #[serde(default)]
    phon: Vec<String>,
}

impl Lexicon {
    pub fn new(inventory: PhonemeInventory) -> Lexicon {
        Lexicon {
            inventory: Arc::new(inventory),
            lemmas: vec![],
            pronunciations: vec![],
            pronunciation_index: HashMap::new(),
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Lexicon, LexiconError> {
        let bytes = std::fs::read(path)?;
        Lexicon::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Lexicon, LexiconError> {
        // the XML declaration must be the first thing the parser sees
        let start = bytes
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(bytes.len());
        let bytes = &bytes[start..];
        let mut reader = ParserConfig::new()
            .trim_whitespace(true)
            .ignore_comments(true)
            .coalesce_characters(true)
            .create_reader(bytes)
            .into_inner();

        let document: LexiconDocument = from_reader(&mut reader)?;

        let mut inventory = PhonemeInventory::new();
        for phoneme in document.phoneme_inventory.phonemes.iter() {
            let context_dependent = phoneme.variation.as_deref() != Some("none");
            inventory.add(phoneme.symbol.trim(), context_dependent)?;
        }

        let mut lexicon = Lexicon::new(inventory);
        for lemma in document.lemmas.iter() {
            let phon: Vec<&str> = lemma.phon.iter().map(|p| p.as_str()).collect();
            lexicon.add_lemma(
                lemma.orth.iter().map(|o| o.trim()),
                &phon,
                lemma.special.as_deref(),
            )?;
        }
        log::info!(
            "lexicon: {} phonemes, {} lemmas, {} distinct pronunciations",
            lexicon.inventory.len(),
            lexicon.lemmas.len(),
            lexicon.pronunciations.len()
        );
        Ok(lexicon)
    }

    pub fn parse_pronunciation(&self, text: &str) -> Result<Pronunciation, LexiconError> {
        text.split_whitespace()
            .map(|symbol| {
                self.inventory
                    .by_symbol(symbol)
                    .ok_or_else(|| LexiconError::UnknownPhoneme {
                        symbol: symbol.to_string(),
                        pronunciation: text.to_string(),
                    })
            })
            .collect()
    }

    pub fn add_lemma<'a, I>(
        &mut self,
        orth: I,
        pronunciations: &[&str],
        special: Option<&str>,
    ) -> Result<usize, LexiconError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut indices = Vec::with_capacity(pronunciations.len());
        for text in pronunciations {
            let pronunciation = self.parse_pronunciation(text)?;
            let next = self.pronunciations.len();
            let index = *self
                .pronunciation_index
                .entry(pronunciation.clone())
                .or_insert(next);
            if index == next {
                self.pronunciations.push(pronunciation);
            }
            indices.push(index);
        }
        self.lemmas.push(Lemma {
            orth: orth.into_iter().map(SmolStr::from).collect(),
            special: special.map(SmolStr::from),
            pronunciations: indices,
        });
        Ok(self.lemmas.len() - 1)
    }

    #[inline(always)]
    pub fn phoneme_inventory(&self) -> &Arc<PhonemeInventory> {
        &self.inventory
    }

    /// Distinct pronunciations in the order they were first seen.
    #[inline(always)]
    pub fn pronunciations(&self) -> &[Pronunciation] {
        &self.pronunciations
    }

    pub fn lemmas(&self) -> &[Lemma] {
        &self.lemmas
    }

    pub fn special_lemma(&self, name: &str) -> Option<&Lemma> {
        self.lemmas.iter().find(|l| l.special.as_deref() == Some(name))
    }

    pub fn lemma_pronunciations<'a>(
        &'a self,
        lemma: &'a Lemma,
    ) -> impl Iterator<Item = &'a Pronunciation> + 'a {
        lemma.pronunciations.iter().map(move |&i| &self.pronunciations[i])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const LEXICON_XML: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
        <lexicon>
          <phoneme-inventory>
            <phoneme><symbol>si</symbol><variation>none</variation></phoneme>
            <phoneme><symbol>a</symbol></phoneme>
            <phoneme><symbol>b</symbol><variation>context</variation></phoneme>
          </phoneme-inventory>
          <lemma special="silence">
            <orth>[SILENCE]</orth>
            <phon>si</phon>
          </lemma>
          <lemma>
            <orth>ab</orth>
            <phon>a b</phon>
          </lemma>
          <lemma>
            <orth>ba</orth>
            <phon>b a</phon>
            <phon>b a b</phon>
          </lemma>
          <lemma>
            <orth>a</orth>
            <phon>a</phon>
          </lemma>
        </lexicon>
    "##;

    #[test]
    fn parses_xml_lexicon() {
        let lexicon = Lexicon::from_bytes(LEXICON_XML.as_bytes()).unwrap();
        let pi = lexicon.phoneme_inventory();
        assert_eq!(pi.len(), 3);
        let si = pi.by_symbol("si").unwrap();
        assert_eq!(si, PhonemeId(1));
        assert!(!pi.is_context_dependent(si));
        assert!(pi.is_context_dependent(pi.by_symbol("a").unwrap()));
        assert!(pi.is_context_dependent(pi.by_symbol("b").unwrap()));
        assert_eq!(lexicon.lemmas().len(), 4);
        assert_eq!(lexicon.pronunciations().len(), 5);

        let silence = lexicon.special_lemma("silence").unwrap();
        let prons: Vec<_> = lexicon.lemma_pronunciations(silence).collect();
        assert_eq!(prons, vec![&vec![si]]);
    }

    #[test]
    fn whitespace_before_the_declaration_is_skipped() {
        let indented = format!("\n        {}", LEXICON_XML);
        let lexicon = Lexicon::from_bytes(indented.as_bytes()).unwrap();
        assert_eq!(lexicon.phoneme_inventory().len(), 3);
        assert_eq!(lexicon.lemmas().len(), 4);
    }

    #[test]
    fn rejects_symbols_clashing_with_allophone_syntax() {
        let mut pi = PhonemeInventory::new();
        assert!(pi.add("a+", true).is_err());
        assert!(pi.add("{x", true).is_err());
        assert!(pi.add("[a-b]", true).is_err());
        assert!(pi.add("a-b", true).is_ok());
        assert!(pi.add("a-b", true).is_err());
    }

    #[test]
    fn selection_with_wildcards() {
        let mut pi = PhonemeInventory::new();
        let nsp = pi.add("[NOISE]", false).unwrap();
        let hes = pi.add("[HES]", false).unwrap();
        let a = pi.add("a", true).unwrap();
        assert_eq!(pi.selection("[*"), vec![nsp, hes]);
        assert_eq!(pi.selection("a"), vec![a]);
        assert_eq!(pi.selection("*]"), vec![nsp, hes]);
        assert!(pi.selection("x").is_empty());
    }

    #[test]
    fn duplicate_pronunciations_are_shared() {
        let mut pi = PhonemeInventory::new();
        pi.add("a", true).unwrap();
        let mut lexicon = Lexicon::new(pi);
        lexicon.add_lemma(["x"], &["a a"], None).unwrap();
        lexicon.add_lemma(["y"], &["a a", "a"], None).unwrap();
        assert_eq!(lexicon.pronunciations().len(), 2);
        assert!(lexicon.add_lemma(["z"], &["q"], None).is_err());
    }
}
