use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;

use super::{Allophone, AlphabetError, Boundary};
use crate::dependency::DependencySet;
use crate::lexicon::Lexicon;
use crate::phonology::Phonology;
use crate::types::{AllophoneIndex, Label, PhonemeId, DISAMBIGUATOR_MASK};

/// Number of distinct allophones an alphabet can hold.
pub const MAX_ALLOPHONES: usize = 1 << 26;
/// Bits of a packed label holding the allophone id.
pub const ID_MASK: u32 = 0x03ff_ffff;

#[derive(Debug, Default)]
struct Inner {
    list: Vec<Arc<Allophone>>,
    map: HashMap<Arc<Allophone>, AllophoneIndex>,
}

/// Interning table numbering allophones densely in insertion order.
///
/// All lookups and insertions take `&self`; the table only ever grows and
/// an index, once handed out, always refers to the same allophone.
#[derive(Debug)]
pub struct AllophoneAlphabet {
    phonology: Arc<Phonology>,
    inner: RwLock<Inner>,
    n_disambiguators: AtomicU32,
    silence: Option<PhonemeId>,
    silence_phonemes: HashSet<PhonemeId>,
    capacity: usize,
}

impl AllophoneAlphabet {
    pub fn new(phonology: Arc<Phonology>) -> AllophoneAlphabet {
        AllophoneAlphabet::with_capacity(phonology, MAX_ALLOPHONES)
    }

    pub(crate) fn with_capacity(phonology: Arc<Phonology>, capacity: usize) -> AllophoneAlphabet {
        AllophoneAlphabet {
            phonology,
            inner: RwLock::new(Inner::default()),
            n_disambiguators: AtomicU32::new(0),
            silence: None,
            silence_phonemes: HashSet::new(),
            capacity: capacity.min(MAX_ALLOPHONES),
        }
    }

    #[inline(always)]
    pub fn phonology(&self) -> &Arc<Phonology> {
        &self.phonology
    }

    pub fn len(&self) -> usize {
        self.inner.read().list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, allophone: Allophone) -> Result<(Arc<Allophone>, bool), AlphabetError> {
        let mut inner = self.inner.write();
        if let Some((existing, _)) = inner.map.get_key_value(&allophone) {
            return Ok((Arc::clone(existing), false));
        }
        if inner.list.len() >= self.capacity {
            return Err(AlphabetError::Capacity(self.capacity));
        }
        let index = AllophoneIndex(inner.list.len() as u32);
        let allophone = Arc::new(allophone);
        inner.list.push(Arc::clone(&allophone));
        inner.map.insert(Arc::clone(&allophone), index);
        Ok((allophone, true))
    }

    /// Index of `allophone`, interning it first if it is new.
    pub fn index_or_insert(&self, allophone: &Allophone) -> Result<AllophoneIndex, AlphabetError> {
        if let Some(index) = self.index(allophone) {
            return Ok(index);
        }
        self.insert(allophone.clone())?;
        self.index(allophone)
            .ok_or_else(|| AlphabetError::Malformed(self.format(allophone)))
    }

    #[inline(always)]
    pub fn index(&self, allophone: &Allophone) -> Option<AllophoneIndex> {
        self.inner.read().map.get(allophone).copied()
    }

    /// The allophone behind `index`.
    ///
    /// # Panics
    ///
    /// If `index` was never handed out by this alphabet.
    pub fn allophone(&self, index: AllophoneIndex) -> Arc<Allophone> {
        let inner = self.inner.read();
        let id = (index.0 & ID_MASK) as usize;
        match inner.list.get(id) {
            Some(a) => Arc::clone(a),
            None => panic!(
                "allophone id {} (label {}) out of range, alphabet holds {} allophones",
                id,
                index.0,
                inner.list.len()
            ),
        }
    }

    /// Snapshot of all allophones in index order.
    pub fn allophones(&self) -> Vec<Arc<Allophone>> {
        self.inner.read().list.clone()
    }

    /// Label of the `d`-th disambiguator; the count of disambiguators grows to cover it.
    pub fn disambiguator(&self, d: u32) -> Label {
        self.n_disambiguators.fetch_max(d + 1, Ordering::Relaxed);
        Label::disambiguator(d)
    }

    #[inline(always)]
    pub fn n_disambiguators(&self) -> u32 {
        self.n_disambiguators.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn is_disambiguator(&self, label: Label) -> bool {
        label.is_disambiguator()
    }

    pub(crate) fn set_silence(&mut self, lexicon: &Lexicon) {
        if let Some(lemma) = lexicon.special_lemma("silence") {
            for pronunciation in lexicon.lemma_pronunciations(lemma) {
                if self.silence.is_none() {
                    self.silence = pronunciation.first().copied();
                }
                self.silence_phonemes.extend(pronunciation.iter().copied());
            }
        }
    }

    /// The first phoneme of the lexicon's silence lemma.
    #[inline(always)]
    pub fn silence(&self) -> Option<PhonemeId> {
        self.silence
    }

    pub fn silence_phonemes(&self) -> &HashSet<PhonemeId> {
        &self.silence_phonemes
    }

    #[inline(always)]
    pub fn is_silence(&self, allophone: &Allophone) -> bool {
        self.silence_phonemes.contains(&allophone.central)
    }

    pub fn format(&self, allophone: &Allophone) -> String {
        let pi = self.phonology.inventory();
        let mut s = String::from(pi.symbol(allophone.central));
        s.push('{');
        if allophone.history.is_empty() {
            s.push('#');
        } else {
            let history: Vec<&str> = allophone.history.iter().rev().map(|&p| pi.symbol(p)).collect();
            s.push_str(&history.join("-"));
        }
        s.push('+');
        if allophone.future.is_empty() {
            s.push('#');
        } else {
            let future: Vec<&str> = allophone.future.iter().map(|&p| pi.symbol(p)).collect();
            s.push_str(&future.join("-"));
        }
        s.push('}');
        s.push_str(allophone.boundary.suffix());
        s
    }

    pub fn parse(&self, symbol: &str) -> Result<Allophone, AlphabetError> {
        let malformed = || AlphabetError::Malformed(symbol.to_string());
        let open = symbol.find('{').ok_or_else(malformed)?;
        let plus = open + symbol[open..].find('+').ok_or_else(malformed)?;
        let close = plus + symbol[plus..].find('}').ok_or_else(malformed)?;

        let central = self.phoneme(&symbol[..open], symbol)?;
        let mut allophone = Allophone::new(central, Boundary::WITHIN);

        let history = &symbol[open + 1..plus];
        if history != "#" {
            for p in history.rsplit('-') {
                let p = self.phoneme(p, symbol)?;
                self.phonology.append_history(&mut allophone, p);
            }
        }
        let future = &symbol[plus + 1..close];
        if future != "#" {
            for p in future.split('-') {
                let p = self.phoneme(p, symbol)?;
                self.phonology.append_future(&mut allophone, p);
            }
        }

        allophone.boundary = match &symbol[close + 1..] {
            "" => Boundary::WITHIN,
            "@i" => Boundary::INITIAL,
            "@f" => Boundary::FINAL,
            "@i@f" => Boundary::INITIAL_FINAL,
            _ => return Err(malformed()),
        };
        Ok(allophone)
    }

    fn phoneme(&self, name: &str, symbol: &str) -> Result<PhonemeId, AlphabetError> {
        self.phonology
            .inventory()
            .by_symbol(name)
            .ok_or_else(|| AlphabetError::UnknownPhoneme {
                phoneme: name.to_string(),
                symbol: symbol.to_string(),
            })
    }

    /// Text form of a label: an allophone symbol, `#k` for disambiguators.
    pub fn symbol(&self, label: Label) -> String {
        if label.is_epsilon() {
            return label.to_string();
        }
        if let Some(d) = label.disambiguator_number() {
            return format!("#{}", d);
        }
        let inner = self.inner.read();
        match inner.list.get((label.0 & ID_MASK) as usize) {
            Some(a) => self.format(a),
            None => {
                log::warn!("symbol requested for unknown allophone id {}", label.0 & ID_MASK);
                String::new()
            }
        }
    }

    /// Label of a symbol produced by [`symbol`](Self::symbol); `None` if the
    /// allophone is well-formed but not in the alphabet.
    pub fn index_of_symbol(&self, symbol: &str) -> Result<Option<Label>, AlphabetError> {
        if let Some(d) = symbol.strip_prefix('#') {
            let d: u32 = d
                .parse()
                .map_err(|_| AlphabetError::Malformed(symbol.to_string()))?;
            return Ok(Some(self.disambiguator(d & DISAMBIGUATOR_MASK)));
        }
        let allophone = self.parse(symbol)?;
        Ok(self.index(&allophone).map(Label::from))
    }

    /// Interns every allophone the context window allows over the phoneme inventory.
    pub fn add_all(&self) -> Result<(), AlphabetError> {
        let pi = self.phonology.inventory();
        let (cd, ci): (Vec<PhonemeId>, Vec<PhonemeId>) = pi
            .iter()
            .map(|p| p.id())
            .partition(|&p| pi.is_context_dependent(p));
        let cross_word = self.phonology.is_cross_word();

        for i in 0..=self.phonology.max_future() {
            let futures = tuples(&cd, i);
            for j in 0..=self.phonology.max_history() {
                let histories = tuples(&cd, j);
                for future in futures.iter() {
                    for history in histories.iter() {
                        let mut boundaries = vec![Boundary::WITHIN];
                        if j == 0 || (cross_word && j <= 1) {
                            boundaries.push(Boundary::INITIAL);
                        }
                        if i == 0 || (cross_word && i <= 1) {
                            boundaries.push(Boundary::FINAL);
                        }
                        if (i == 0 && j == 0) || (cross_word && i <= 1 && j <= 1) {
                            boundaries.push(Boundary::INITIAL_FINAL);
                        }
                        for boundary in boundaries {
                            for &p in cd.iter() {
                                self.insert(Allophone::with_context(
                                    p,
                                    history.clone(),
                                    future.clone(),
                                    boundary,
                                ))?;
                            }
                        }
                    }
                }
            }
        }

        for &p in ci.iter() {
            for boundary in [
                Boundary::WITHIN,
                Boundary::INITIAL,
                Boundary::FINAL,
                Boundary::INITIAL_FINAL,
            ] {
                self.insert(Allophone::new(p, boundary))?;
            }
        }
        log::info!("{} allophones after adding all allophones", self.len());
        Ok(())
    }

    fn create(
        &self,
        pronunciation: &[PhonemeId],
        begin: usize,
        central: usize,
        end: usize,
        boundary: Boundary,
    ) -> Result<(Arc<Allophone>, bool), AlphabetError> {
        let mut allophone = Allophone::new(pronunciation[central], boundary);
        for &p in pronunciation[begin..central].iter().rev() {
            self.phonology.append_history(&mut allophone, p);
        }
        for &p in pronunciation[central + 1..=end].iter() {
            self.phonology.append_future(&mut allophone, p);
        }
        self.insert(allophone)
    }

    /// Interns the allophones occurring in the pronunciations of `lexicon`.
    ///
    /// Each pronunciation is split into runs of context-dependent and
    /// context-independent phonemes; context never crosses a run border.
    /// With cross-word modelling the allophones at word borders are also
    /// added in every context of a word-initial or word-final phoneme.
    pub fn add_from_lexicon(&self, lexicon: &Lexicon) -> Result<(), AlphabetError> {
        let pi = self.phonology.inventory();
        let cd = |p: PhonemeId| pi.is_context_dependent(p);
        let max_history = self.phonology.max_history();
        let max_future = self.phonology.max_future();
        let cross_word = self.phonology.is_cross_word();

        let mut left_cw = Vec::new();
        let mut right_cw = Vec::new();
        let mut left_right_cw = Vec::new();
        let mut initial_phonemes = BTreeSet::new();
        let mut final_phonemes = BTreeSet::new();

        for p in lexicon.pronunciations() {
            if p.is_empty() {
                continue;
            }
            let max_pos = p.len() - 1;
            if cd(p[0]) {
                initial_phonemes.insert(p[0]);
            }
            if cd(p[max_pos]) {
                final_phonemes.insert(p[max_pos]);
            }

            let mut segment_ends: Vec<usize> = (1..=max_pos)
                .filter(|&i| cd(p[i - 1]) != cd(p[i]))
                .map(|i| i - 1)
                .collect();
            segment_ends.push(max_pos);

            let mut first = 0;
            for &last in segment_ends.iter() {
                let (history_len, future_len, is_left_cw, is_right_cw) = if cd(p[first]) {
                    (
                        max_history,
                        max_future,
                        cross_word && first == 0,
                        cross_word && last == max_pos,
                    )
                } else {
                    (0, 0, false, false)
                };
                let initial_flag = if first == 0 { Boundary::INITIAL } else { Boundary::WITHIN };
                let final_flag = if last == max_pos { Boundary::FINAL } else { Boundary::WITHIN };

                if first == last {
                    let (allo, new) = self.create(p, first, first, first, initial_flag | final_flag)?;
                    if new {
                        if is_left_cw && history_len > 0 {
                            left_cw.push(Arc::clone(&allo));
                        }
                        if is_right_cw && future_len > 0 {
                            right_cw.push(Arc::clone(&allo));
                        }
                        if is_left_cw && is_right_cw && history_len > 0 && future_len > 0 {
                            left_right_cw.push(allo);
                        }
                    }
                    first = last + 1;
                    continue;
                }

                let (mut b, mut c, mut e) = (first, first, first + future_len);
                let (allo, new) = self.create(p, first, first, e.min(last), initial_flag)?;
                if history_len == 0 {
                    if new && is_right_cw && e > last {
                        right_cw.push(allo);
                    }
                    b += 1;
                    c += 1;
                    e += 1;
                } else {
                    if new {
                        if is_left_cw {
                            left_cw.push(Arc::clone(&allo));
                        }
                        if e > last && is_right_cw {
                            if is_left_cw {
                                left_right_cw.push(Arc::clone(&allo));
                            }
                            right_cw.push(allo);
                        }
                    }
                    c += 1;
                    e += 1;
                    while c < (first + history_len).min(last) {
                        let (allo, new) = self.create(p, first, c, e.min(last), Boundary::WITHIN)?;
                        if new {
                            if is_left_cw {
                                left_cw.push(Arc::clone(&allo));
                            }
                            if e > last && is_right_cw {
                                if is_left_cw {
                                    left_right_cw.push(Arc::clone(&allo));
                                }
                                right_cw.push(allo);
                            }
                        }
                        c += 1;
                        e += 1;
                    }
                }

                if future_len == 0 {
                    while c < last {
                        self.create(p, b, c, c, Boundary::WITHIN)?;
                        b += 1;
                        c += 1;
                    }
                    self.create(p, b, last, last, final_flag)?;
                } else {
                    while e <= last {
                        self.create(p, b, c, e, Boundary::WITHIN)?;
                        b += 1;
                        c += 1;
                        e += 1;
                    }
                    while c < last {
                        let (allo, new) = self.create(p, b, c, last, Boundary::WITHIN)?;
                        if new && is_right_cw {
                            right_cw.push(allo);
                        }
                        b += 1;
                        c += 1;
                    }
                    let (allo, new) = self.create(p, b, last, last, final_flag)?;
                    if new {
                        if history_len > last && is_left_cw {
                            left_cw.push(Arc::clone(&allo));
                            if is_right_cw {
                                left_right_cw.push(Arc::clone(&allo));
                            }
                        }
                        if is_right_cw {
                            right_cw.push(allo);
                        }
                    }
                }
                first = last + 1;
            }
        }
        log::debug!(
            "{} allophones within words, {} initial and {} final phonemes",
            self.len(),
            initial_phonemes.len(),
            final_phonemes.len()
        );

        if cross_word {
            for allo in left_cw.iter() {
                for &f in final_phonemes.iter() {
                    let mut cw = Allophone::clone(allo);
                    self.phonology.append_history(&mut cw, f);
                    self.insert(cw)?;
                }
            }
            for allo in right_cw.iter() {
                for &i in initial_phonemes.iter() {
                    let mut cw = Allophone::clone(allo);
                    self.phonology.append_future(&mut cw, i);
                    self.insert(cw)?;
                }
            }
            for allo in left_right_cw.iter() {
                for &f in final_phonemes.iter() {
                    for &i in initial_phonemes.iter() {
                        let mut cw = Allophone::clone(allo);
                        self.phonology.append_history(&mut cw, f);
                        self.phonology.append_future(&mut cw, i);
                        self.insert(cw)?;
                    }
                }
            }
        }
        log::info!("{} allophones after adding allophones from lexicon", self.len());
        Ok(())
    }

    /// Interns the allophones listed one per line in `path`.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<(), AlphabetError> {
        let path = path.as_ref();
        if !self.is_empty() {
            log::warn!(
                "indices of allophones in {} may not match the current alphabet",
                path.display()
            );
        }
        let reader = BufReader::new(std::fs::File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (_, new) = self.insert(self.parse(line)?)?;
            if !new {
                log::warn!(
                    "allophone {} from {} already exists; indices may not match the file",
                    line,
                    path.display()
                );
            }
        }
        log::info!(
            "{} allophones after adding allophones from file {}",
            self.len(),
            path.display()
        );
        Ok(())
    }

    pub fn store<P: AsRef<Path>>(&self, path: P) -> Result<(), AlphabetError> {
        let mut writer = BufWriter::new(std::fs::File::create(path.as_ref())?);
        let allophones = self.allophones();
        log::info!("store {} allophones to {}", allophones.len(), path.as_ref().display());
        writeln!(writer, "# Number of allophones: {}", allophones.len())?;
        for a in allophones.iter() {
            writeln!(writer, "{}", self.format(a))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn dependencies(&self) -> DependencySet {
        let mut set = DependencySet::new();
        set.add_value("allophones", self.len().to_string());
        set.add_set("phonology", self.phonology.dependencies());
        set
    }
}

/// All sequences of `len` symbols, last position varying fastest.
fn tuples(symbols: &[PhonemeId], len: usize) -> Vec<Vec<PhonemeId>> {
    let mut out = vec![Vec::with_capacity(len)];
    for _ in 0..len {
        out = out
            .into_iter()
            .flat_map(|prefix| {
                symbols.iter().map(move |&s| {
                    let mut next = prefix.clone();
                    next.push(s);
                    next
                })
            })
            .collect();
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::lexicon::PhonemeInventory;

    pub(crate) fn phonology(cross_word: bool) -> Arc<Phonology> {
        let mut pi = PhonemeInventory::new();
        pi.add("sil", false).unwrap();
        pi.add("a", true).unwrap();
        pi.add("b", true).unwrap();
        Arc::new(Phonology::new(Arc::new(pi), 1, 1, cross_word))
    }

    const SIL: PhonemeId = PhonemeId::new(1);
    const A: PhonemeId = PhonemeId::new(2);
    const B: PhonemeId = PhonemeId::new(3);

    #[test]
    fn interning_is_idempotent_and_bijective() {
        let alphabet = AllophoneAlphabet::new(phonology(false));
        let x = Allophone::with_context(A, vec![B], vec![], Boundary::FINAL);
        let y = Allophone::new(SIL, Boundary::INITIAL_FINAL);
        let ix = alphabet.index_or_insert(&x).unwrap();
        let iy = alphabet.index_or_insert(&y).unwrap();
        assert_ne!(ix, iy);
        assert_eq!(alphabet.index_or_insert(&x).unwrap(), ix);
        assert_eq!(*alphabet.allophone(ix), x);
        assert_eq!(*alphabet.allophone(iy), y);
        assert_eq!(alphabet.len(), 2);
    }

    #[test]
    #[should_panic]
    fn unknown_index_is_a_contract_violation() {
        let alphabet = AllophoneAlphabet::new(phonology(false));
        alphabet.allophone(AllophoneIndex(3));
    }

    #[test]
    fn capacity_is_enforced() {
        let alphabet = AllophoneAlphabet::with_capacity(phonology(false), 3);
        alphabet.add_all().unwrap_err();
        assert_eq!(alphabet.len(), 3);
        let known = alphabet.allophone(AllophoneIndex(0));
        assert!(alphabet.index_or_insert(&known).is_ok());
        match alphabet.index_or_insert(&Allophone::new(B, Boundary::INITIAL_FINAL)) {
            Err(AlphabetError::Capacity(3)) => {}
            other => panic!("expected capacity error, got {:?}", other),
        }
    }

    #[test]
    fn disambiguators_never_collide() {
        let alphabet = AllophoneAlphabet::new(phonology(false));
        alphabet.add_all().unwrap();
        let d0 = alphabet.disambiguator(0);
        let d3 = alphabet.disambiguator(3);
        assert_ne!(d0, d3);
        assert_eq!(alphabet.n_disambiguators(), 4);
        alphabet.disambiguator(1);
        assert_eq!(alphabet.n_disambiguators(), 4);
        for i in 0..alphabet.len() as u32 {
            assert_ne!(Label::new(i), d0);
            assert_ne!(Label::new(i), d3);
        }
        assert_eq!(alphabet.symbol(d3), "#3");
        assert_eq!(alphabet.index_of_symbol("#3").unwrap(), Some(d3));
    }

    #[test]
    fn exhaustive_alphabet_over_three_phonemes() {
        let alphabet = AllophoneAlphabet::new(phonology(false));
        alphabet.add_all().unwrap();
        let all = alphabet.allophones();
        assert_eq!(all.len(), 36);

        let count = |b: Boundary, central_cd: bool| {
            all.iter()
                .filter(|a| a.boundary == b && (a.central != SIL) == central_cd)
                .count()
        };
        assert_eq!(count(Boundary::WITHIN, true), 18);
        assert_eq!(count(Boundary::INITIAL, true), 6);
        assert_eq!(count(Boundary::FINAL, true), 6);
        assert_eq!(count(Boundary::INITIAL_FINAL, true), 2);
        assert_eq!(all.iter().filter(|a| a.central == SIL).count(), 4);
        assert!(all
            .iter()
            .filter(|a| a.boundary.is_initial())
            .all(|a| a.history.is_empty()));
    }

    #[test]
    fn cross_word_allows_context_at_boundaries() {
        let alphabet = AllophoneAlphabet::new(phonology(true));
        alphabet.add_all().unwrap();
        let x = Allophone::with_context(A, vec![B], vec![A], Boundary::INITIAL_FINAL);
        assert!(alphabet.index(&x).is_some());
    }

    #[test]
    fn symbols_round_trip() {
        let alphabet = AllophoneAlphabet::new(phonology(false));
        let x = Allophone::with_context(A, vec![B], vec![A], Boundary::INITIAL);
        let ix = alphabet.index_or_insert(&x).unwrap();
        let s = alphabet.symbol(Label::from(ix));
        assert_eq!(s, "a{b+a}@i");
        assert_eq!(alphabet.parse(&s).unwrap(), x);
        assert_eq!(alphabet.index_of_symbol(&s).unwrap(), Some(Label::from(ix)));

        let y = Allophone::new(SIL, Boundary::WITHIN);
        assert_eq!(alphabet.format(&y), "sil{#+#}");
        assert_eq!(alphabet.index_of_symbol("sil{#+#}").unwrap(), None);
        assert!(alphabet.parse("q{#+#}").is_err());
        assert!(alphabet.parse("a{#+#}@x").is_err());
        assert!(alphabet.parse("a#+#").is_err());
    }

    #[test]
    fn lexicon_population_follows_pronunciations() {
        let phonology = phonology(false);
        let pi = PhonemeInventory::clone(phonology.inventory());
        let mut lexicon = Lexicon::new(pi);
        lexicon.add_lemma(["[SILENCE]"], &["sil"], Some("silence")).unwrap();
        lexicon.add_lemma(["ab"], &["a b"], None).unwrap();
        lexicon.add_lemma(["aba"], &["a b a"], None).unwrap();

        let mut alphabet = AllophoneAlphabet::new(phonology);
        alphabet.add_from_lexicon(&lexicon).unwrap();
        alphabet.set_silence(&lexicon);

        let expected = [
            "sil{#+#}@i@f",
            "a{#+b}@i",
            "b{a+#}@f",
            "b{a+a}",
            "a{b+#}@f",
        ];
        let symbols: Vec<String> = alphabet
            .allophones()
            .iter()
            .map(|a| alphabet.format(a))
            .collect();
        assert_eq!(symbols, expected);
        assert_eq!(alphabet.silence(), Some(SIL));
        assert!(alphabet.is_silence(&Allophone::new(SIL, Boundary::WITHIN)));
    }

    #[test]
    fn store_then_load_reproduces_indices() {
        let original = AllophoneAlphabet::new(phonology(false));
        original.add_all().unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        original.store(file.path()).unwrap();

        let contents = std::fs::read_to_string(file.path()).unwrap();
        assert!(contents.starts_with("# Number of allophones: 36\n"));

        let loaded = AllophoneAlphabet::new(phonology(false));
        loaded.load(file.path()).unwrap();
        assert_eq!(loaded.allophones(), original.allophones());
    }
}
