use std::sync::Arc;

use super::{Allophone, AllophoneAlphabet, AllophoneState, AlphabetError, ID_MASK};
use crate::hmm::HmmTopologySet;
use crate::types::{AllophoneIndex, AllophoneStateIndex, Label, DISAMBIGUATOR_MASK};

/// Bits of a packed label holding the HMM sub-state.
pub const STATE_MASK: u32 = 0x3c00_0000;
pub const MAX_STATE_ID: u32 = 15;
const STATE_SHIFT: u32 = 26;

/// Labels for single HMM states of allophones.
///
/// A label packs the allophone index into the low 26 bits and the state
/// into the four bits above.
#[derive(Debug, Clone)]
pub struct AllophoneStateAlphabet {
    allophones: Arc<AllophoneAlphabet>,
    hmm: Arc<HmmTopologySet>,
}

impl AllophoneStateAlphabet {
    pub fn new(allophones: Arc<AllophoneAlphabet>, hmm: Arc<HmmTopologySet>) -> AllophoneStateAlphabet {
        AllophoneStateAlphabet { allophones, hmm }
    }

    #[inline(always)]
    pub fn allophone_alphabet(&self) -> &Arc<AllophoneAlphabet> {
        &self.allophones
    }

    #[inline(always)]
    pub fn hmm_topologies(&self) -> &Arc<HmmTopologySet> {
        &self.hmm
    }

    #[inline(always)]
    pub fn pack(allophone: AllophoneIndex, state: u8) -> AllophoneStateIndex {
        assert!(
            state as u32 <= MAX_STATE_ID,
            "sub-state {} exceeds the maximum of {}",
            state,
            MAX_STATE_ID
        );
        AllophoneStateIndex((allophone.0 & ID_MASK) | ((state as u32) << STATE_SHIFT))
    }

    #[inline(always)]
    pub fn unpack(id: AllophoneStateIndex) -> (AllophoneIndex, u8) {
        (
            AllophoneIndex(id.0 & ID_MASK),
            ((id.0 & STATE_MASK) >> STATE_SHIFT) as u8,
        )
    }

    #[inline(always)]
    pub fn index(&self, state: &AllophoneState) -> AllophoneStateIndex {
        Self::pack(state.allophone_index(), state.state())
    }

    /// Packed label of an allophone state, without interning the allophone.
    pub fn index_of(&self, allophone: &Allophone, state: u8) -> Option<AllophoneStateIndex> {
        self.allophones
            .index(allophone)
            .map(|index| Self::pack(index, state))
    }

    pub fn index_or_insert(
        &self,
        allophone: &Allophone,
        state: u8,
    ) -> Result<AllophoneStateIndex, AlphabetError> {
        Ok(Self::pack(self.allophones.index_or_insert(allophone)?, state))
    }

    pub fn allophone_state(&self, id: AllophoneStateIndex) -> AllophoneState {
        let (index, state) = Self::unpack(id);
        AllophoneState::new(self.allophones.allophone(index), index, state)
    }

    /// Allophone state of an already interned allophone.
    pub fn allophone_state_of(&self, index: AllophoneIndex, state: u8) -> AllophoneState {
        AllophoneState::new(self.allophones.allophone(index), index, state)
    }

    /// Total number of phone states over all interned allophones.
    pub fn n_classes(&self) -> u32 {
        self.allophones
            .allophones()
            .iter()
            .map(|a| self.hmm.get(a.central).n_phone_states() as u32)
            .sum()
    }

    /// Allophone states of all currently interned allophones, allophone-major.
    pub fn allophone_states(&self) -> AllophoneStates {
        AllophoneStates {
            allophones: self.allophones.allophones(),
            hmm: Arc::clone(&self.hmm),
            allophone: 0,
            state: 0,
        }
    }

    #[inline(always)]
    pub fn disambiguator(&self, d: u32) -> Label {
        self.allophones.disambiguator(d)
    }

    #[inline(always)]
    pub fn n_disambiguators(&self) -> u32 {
        self.allophones.n_disambiguators()
    }

    pub fn format(&self, state: &AllophoneState) -> String {
        format!("{}.{}", self.allophones.format(state.allophone()), state.state())
    }

    pub fn symbol(&self, label: Label) -> String {
        if label.is_epsilon() {
            return label.to_string();
        }
        if let Some(d) = label.disambiguator_number() {
            return format!("#{}", d);
        }
        self.format(&self.allophone_state(AllophoneStateIndex(label.0)))
    }

    /// Label of `allophone.state`; the state is taken after the last `.` so
    /// that `.` may occur in phoneme symbols.
    pub fn index_of_symbol(&self, symbol: &str) -> Result<Option<Label>, AlphabetError> {
        if let Some(d) = symbol.strip_prefix('#') {
            let d: u32 = d
                .parse()
                .map_err(|_| AlphabetError::Malformed(symbol.to_string()))?;
            return Ok(Some(self.disambiguator(d & DISAMBIGUATOR_MASK)));
        }
        let (allophone, state) = self.parse(symbol)?;
        Ok(self.index_of(&allophone, state).map(Label::from))
    }

    pub fn parse(&self, symbol: &str) -> Result<(Allophone, u8), AlphabetError> {
        let malformed = || AlphabetError::Malformed(symbol.to_string());
        let dot = symbol.rfind('.').ok_or_else(malformed)?;
        let state: u8 = symbol[dot + 1..].parse().map_err(|_| malformed())?;
        if state as u32 > MAX_STATE_ID {
            return Err(malformed());
        }
        Ok((self.allophones.parse(&symbol[..dot])?, state))
    }
}

pub struct AllophoneStates {
    allophones: Vec<Arc<Allophone>>,
    hmm: Arc<HmmTopologySet>,
    allophone: usize,
    state: u8,
}

impl Iterator for AllophoneStates {
    type Item = AllophoneState;

    fn next(&mut self) -> Option<AllophoneState> {
        loop {
            let allophone = self.allophones.get(self.allophone)?;
            if self.state < self.hmm.get(allophone.central).n_phone_states() {
                let item = AllophoneState::new(
                    Arc::clone(allophone),
                    AllophoneIndex(self.allophone as u32),
                    self.state,
                );
                self.state += 1;
                return Some(item);
            }
            self.allophone += 1;
            self.state = 0;
        }
    }
}
