//! Allophones (phonemes in context) and the alphabets that number them.

mod alphabet;
mod state;

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use thiserror::Error;

use crate::types::{AllophoneIndex, PhonemeId};

pub use self::alphabet::{AllophoneAlphabet, ID_MASK, MAX_ALLOPHONES};
pub use self::state::{AllophoneStateAlphabet, AllophoneStates, MAX_STATE_ID, STATE_MASK};

#[derive(Debug, Error)]
pub enum AlphabetError {
    #[error("allophone alphabet is full ({0} allophones)")]
    Capacity(usize),
    #[error("unknown phoneme `{phoneme}` in `{symbol}`")]
    UnknownPhoneme { phoneme: String, symbol: String },
    #[error("malformed allophone symbol `{0}`")]
    Malformed(String),
    #[error("i/o error on allophone file: {0}")]
    Io(#[from] std::io::Error),
}

/// Word boundary flags of an allophone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Boundary(u8);

impl Boundary {
    pub const WITHIN: Boundary = Boundary(0);
    pub const INITIAL: Boundary = Boundary(1);
    pub const FINAL: Boundary = Boundary(2);
    pub const INITIAL_FINAL: Boundary = Boundary(3);

    #[inline(always)]
    pub fn bits(&self) -> u8 {
        self.0
    }

    #[inline(always)]
    pub fn is_initial(&self) -> bool {
        self.0 & Self::INITIAL.0 != 0
    }

    #[inline(always)]
    pub fn is_final(&self) -> bool {
        self.0 & Self::FINAL.0 != 0
    }

    /// The text suffix used in allophone symbols.
    pub fn suffix(&self) -> &'static str {
        match self.0 {
            1 => "@i",
            2 => "@f",
            3 => "@i@f",
            _ => "",
        }
    }
}

impl BitOr for Boundary {
    type Output = Boundary;

    fn bitor(self, rhs: Boundary) -> Boundary {
        Boundary(self.0 | rhs.0)
    }
}

/// A central phoneme with its left and right context and boundary flags.
///
/// Both context vectors are stored nearest-first: `history[0]` is the
/// phoneme immediately to the left.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Allophone {
    pub central: PhonemeId,
    pub history: Vec<PhonemeId>,
    pub future: Vec<PhonemeId>,
    pub boundary: Boundary,
}

impl Allophone {
    pub fn new(central: PhonemeId, boundary: Boundary) -> Allophone {
        Allophone {
            central,
            history: Vec::new(),
            future: Vec::new(),
            boundary,
        }
    }

    pub fn with_context(
        central: PhonemeId,
        history: Vec<PhonemeId>,
        future: Vec<PhonemeId>,
        boundary: Boundary,
    ) -> Allophone {
        Allophone {
            central,
            history,
            future,
            boundary,
        }
    }

    /// History phoneme at distance `i + 1`, or term.
    #[inline(always)]
    pub fn history_at(&self, i: usize) -> PhonemeId {
        self.history.get(i).copied().unwrap_or(PhonemeId::TERM)
    }

    #[inline(always)]
    pub fn future_at(&self, i: usize) -> PhonemeId {
        self.future.get(i).copied().unwrap_or(PhonemeId::TERM)
    }
}

/// One HMM state of an interned allophone.
#[derive(Clone, Debug)]
pub struct AllophoneState {
    allophone: Arc<Allophone>,
    index: AllophoneIndex,
    state: u8,
}

impl AllophoneState {
    pub(crate) fn new(allophone: Arc<Allophone>, index: AllophoneIndex, state: u8) -> AllophoneState {
        assert!(
            state as u32 <= MAX_STATE_ID,
            "sub-state {} exceeds the maximum of {}",
            state,
            MAX_STATE_ID
        );
        AllophoneState {
            allophone,
            index,
            state,
        }
    }

    #[inline(always)]
    pub fn allophone(&self) -> &Allophone {
        &self.allophone
    }

    #[inline(always)]
    pub fn allophone_index(&self) -> AllophoneIndex {
        self.index
    }

    #[inline(always)]
    pub fn state(&self) -> u8 {
        self.state
    }
}

impl PartialEq for AllophoneState {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.state == other.state
    }
}

impl Eq for AllophoneState {}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_flags_combine() {
        let b = Boundary::INITIAL | Boundary::FINAL;
        assert_eq!(b, Boundary::INITIAL_FINAL);
        assert!(b.is_initial() && b.is_final());
        assert!(!Boundary::WITHIN.is_initial());
        assert_eq!(b.suffix(), "@i@f");
    }

    #[test]
    fn missing_context_reads_as_term() {
        let a = Allophone::with_context(
            PhonemeId::new(2),
            vec![PhonemeId::new(3)],
            vec![],
            Boundary::WITHIN,
        );
        assert_eq!(a.history_at(0), PhonemeId::new(3));
        assert_eq!(a.history_at(1), PhonemeId::TERM);
        assert_eq!(a.future_at(0), PhonemeId::TERM);
    }
}
