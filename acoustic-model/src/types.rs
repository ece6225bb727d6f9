use std::{
    fmt::Display,
    ops::{Add, AddAssign},
};

use serde::{Deserialize, Serialize};

/// Flag bit marking a disambiguator pseudo-symbol in every label space.
pub const DISAMBIGUATOR_FLAG: u32 = 0x4000_0000;
pub const DISAMBIGUATOR_MASK: u32 = 0x3fff_ffff;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
#[serde(transparent)]
pub struct PhonemeId(pub(crate) u16);

impl PhonemeId {
    /// Padding value for context positions that carry no phoneme.
    pub const TERM: Self = PhonemeId(0);
    pub(crate) const FIRST: Self = PhonemeId(1);

    #[inline(always)]
    pub const fn new(value: u16) -> Self {
        PhonemeId(value)
    }

    #[inline(always)]
    pub fn value(&self) -> u16 {
        self.0
    }

    #[inline(always)]
    pub fn is_term(&self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub(crate) fn incr(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for PhonemeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
#[serde(transparent)]
pub struct AllophoneIndex(pub(crate) u32);

impl AllophoneIndex {
    #[inline(always)]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl Display for AllophoneIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Packed allophone id and HMM sub-state, see [`crate::allophone::AllophoneStateAlphabet`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
#[serde(transparent)]
pub struct AllophoneStateIndex(pub(crate) u32);

impl AllophoneStateIndex {
    #[inline(always)]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl Display for AllophoneStateIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Emission (mixture) class produced by state tying.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
#[serde(transparent)]
pub struct EmissionIndex(pub(crate) u32);

impl EmissionIndex {
    pub const INVALID: Self = EmissionIndex(u32::MAX);

    #[inline(always)]
    pub const fn new(value: u32) -> Self {
        EmissionIndex(value)
    }

    #[inline(always)]
    pub fn value(&self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl Display for EmissionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arc label of a [`crate::fsa::StaticAutomaton`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Label(pub(crate) u32);

impl Label {
    pub const EPSILON: Self = Label(u32::MAX);
    pub const INVALID: Self = Label(u32::MAX - 1);
    pub(crate) const LAST: Self = Label(0x7fff_ffff);

    #[inline(always)]
    pub const fn new(value: u32) -> Self {
        Label(value)
    }

    #[inline(always)]
    pub fn value(&self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub fn disambiguator(d: u32) -> Self {
        Label(d | DISAMBIGUATOR_FLAG)
    }

    #[inline(always)]
    pub fn is_epsilon(&self) -> bool {
        *self == Self::EPSILON
    }

    #[inline(always)]
    pub fn is_disambiguator(&self) -> bool {
        self.0 <= Self::LAST.0 && (self.0 & DISAMBIGUATOR_FLAG) != 0
    }

    #[inline(always)]
    pub fn disambiguator_number(&self) -> Option<u32> {
        if self.is_disambiguator() {
            Some(self.0 & DISAMBIGUATOR_MASK)
        } else {
            None
        }
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Label::EPSILON => write!(f, "*EPS*"),
            Label::INVALID => write!(f, "*INVALID*"),
            l => write!(f, "{}", l.0),
        }
    }
}

impl From<PhonemeId> for Label {
    fn from(p: PhonemeId) -> Self {
        Label(p.0 as u32)
    }
}

impl From<AllophoneIndex> for Label {
    fn from(a: AllophoneIndex) -> Self {
        Label(a.0)
    }
}

impl From<AllophoneStateIndex> for Label {
    fn from(a: AllophoneStateIndex) -> Self {
        Label(a.0)
    }
}

impl From<EmissionIndex> for Label {
    fn from(e: EmissionIndex) -> Self {
        Label(e.0)
    }
}

/// Tropical weight: `+` extends a path, smaller is better.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, PartialOrd)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Weight(pub f32);

impl Weight {
    pub const ONE: Self = Weight(0.0);
    pub const MAX: Self = Weight(f32::MAX);
    pub const INFINITE: Self = Weight(f32::INFINITY);

    /// Whether this weight blocks a transition.
    #[inline(always)]
    pub fn is_max(&self) -> bool {
        self.0 >= f32::MAX
    }
}

impl Display for Weight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Weight {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Weight(self.0 + rhs.0)
    }
}

impl AddAssign for Weight {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}
