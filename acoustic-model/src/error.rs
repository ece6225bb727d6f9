use smol_str::SmolStr;
use thiserror::Error;

use crate::allophone::AlphabetError;
use crate::cart::DecisionTreeError;
use crate::lexicon::LexiconError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Lexicon(#[from] LexiconError),
    #[error(transparent)]
    Alphabet(#[from] AlphabetError),
    #[error(transparent)]
    DecisionTree(#[from] DecisionTreeError),
    #[error("lookup table {path}, line {line}: {message}")]
    LookupTable {
        path: String,
        line: usize,
        message: String,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("state tying `{0}` is not supported")]
    UnsupportedStateTying(SmolStr),
    #[error("state tying `{kind}` requires a file")]
    MissingFile { kind: SmolStr },
    #[error("transition model: {0}")]
    TransitionModel(String),
    #[error("transducer builder: {0}")]
    Builder(String),
}

pub type Result<T> = std::result::Result<T, Error>;
