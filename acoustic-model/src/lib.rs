/*! Acoustic modelling for HMM based speech recognition.

Numbers allophones (phonemes in their phonetic context) and their HMM
states, ties allophone states to emission classes, scores state transitions
and compiles all of it into weighted finite-state transducers that a
decoder composes with its lexicon and language model.

# Usage examples

```no_run
use acoustic_model::{AcousticModel, AcousticModelConfig, Lexicon, TransducerBuilder};

let config = AcousticModelConfig::from_path("am.json")?;
let lexicon = Lexicon::from_path("lexicon.xml")?;
let am = AcousticModel::build(&config, lexicon)?;

let mut builder = TransducerBuilder::new(&am);
builder.set_disambiguators(1).select_allophone_states_as_input();
let phone_loop = builder.create_phoneme_loop_transducer()?;
println!("{} states", phone_loop.n_states());
# Ok::<(), Box<dyn std::error::Error>>(())
```

The `am-tools` binary in the same repository drives most of these
operations from the command line.
*/

pub mod acoustic;
pub mod allophone;
pub mod builder;
pub mod cart;
pub mod config;
pub mod dependency;
pub mod error;
pub mod fsa;
pub mod hmm;
pub mod lexicon;
pub mod model;
pub mod phonology;
pub mod state_tying;
pub mod transition;
pub mod types;

pub use crate::acoustic::{AcousticModel, FeatureScorer};
pub use crate::builder::TransducerBuilder;
pub use crate::config::AcousticModelConfig;
pub use crate::error::{Error, Result};
pub use crate::fsa::StaticAutomaton;
pub use crate::lexicon::Lexicon;

/// Routes the `log` output of this crate to stderr, filtered by `RUST_LOG`.
#[cfg(feature = "logging")]
pub fn enable_logging() {
    let _ = env_logger::try_init();
}
