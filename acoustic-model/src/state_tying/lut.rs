use std::io::{BufRead, BufReader};
use std::path::Path;

use hashbrown::HashMap;

use crate::allophone::{AllophoneState, AllophoneStateAlphabet};
use crate::dependency::DependencySet;
use crate::error::{Error, Result};
use crate::model::ClassicStateModel;
use crate::types::{AllophoneStateIndex, EmissionIndex};

/// Explicit table from allophone-state symbols to classes.
///
/// Every line holds a symbol such as `a{b+#}@f.2` and a class number;
/// `#` starts a comment line. Allophones named in the table are interned.
#[derive(Debug)]
pub struct LookupTable {
    classes: HashMap<AllophoneStateIndex, EmissionIndex>,
    n_classes: u32,
    dependencies: DependencySet,
}

impl LookupTable {
    pub fn from_path<P: AsRef<Path>>(path: P, model: &ClassicStateModel) -> Result<LookupTable> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let states = model.allophone_state_alphabet();
        let reader = BufReader::new(std::fs::File::open(path)?);

        let mut classes = HashMap::new();
        let mut n_classes = 0;
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let bad = |message: String| Error::LookupTable {
                path: display.clone(),
                line: n + 1,
                message,
            };
            let mut fields = line.split_whitespace();
            let (symbol, class) = match (fields.next(), fields.next(), fields.next()) {
                (Some(s), Some(c), None) => (s, c),
                _ => return Err(bad(format!("expected `<allophone-state> <class>`, got `{}`", line))),
            };
            let class: u32 = class
                .parse()
                .map_err(|_| bad(format!("invalid class `{}`", class)))?;
            let (allophone, state) = states.parse(symbol).map_err(|e| bad(e.to_string()))?;
            let id = states.index_or_insert(&allophone, state)?;
            if classes.insert(id, EmissionIndex::new(class)).is_some() {
                log::warn!("{}:{}: duplicate entry for {}", display, n + 1, symbol);
            }
            n_classes = n_classes.max(class + 1);
        }

        let mut dependencies = DependencySet::new();
        dependencies.add_file("file", path)?;
        log::info!("{} entries with {} classes read from {}", classes.len(), n_classes, display);
        Ok(LookupTable {
            classes,
            n_classes,
            dependencies,
        })
    }

    #[inline(always)]
    pub fn n_classes(&self) -> u32 {
        self.n_classes
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub(crate) fn dependencies(&self) -> &DependencySet {
        &self.dependencies
    }

    /// Class of `state`, or [`EmissionIndex::INVALID`] if the table lacks it.
    pub(crate) fn classify(&self, model: &ClassicStateModel, state: &AllophoneState) -> EmissionIndex {
        let id = AllophoneStateAlphabet::pack(state.allophone_index(), state.state());
        match self.classes.get(&id) {
            Some(&e) => e,
            None => {
                log::error!(
                    "allophone state {} is not in the lookup table",
                    model.allophone_state_alphabet().format(state)
                );
                EmissionIndex::INVALID
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::model;
    use crate::state_tying::{ClassicStateTying, StateTying};
    use std::io::Write;
    use std::sync::Arc;

    #[test]
    fn misses_yield_the_invalid_class() {
        let model = model(&[]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# allophone-state class").unwrap();
        writeln!(file, "sil{{#+#}}@i@f.0 0").unwrap();
        writeln!(file, "a{{#+#}}.1 4").unwrap();
        file.flush().unwrap();

        let lut = LookupTable::from_path(file.path(), &model).unwrap();
        assert_eq!(lut.len(), 2);
        assert_eq!(lut.n_classes(), 5);
        let tying = ClassicStateTying::new(Arc::clone(&model), StateTying::Lut(lut));

        let states = model.allophone_state_alphabet();
        let alphabet = states.allophone_alphabet();
        let a = alphabet.parse("a{#+#}").unwrap();
        let a1 = states.allophone_state(states.index_of(&a, 1).unwrap());
        assert_eq!(tying.classify(&a1), EmissionIndex::new(4));
        let a2 = states.allophone_state(states.index_of(&a, 2).unwrap());
        assert_eq!(tying.classify(&a2), EmissionIndex::INVALID);
        assert!(tying.dependencies().get("lookup-table").is_some());
    }

    #[test]
    fn malformed_lines_report_their_position() {
        let model = model(&[]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a{{#+#}}.1 4").unwrap();
        writeln!(file, "a{{#+#}}.1").unwrap();
        file.flush().unwrap();
        match LookupTable::from_path(file.path(), &model) {
            Err(Error::LookupTable { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected lookup table error, got {:?}", other.map(|l| l.len())),
        }
    }
}
