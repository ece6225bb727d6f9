//! Binary decision trees over discrete properties.

mod tree;

use hashbrown::HashMap;
use smol_str::SmolStr;
use thiserror::Error;

pub use self::tree::{DecisionTree, Node, PathStep};

pub type ValueIndex = u32;

#[derive(Debug, Error)]
pub enum DecisionTreeError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed decision tree: {0}")]
    Json(#[from] serde_json::Error),
    #[error("property `{0}` is not defined")]
    UnknownKey(String),
    #[error("value `{value}` is not defined for property `{key}`")]
    UnknownValue { key: String, value: String },
    #[error("question {0} must have either a value or a list of values")]
    BadQuestion(usize),
    #[error("node refers to undefined question {0}")]
    QuestionIndex(usize),
}

#[derive(Debug, Clone, Default)]
struct ValueMap {
    names: Vec<SmolStr>,
    index: HashMap<SmolStr, ValueIndex>,
}

impl ValueMap {
    fn add(&mut self, name: &str) -> ValueIndex {
        if let Some(&v) = self.index.get(name) {
            return v;
        }
        let v = self.names.len() as ValueIndex;
        self.names.push(name.into());
        self.index.insert(name.into(), v);
        v
    }
}

/// Names of the property keys and, per key, the names of its values.
#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    keys: Vec<SmolStr>,
    key_index: HashMap<SmolStr, usize>,
    values: Vec<ValueMap>,
}

impl PropertyMap {
    pub fn new() -> PropertyMap {
        PropertyMap::default()
    }

    /// Adds a key with its values in index order and returns the key index.
    pub fn add_key<'a, I>(&mut self, key: &str, values: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let k = match self.key_index.get(key) {
            Some(&k) => k,
            None => {
                self.keys.push(key.into());
                self.values.push(ValueMap::default());
                self.key_index.insert(key.into(), self.keys.len() - 1);
                self.keys.len() - 1
            }
        };
        for v in values {
            self.values[k].add(v);
        }
        k
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[inline(always)]
    pub fn key(&self, name: &str) -> Option<usize> {
        self.key_index.get(name).copied()
    }

    #[inline(always)]
    pub fn key_name(&self, key: usize) -> &str {
        &self.keys[key]
    }

    #[inline(always)]
    pub fn value(&self, key: usize, name: &str) -> Option<ValueIndex> {
        self.values.get(key)?.index.get(name).copied()
    }

    pub fn value_name(&self, key: usize, value: ValueIndex) -> &str {
        self.values[key]
            .names
            .get(value as usize)
            .map(|s| s.as_str())
            .unwrap_or("?")
    }

    pub fn values(&self, key: usize) -> impl Iterator<Item = &str> {
        self.values[key].names.iter().map(|s| s.as_str())
    }
}

/// Property values of one instance, by key index. `None` marks a value the
/// instance cannot provide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Properties(pub Vec<Option<ValueIndex>>);

impl Properties {
    #[inline(always)]
    pub fn get(&self, key: usize) -> Option<ValueIndex> {
        self.0.get(key).copied().flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    True,
    False,
    Undef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Question {
    Scalar {
        key: usize,
        value: ValueIndex,
        description: Option<String>,
    },
    /// Values are kept sorted.
    Set {
        key: usize,
        values: Vec<ValueIndex>,
        description: Option<String>,
    },
}

impl Question {
    pub fn scalar(key: usize, value: ValueIndex) -> Question {
        Question::Scalar {
            key,
            value,
            description: None,
        }
    }

    pub fn set(key: usize, mut values: Vec<ValueIndex>) -> Question {
        values.sort_unstable();
        values.dedup();
        Question::Set {
            key,
            values,
            description: None,
        }
    }

    #[inline(always)]
    pub fn key(&self) -> usize {
        match self {
            Question::Scalar { key, .. } | Question::Set { key, .. } => *key,
        }
    }

    pub fn answer(&self, properties: &Properties) -> Answer {
        let value = match properties.get(self.key()) {
            Some(v) => v,
            None => return Answer::Undef,
        };
        let yes = match self {
            Question::Scalar { value: v, .. } => value == *v,
            Question::Set { values, .. } => values.binary_search(&value).is_ok(),
        };
        if yes {
            Answer::True
        } else {
            Answer::False
        }
    }

    pub fn describe(&self, map: &PropertyMap) -> String {
        let (description, text) = match self {
            Question::Scalar {
                key,
                value,
                description,
            } => (
                description,
                format!(
                    "Does the value of \"{}\" equal \"{}\"?",
                    map.key_name(*key),
                    map.value_name(*key, *value)
                ),
            ),
            Question::Set {
                key,
                values,
                description,
            } => {
                let names: Vec<&str> = values.iter().map(|&v| map.value_name(*key, v)).collect();
                (
                    description,
                    format!(
                        "Is the value of \"{}\" in {{{}}}?",
                        map.key_name(*key),
                        names.join(" ")
                    ),
                )
            }
        };
        match description {
            Some(d) => format!("[{}] {}", d, text),
            None => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> PropertyMap {
        let mut map = PropertyMap::new();
        map.add_key("hmm-state", ["0", "1", "2"]);
        map.add_key("central", ["#", "sil", "a", "b"]);
        map
    }

    #[test]
    fn set_questions_use_sorted_values() {
        let map = map();
        let central = map.key("central").unwrap();
        let q = Question::set(central, vec![3, 2, 3]);
        assert_eq!(
            q,
            Question::Set {
                key: central,
                values: vec![2, 3],
                description: None
            }
        );
        assert_eq!(q.answer(&Properties(vec![Some(0), Some(3)])), Answer::True);
        assert_eq!(q.answer(&Properties(vec![Some(0), Some(1)])), Answer::False);
        assert_eq!(q.answer(&Properties(vec![Some(0)])), Answer::Undef);
        assert_eq!(q.describe(&map), "Is the value of \"central\" in {a b}?");
    }

    #[test]
    fn scalar_question_text() {
        let map = map();
        let q = Question::scalar(0, 1);
        assert_eq!(q.describe(&map), "Does the value of \"hmm-state\" equal \"1\"?");
        assert_eq!(q.answer(&Properties(vec![Some(1)])), Answer::True);
    }
}
