//! Dependency sets record the parameters and files a model was built from,
//! so that mismatched models can be detected across runs.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::time::UNIX_EPOCH;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dependency {
    Value {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
    Set(DependencySet),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencySet {
    entries: BTreeMap<String, Dependency>,
}

impl DependencySet {
    pub fn new() -> DependencySet {
        DependencySet::default()
    }

    pub fn add_value<S: Into<String>>(&mut self, name: &str, value: S) {
        self.entries.insert(
            name.to_string(),
            Dependency::Value {
                value: value.into(),
                timestamp: None,
            },
        );
    }

    /// Records the MD5 digest of a file together with its modification time.
    pub fn add_file<P: AsRef<Path>>(&mut self, name: &str, path: P) -> std::io::Result<()> {
        let path = path.as_ref();
        let value = md5_file(path)?;
        let timestamp = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs());
        self.entries
            .insert(name.to_string(), Dependency::Value { value, timestamp });
        Ok(())
    }

    pub fn add_set(&mut self, name: &str, set: DependencySet) {
        self.entries.insert(name.to_string(), Dependency::Set(set));
    }

    pub fn get(&self, name: &str) -> Option<&Dependency> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Dependency)> {
        self.entries.iter()
    }

    /// True if both sets name the same dependencies with equal values.
    /// Timestamps are informative only and are not compared.
    pub fn satisfies(&self, other: &DependencySet) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        self.entries.iter().all(|(name, dep)| {
            match (dep, other.entries.get(name)) {
                (Dependency::Value { value: a, .. }, Some(Dependency::Value { value: b, .. })) => {
                    a == b
                }
                (Dependency::Set(a), Some(Dependency::Set(b))) => a.satisfies(b),
                _ => false,
            }
        })
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for (name, dep) in self.entries.iter() {
            match dep {
                Dependency::Value { value, .. } => {
                    writeln!(f, "{:indent$}{}: {}", "", name, value, indent = depth * 2)?
                }
                Dependency::Set(set) => {
                    writeln!(f, "{:indent$}{}:", "", name, indent = depth * 2)?;
                    set.write_indented(f, depth + 1)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for DependencySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

pub fn md5_bytes(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn md5_file<P: AsRef<Path>>(path: P) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buffer = [0u8; 8192];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn md5_of_known_input() {
        assert_eq!(md5_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_bytes(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn file_digest_matches_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        let mut set = DependencySet::new();
        set.add_file("tree", file.path()).unwrap();
        match set.get("tree") {
            Some(Dependency::Value { value, timestamp }) => {
                assert_eq!(value, "900150983cd24fb0d6963f7d28e17f72");
                assert!(timestamp.is_some());
            }
            other => panic!("unexpected dependency {:?}", other),
        }
    }

    #[test]
    fn satisfies_ignores_timestamps() {
        let mut a = DependencySet::new();
        a.add_value("history-length", "1");
        let mut inner = DependencySet::new();
        inner.add_value("loop", "3.0");
        a.add_set("tdp", inner.clone());

        let mut b = a.clone();
        b.entries.insert(
            "history-length".into(),
            Dependency::Value {
                value: "1".into(),
                timestamp: Some(42),
            },
        );
        assert!(a.satisfies(&b));

        inner.add_value("skip", "3.0");
        b.add_set("tdp", inner);
        assert!(!a.satisfies(&b));
    }
}
