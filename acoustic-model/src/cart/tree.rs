use std::collections::BTreeMap;
use std::path::Path;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::{Answer, DecisionTreeError, Properties, PropertyMap, Question};

const NO_ORDER: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Leaf {
        id: u32,
    },
    /// `order` is the rank of the split during training, smaller splits earlier.
    Split {
        question: usize,
        order: u32,
        yes: usize,
        no: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStep {
    pub question: usize,
    pub answer: Answer,
}

/// A binary tree of questions; a true answer leads to the `yes` child.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    map: PropertyMap,
    questions: Vec<Question>,
    nodes: Vec<Node>,
    root: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct TreeDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    properties: Option<Vec<PropertyDocument>>,
    questions: Vec<QuestionDocument>,
    tree: NodeDocument,
}

#[derive(Debug, Serialize, Deserialize)]
struct PropertyDocument {
    key: String,
    values: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct QuestionDocument {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum NodeDocument {
    Split {
        question: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order: Option<u32>,
        yes: Box<NodeDocument>,
        no: Box<NodeDocument>,
    },
    Leaf {
        id: u32,
    },
}

impl DecisionTree {
    /// Loads a JSON tree. Without a `properties` section in the document,
    /// `default_map` defines the keys and values questions refer to.
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        default_map: &PropertyMap,
    ) -> Result<DecisionTree, DecisionTreeError> {
        log::info!("load decision tree from {}", path.as_ref().display());
        let bytes = std::fs::read(path)?;
        DecisionTree::from_slice(&bytes, default_map)
    }

    pub fn from_slice(bytes: &[u8], default_map: &PropertyMap) -> Result<DecisionTree, DecisionTreeError> {
        let document: TreeDocument = serde_json::from_slice(bytes)?;

        let map = match document.properties {
            Some(properties) => {
                let mut map = PropertyMap::new();
                for p in properties.iter() {
                    map.add_key(&p.key, p.values.iter().map(|v| v.as_str()));
                }
                map
            }
            None => default_map.clone(),
        };

        let mut questions = Vec::with_capacity(document.questions.len());
        for (i, q) in document.questions.into_iter().enumerate() {
            let key = map
                .key(&q.key)
                .ok_or_else(|| DecisionTreeError::UnknownKey(q.key.clone()))?;
            let lookup = |v: &str| {
                map.value(key, v).ok_or_else(|| DecisionTreeError::UnknownValue {
                    key: q.key.clone(),
                    value: v.to_string(),
                })
            };
            let question = match (&q.value, &q.values) {
                (Some(v), None) => Question::Scalar {
                    key,
                    value: lookup(v.as_str())?,
                    description: q.description.clone(),
                },
                (None, Some(vs)) => {
                    let mut values = vs.iter().map(|v| lookup(v.as_str())).collect::<Result<Vec<_>, _>>()?;
                    values.sort_unstable();
                    values.dedup();
                    Question::Set {
                        key,
                        values,
                        description: q.description.clone(),
                    }
                }
                _ => return Err(DecisionTreeError::BadQuestion(i)),
            };
            questions.push(question);
        }

        let mut nodes = Vec::new();
        let root = add_node(&mut nodes, &document.tree, questions.len())?;
        let tree = DecisionTree {
            map,
            questions,
            nodes,
            root,
        };
        log::debug!("decision tree with {} leaves", tree.n_leaves());
        Ok(tree)
    }

    pub fn to_json(&self) -> Result<String, DecisionTreeError> {
        let properties = (0..self.map.len())
            .map(|k| PropertyDocument {
                key: self.map.key_name(k).to_string(),
                values: self.map.values(k).map(|v| v.to_string()).collect(),
            })
            .collect();
        let questions = self
            .questions
            .iter()
            .map(|q| match q {
                Question::Scalar {
                    key,
                    value,
                    description,
                } => QuestionDocument {
                    key: self.map.key_name(*key).to_string(),
                    value: Some(self.map.value_name(*key, *value).to_string()),
                    values: None,
                    description: description.clone(),
                },
                Question::Set {
                    key,
                    values,
                    description,
                } => QuestionDocument {
                    key: self.map.key_name(*key).to_string(),
                    value: None,
                    values: Some(
                        values
                            .iter()
                            .map(|&v| self.map.value_name(*key, v).to_string())
                            .collect(),
                    ),
                    description: description.clone(),
                },
            })
            .collect();
        let document = TreeDocument {
            properties: Some(properties),
            questions,
            tree: self.node_document(self.root),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    fn node_document(&self, n: usize) -> NodeDocument {
        match self.nodes[n] {
            Node::Leaf { id } => NodeDocument::Leaf { id },
            Node::Split {
                question,
                order,
                yes,
                no,
            } => NodeDocument::Split {
                question,
                order: if order == NO_ORDER { None } else { Some(order) },
                yes: Box::new(self.node_document(yes)),
                no: Box::new(self.node_document(no)),
            },
        }
    }

    #[inline(always)]
    pub fn map(&self) -> &PropertyMap {
        &self.map
    }

    #[inline(always)]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[inline(always)]
    pub fn root(&self) -> &Node {
        &self.nodes[self.root]
    }

    fn next(&self, question: usize, yes: usize, no: usize, properties: &Properties) -> (Answer, usize) {
        let q = &self.questions[question];
        match q.answer(properties) {
            Answer::True => (Answer::True, yes),
            Answer::False => (Answer::False, no),
            Answer::Undef => {
                log::warn!("undefined answer to \"{}\", assume false", q.describe(&self.map));
                (Answer::Undef, no)
            }
        }
    }

    /// Leaf id reached by `properties`.
    pub fn find(&self, properties: &Properties) -> u32 {
        let mut n = self.root;
        loop {
            match self.nodes[n] {
                Node::Leaf { id } => return id,
                Node::Split {
                    question, yes, no, ..
                } => n = self.next(question, yes, no, properties).1,
            }
        }
    }

    /// Leaf ids reachable by `properties`, following both children on undefined answers.
    pub fn find_all(&self, properties: &Properties) -> Vec<u32> {
        let mut leaves = Vec::new();
        let mut stack = vec![self.root];
        while let Some(n) = stack.pop() {
            match self.nodes[n] {
                Node::Leaf { id } => leaves.push(id),
                Node::Split {
                    question, yes, no, ..
                } => match self.questions[question].answer(properties) {
                    Answer::True => stack.push(yes),
                    Answer::False => stack.push(no),
                    Answer::Undef => {
                        stack.push(yes);
                        stack.push(no);
                    }
                },
            }
        }
        leaves
    }

    /// Questions asked on the way to the leaf, with the leaf id.
    pub fn find_path(&self, properties: &Properties) -> (Vec<PathStep>, u32) {
        let mut path = Vec::new();
        let mut n = self.root;
        loop {
            match self.nodes[n] {
                Node::Leaf { id } => return (path, id),
                Node::Split {
                    question, yes, no, ..
                } => {
                    let (answer, next) = self.next(question, yes, no, properties);
                    path.push(PathStep { question, answer });
                    n = next;
                }
            }
        }
    }

    fn subtree_leaves(&self, n: usize) -> Vec<u32> {
        let mut leaves = Vec::new();
        let mut stack = vec![n];
        while let Some(n) = stack.pop() {
            match self.nodes[n] {
                Node::Leaf { id } => leaves.push(id),
                Node::Split { yes, no, .. } => {
                    stack.push(yes);
                    stack.push(no);
                }
            }
        }
        leaves.sort_unstable();
        leaves
    }

    /// Ids of the leaves reachable from the root, ascending.
    pub fn leaf_ids(&self) -> Vec<u32> {
        self.subtree_leaves(self.root)
    }

    pub fn n_leaves(&self) -> usize {
        self.leaf_ids().len()
    }

    /// Drops a leading `central == <silence>` question whose true branch is a
    /// leaf, so that silence can be handled outside the tree.
    pub fn remove_silence_branch(&mut self, silence: &str) -> bool {
        let central = match self.map.key("central") {
            Some(k) => k,
            None => return false,
        };
        let silence = match self.map.value(central, silence) {
            Some(v) => v,
            None => return false,
        };
        if let Node::Split {
            question, yes, no, ..
        } = self.nodes[self.root]
        {
            if let Question::Scalar { key, value, .. } = self.questions[question] {
                if key == central && value == silence {
                    if let Node::Leaf { id } = self.nodes[yes] {
                        log::debug!("remove silence leaf {} from decision tree", id);
                        self.root = no;
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Collapses every split of order `max_leaves - 1` or later into a leaf
    /// and renumbers the remaining leaves densely from 0.
    ///
    /// Returns the new id of every leaf id the tree had before. Splits
    /// without order information are always collapsed.
    pub fn prune(&mut self, max_leaves: usize) -> BTreeMap<u32, u32> {
        let cutoff = max_leaves.saturating_sub(1).min(NO_ORDER as usize) as u32;
        let mut representative = BTreeMap::new();
        let mut stack = vec![self.root];
        while let Some(n) = stack.pop() {
            match self.nodes[n] {
                Node::Leaf { id } => {
                    representative.insert(id, id);
                }
                Node::Split { order, .. } if order >= cutoff => {
                    let leaves = self.subtree_leaves(n);
                    let id = leaves[0];
                    for leaf in leaves {
                        representative.insert(leaf, id);
                    }
                    self.nodes[n] = Node::Leaf { id };
                }
                Node::Split { yes, no, .. } => {
                    stack.push(yes);
                    stack.push(no);
                }
            }
        }

        let renumber: HashMap<u32, u32> = self
            .leaf_ids()
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i as u32))
            .collect();
        let mut stack = vec![self.root];
        while let Some(n) = stack.pop() {
            match &mut self.nodes[n] {
                Node::Leaf { id } => *id = renumber[&*id],
                Node::Split { yes, no, .. } => {
                    stack.push(*yes);
                    stack.push(*no);
                }
            }
        }
        log::info!("pruned decision tree to {} leaves", renumber.len());

        representative
            .into_iter()
            .map(|(old, rep)| (old, renumber[&rep]))
            .collect()
    }
}

fn add_node(
    nodes: &mut Vec<Node>,
    document: &NodeDocument,
    n_questions: usize,
) -> Result<usize, DecisionTreeError> {
    let node = match document {
        NodeDocument::Leaf { id } => Node::Leaf { id: *id },
        NodeDocument::Split {
            question,
            order,
            yes,
            no,
        } => {
            if *question >= n_questions {
                return Err(DecisionTreeError::QuestionIndex(*question));
            }
            let yes = add_node(nodes, yes, n_questions)?;
            let no = add_node(nodes, no, n_questions)?;
            Node::Split {
                question: *question,
                order: order.unwrap_or(NO_ORDER),
                yes,
                no,
            }
        }
    };
    nodes.push(node);
    Ok(nodes.len() - 1)
}
