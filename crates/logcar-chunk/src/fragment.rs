//! Fragment model: the atomic storage unit and the tree the chunker produces

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::path::ChunkId;

/// Which record operation a fragment belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Initial write of a record
    Create,
    /// Retrieval audit marker
    Read,
    /// Replacement write for an existing record
    Update,
    /// Tombstone marking terminal state
    Delete,
}

impl Operation {
    /// The lowercase wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "read" => Ok(Operation::Read),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(format!("unknown operation {other:?}")),
        }
    }
}

/// Structural kind of a fragment's data, carried explicitly on the wire so
/// the read path does not have to reverse-engineer it from the chunk id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructKind {
    /// A slice of array elements; siblings concatenate
    Array,
    /// A sub-mapping; siblings shallow-merge
    Mapping,
    /// A leaf value; string siblings concatenate
    Leaf,
    /// The string form of an oversized non-string scalar; siblings
    /// concatenate and the result is parsed back into the scalar
    Scalar,
}

/// A leaf fragment before emission: position, kind and payload
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Structural position in the original value
    pub chunk_id: ChunkId,
    /// How this fragment's data recombines with its siblings
    pub kind: StructKind,
    /// The fragment payload
    pub data: Value,
}

/// The tree a single chunking pass produces: leaves carry data, nested nodes
/// mark the recursive sub-chunking of an oversized element or entry.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentTree {
    /// A data-bearing fragment
    Leaf(Fragment),
    /// A recursive sub-chunking attached below `chunk_id`
    Nested {
        /// Structural path the children live under
        chunk_id: ChunkId,
        /// The sub-chunking, in emission order
        children: Vec<FragmentTree>,
    },
}

impl FragmentTree {
    /// Number of leaf fragments in this subtree.
    pub fn leaf_count(&self) -> usize {
        match self {
            FragmentTree::Leaf(_) => 1,
            FragmentTree::Nested { children, .. } => children.iter().map(|c| c.leaf_count()).sum(),
        }
    }
}

/// A fragment with its global ordinal assigned, ready for emission
#[derive(Debug, Clone, PartialEq)]
pub struct SealedFragment {
    /// The fragment itself
    pub fragment: Fragment,
    /// Global ordinal among the fragments of this write group
    pub index: usize,
    /// Number of fragments in this write group
    pub total: usize,
}

/// The set of fragments emitted for one create/update/read/delete of one rid.
///
/// Fragments are ordered by a preorder traversal of the fragment trees, so
/// `index` increases monotonically left-to-right, depth-first.
#[derive(Debug, Clone)]
pub struct WriteGroup {
    /// Record identifier
    pub rid: Uuid,
    /// Operation this group was emitted for
    pub op: Operation,
    /// Leaf fragments in emission order; empty for marker groups
    pub fragments: Vec<SealedFragment>,
}

impl WriteGroup {
    /// Flattens fragment trees in preorder and assigns `index`/`total`.
    pub fn from_trees(rid: Uuid, op: Operation, trees: Vec<FragmentTree>) -> Self {
        let mut leaves = Vec::new();
        for tree in trees {
            collect_leaves(tree, &mut leaves);
        }
        let total = leaves.len();
        let fragments = leaves
            .into_iter()
            .enumerate()
            .map(|(index, fragment)| SealedFragment {
                fragment,
                index,
                total,
            })
            .collect();
        Self { rid, op, fragments }
    }

    /// A single data-less marker group: the `delete` tombstone or the
    /// `read` audit line.
    pub fn marker(rid: Uuid, op: Operation) -> Self {
        Self {
            rid,
            op,
            fragments: vec![SealedFragment {
                fragment: Fragment {
                    chunk_id: ChunkId::root(0),
                    kind: StructKind::Leaf,
                    data: Value::Null,
                },
                index: 0,
                total: 1,
            }],
        }
    }

    /// Number of fragments in the group.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// True when the group carries no fragments.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

fn collect_leaves(tree: FragmentTree, out: &mut Vec<Fragment>) {
    match tree {
        FragmentTree::Leaf(frag) => out.push(frag),
        FragmentTree::Nested { children, .. } => {
            for child in children {
                collect_leaves(child, out);
            }
        }
    }
}

/// A fragment recovered from the log-search backend, input to reassembly
#[derive(Debug, Clone)]
pub struct ReceivedFragment {
    /// Structural position in the original value
    pub chunk_id: ChunkId,
    /// Structural kind, when the emitter recorded one
    pub kind: Option<StructKind>,
    /// Global ordinal within the write group
    pub index: usize,
    /// Declared size of the write group
    pub total: usize,
    /// The fragment payload
    pub data: Value,
}
