//! Dotted chunk-id paths and their normalization into content paths

use serde::{Deserialize, Serialize};
use std::fmt;

/// A hierarchical chunk id such as `root0.items.2.c1`.
///
/// Segments are dotted together during chunker descent: `rootN` marks the N-th
/// top-level piece, plain segments are mapping keys or array indices, and `cK`
/// marks the K-th piece of a split leaf or container. Keys are not escaped, so
/// a mapping key that itself looks like a `cK` or `rootN` token (or parses as
/// an integer) collides with the token syntax; such fragments are dropped with
/// a warning at reassembly when they conflict with the materialized structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

/// One structural step of a content path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathSegment {
    /// Indexes an array
    Index(usize),
    /// Keys into a mapping
    Key(String),
}

impl PathSegment {
    /// Classifies a raw segment: non-negative integers index arrays.
    pub fn classify(seg: &str) -> Self {
        match seg.parse::<usize>() {
            Ok(i) => PathSegment::Index(i),
            Err(_) => PathSegment::Key(seg.to_string()),
        }
    }

    /// The raw string form of this segment.
    pub fn as_string(&self) -> String {
        match self {
            PathSegment::Index(i) => i.to_string(),
            PathSegment::Key(k) => k.clone(),
        }
    }
}

fn parse_root(seg: &str) -> Option<usize> {
    seg.strip_prefix("root")?.parse().ok()
}

fn parse_chunk(seg: &str) -> Option<usize> {
    seg.strip_prefix('c')?.parse().ok()
}

impl ChunkId {
    /// The id of the N-th top-level piece.
    pub fn root(n: usize) -> Self {
        Self(format!("root{n}"))
    }

    /// Parses an id from its wire form.
    pub fn parse(raw: &str) -> Self {
        Self(raw.to_string())
    }

    /// Appends a mapping key segment.
    pub fn key(&self, key: &str) -> Self {
        Self(format!("{}.{}", self.0, key))
    }

    /// Appends an array index segment.
    pub fn element(&self, idx: usize) -> Self {
        Self(format!("{}.{}", self.0, idx))
    }

    /// Appends the K-th chunk token.
    pub fn chunk(&self, k: usize) -> Self {
        Self(format!("{}.c{}", self.0, k))
    }

    /// The raw dotted form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalizes this id to its content path: `rootN` and `cK` tokens carry
    /// order, not structure, and are stripped; the remaining segments locate
    /// the fragment in the reconstructed value.
    pub fn content_path(&self) -> Vec<PathSegment> {
        self.0
            .split('.')
            .enumerate()
            .filter(|(i, seg)| !((*i == 0 && parse_root(seg).is_some()) || parse_chunk(seg).is_some()))
            .map(|(_, seg)| PathSegment::classify(seg))
            .collect()
    }

    /// The order of this piece among siblings sharing its content path: the
    /// index of the trailing `cK` token, or of a bare `rootN`, else 0.
    pub fn sibling_order(&self) -> usize {
        let last = self.0.rsplit('.').next().unwrap_or("");
        parse_chunk(last)
            .or_else(|| parse_root(last))
            .unwrap_or(0)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_pieces_have_empty_content_path() {
        assert!(ChunkId::root(0).content_path().is_empty());
        assert!(ChunkId::root(17).content_path().is_empty());
    }

    #[test]
    fn chunk_tokens_are_stripped() {
        let id = ChunkId::root(0).key("a").chunk(2);
        assert_eq!(id.as_str(), "root0.a.c2");
        assert_eq!(id.content_path(), vec![PathSegment::Key("a".into())]);
    }

    #[test]
    fn integer_segments_index_arrays() {
        let id = ChunkId::root(1).element(2).chunk(0);
        assert_eq!(
            id.content_path(),
            vec![PathSegment::Index(2)]
        );
    }

    #[test]
    fn sibling_order_from_trailing_token() {
        assert_eq!(ChunkId::root(3).sibling_order(), 3);
        assert_eq!(ChunkId::root(0).key("a").chunk(5).sibling_order(), 5);
        assert_eq!(ChunkId::root(0).key("a").sibling_order(), 0);
    }

    #[test]
    fn intermediate_chunk_tokens_collapse() {
        let id = ChunkId::parse("root0.c1.items.c3");
        assert_eq!(id.content_path(), vec![PathSegment::Key("items".into())]);
        assert_eq!(id.sibling_order(), 3);
    }

    #[test]
    fn root_token_only_recognized_in_first_position() {
        // a mapping key literally named "root1" below the top level stays a key
        let id = ChunkId::parse("root0.root1.c0");
        assert_eq!(id.content_path(), vec![PathSegment::Key("root1".into())]);
    }
}
