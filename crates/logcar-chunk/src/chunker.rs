//! Greedy chunking of JSON values into bounded fragment trees

use serde_json::{Map, Value};

use crate::fragment::{Fragment, FragmentTree, StructKind};
use crate::path::ChunkId;
use crate::size::virtual_len;

/// Default per-fragment maximum virtual length
pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 60_000;

/// Splits a value into fragment trees whose leaves each stay within
/// `max_len` virtual length.
///
/// Strings are sliced on character boundaries; arrays and mappings are packed
/// greedily into buckets; an element or entry that alone exceeds `max_len` is
/// extracted into a nested sub-chunking at its structural position. An
/// extracted array element leaves a zero-length placeholder string in the
/// surrounding bucket so sibling concatenation preserves its slot.
pub fn chunk_value(value: &Value, max_len: usize) -> Vec<FragmentTree> {
    let mut ids = PieceIds::top();
    chunk_level(value, max_len.max(1), &mut ids)
}

/// Names the pieces of one chunking level: `rootN` at the top, `base.cK`
/// below. An extraction at the top level consumes a root slot so sibling
/// order stays monotonic across the whole group.
struct PieceIds {
    base: Option<ChunkId>,
    next: usize,
}

impl PieceIds {
    fn top() -> Self {
        Self { base: None, next: 0 }
    }

    fn nested(base: ChunkId) -> Self {
        Self {
            base: Some(base),
            next: 0,
        }
    }

    fn next_piece(&mut self) -> ChunkId {
        let id = match &self.base {
            None => ChunkId::root(self.next),
            Some(base) => base.chunk(self.next),
        };
        self.next += 1;
        id
    }

    fn extraction_base(&mut self) -> ChunkId {
        match &self.base {
            None => {
                let id = ChunkId::root(self.next);
                self.next += 1;
                id
            }
            Some(base) => base.clone(),
        }
    }
}

fn chunk_level(value: &Value, max_len: usize, ids: &mut PieceIds) -> Vec<FragmentTree> {
    match value {
        Value::String(s) => split_string(s, StructKind::Leaf, max_len, ids),
        Value::Array(items) => chunk_array(items, max_len, ids),
        Value::Object(map) => chunk_object(map, max_len, ids),
        scalar => {
            let form = scalar.to_string();
            if form.chars().count() <= max_len {
                vec![leaf(ids.next_piece(), StructKind::Leaf, scalar.clone())]
            } else {
                split_string(&form, StructKind::Scalar, max_len, ids)
            }
        }
    }
}

fn split_string(s: &str, kind: StructKind, max_len: usize, ids: &mut PieceIds) -> Vec<FragmentTree> {
    let chars: Vec<char> = s.chars().collect();
    if chars.is_empty() {
        return vec![leaf(ids.next_piece(), kind, Value::String(String::new()))];
    }
    chars
        .chunks(max_len)
        .map(|piece| {
            leaf(
                ids.next_piece(),
                kind,
                Value::String(piece.iter().collect()),
            )
        })
        .collect()
}

fn chunk_array(items: &[Value], max_len: usize, ids: &mut PieceIds) -> Vec<FragmentTree> {
    let mut out = Vec::new();
    let mut bucket: Vec<Value> = Vec::new();
    let mut bucket_len = 0usize;

    for (i, item) in items.iter().enumerate() {
        let weight = virtual_len(item);
        if weight > max_len {
            // placeholder holds the extracted element's slot; it has zero
            // virtual length and is replaced when the nested value composes
            bucket.push(Value::String(String::new()));
            flush_bucket(&mut out, &mut bucket, &mut bucket_len, ids);
            let base = ids.extraction_base().element(i);
            let children = chunk_level(item, max_len, &mut PieceIds::nested(base.clone()));
            out.push(FragmentTree::Nested {
                chunk_id: base,
                children,
            });
        } else {
            if bucket_len + weight > max_len && !bucket.is_empty() {
                flush_bucket(&mut out, &mut bucket, &mut bucket_len, ids);
            }
            bucket.push(item.clone());
            bucket_len += weight;
        }
    }
    if !bucket.is_empty() || out.is_empty() {
        flush_bucket(&mut out, &mut bucket, &mut bucket_len, ids);
    }
    out
}

fn chunk_object(map: &Map<String, Value>, max_len: usize, ids: &mut PieceIds) -> Vec<FragmentTree> {
    let mut out = Vec::new();
    let mut bucket = Map::new();
    let mut bucket_len = 0usize;

    for (key, val) in map {
        let weight = key.chars().count() + virtual_len(val);
        if weight > max_len {
            if !bucket.is_empty() {
                flush_entries(&mut out, &mut bucket, &mut bucket_len, ids);
            }
            let base = ids.extraction_base().key(key);
            let children = chunk_level(val, max_len, &mut PieceIds::nested(base.clone()));
            out.push(FragmentTree::Nested {
                chunk_id: base,
                children,
            });
        } else {
            if bucket_len + weight > max_len && !bucket.is_empty() {
                flush_entries(&mut out, &mut bucket, &mut bucket_len, ids);
            }
            bucket.insert(key.clone(), val.clone());
            bucket_len += weight;
        }
    }
    if !bucket.is_empty() || out.is_empty() {
        flush_entries(&mut out, &mut bucket, &mut bucket_len, ids);
    }
    out
}

fn flush_bucket(
    out: &mut Vec<FragmentTree>,
    bucket: &mut Vec<Value>,
    bucket_len: &mut usize,
    ids: &mut PieceIds,
) {
    out.push(leaf(
        ids.next_piece(),
        StructKind::Array,
        Value::Array(std::mem::take(bucket)),
    ));
    *bucket_len = 0;
}

fn flush_entries(
    out: &mut Vec<FragmentTree>,
    bucket: &mut Map<String, Value>,
    bucket_len: &mut usize,
    ids: &mut PieceIds,
) {
    out.push(leaf(
        ids.next_piece(),
        StructKind::Mapping,
        Value::Object(std::mem::take(bucket)),
    ));
    *bucket_len = 0;
}

fn leaf(chunk_id: ChunkId, kind: StructKind, data: Value) -> FragmentTree {
    FragmentTree::Leaf(Fragment {
        chunk_id,
        kind,
        data,
    })
}
