//! Rebuilding values from unordered leaf fragments

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{ChunkError, Result};
use crate::fragment::{ReceivedFragment, StructKind};
use crate::path::PathSegment;

/// Checks that a fragment set declares a consistent `total` and carries the
/// contiguous index range `[0, total)`.
pub fn verify_sequence(fragments: &[ReceivedFragment]) -> Result<()> {
    if fragments.is_empty() {
        return Err(ChunkError::EmptyFragmentSet);
    }
    let total = fragments[0].total;
    if total == 0 {
        return Err(ChunkError::FragmentSequence {
            reason: "declared total is zero".to_string(),
        });
    }
    if let Some(odd) = fragments.iter().find(|f| f.total != total) {
        return Err(ChunkError::FragmentSequence {
            reason: format!("fragments disagree on total ({} vs {})", total, odd.total),
        });
    }
    let mut seen = vec![false; total];
    for frag in fragments {
        if frag.index >= total {
            return Err(ChunkError::FragmentSequence {
                reason: format!("index {} out of range 0..{}", frag.index, total),
            });
        }
        if seen[frag.index] {
            return Err(ChunkError::FragmentSequence {
                reason: format!("duplicate index {}", frag.index),
            });
        }
        seen[frag.index] = true;
    }
    let present = seen.iter().filter(|s| **s).count();
    if present < total {
        return Err(ChunkError::IncompleteFragmentSet { present, total });
    }
    Ok(())
}

/// Rebuilds the original value from the leaf fragments of one write group.
///
/// Fragments may arrive in any order. Missing fragments do not fail the
/// call — the reconstruction is best-effort and callers use
/// [`verify_sequence`] to decide how to treat gaps. A fragment whose chunk id
/// conflicts with the structure already materialized at its path is dropped
/// with a warning.
pub fn reassemble(fragments: &[ReceivedFragment]) -> Result<Value> {
    if fragments.is_empty() {
        return Err(ChunkError::EmptyFragmentSet);
    }
    if fragments.len() == 1
        && fragments[0].total == 1
        && fragments[0].chunk_id.content_path().is_empty()
    {
        // whole value in one root fragment, nothing to compose
        return Ok(fragments[0].data.clone());
    }

    let mut groups: BTreeMap<Vec<PathSegment>, Vec<&ReceivedFragment>> = BTreeMap::new();
    for frag in fragments {
        groups
            .entry(frag.chunk_id.content_path())
            .or_default()
            .push(frag);
    }

    let mut merged: Vec<(Vec<PathSegment>, Value)> = Vec::with_capacity(groups.len());
    for (path, mut group) in groups {
        group.sort_by_key(|f| f.chunk_id.sibling_order());
        merged.push((path, merge_group(&group)));
    }
    // parents compose before children, then stable order across branches
    merged.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

    let mut root: Option<Value> = None;
    for (path, value) in merged {
        match path.first() {
            None => {
                if root.is_none() {
                    root = Some(value);
                } else {
                    warn!("duplicate root fragment group dropped");
                }
            }
            Some(first) => {
                let base = root.get_or_insert_with(|| match first {
                    PathSegment::Index(_) => Value::Array(Vec::new()),
                    PathSegment::Key(_) => Value::Object(Map::new()),
                });
                if insert_at(base, &path, value).is_err() {
                    warn!(
                        path = %path.iter().map(PathSegment::as_string).collect::<Vec<_>>().join("."),
                        "fragment incompatible with materialized structure, dropped"
                    );
                }
            }
        }
    }
    Ok(root.unwrap_or(Value::Null))
}

fn merge_group(group: &[&ReceivedFragment]) -> Value {
    if group.len() == 1 {
        return group[0].data.clone();
    }
    let kind = group
        .iter()
        .find_map(|f| f.kind)
        .unwrap_or_else(|| match &group[0].data {
            Value::Array(_) => StructKind::Array,
            Value::Object(_) => StructKind::Mapping,
            _ => StructKind::Leaf,
        });
    match kind {
        StructKind::Array => {
            let mut items = Vec::new();
            for frag in group {
                match &frag.data {
                    Value::Array(elems) => items.extend(elems.iter().cloned()),
                    other => warn!(chunk_id = %frag.chunk_id, "non-array piece {other} in array group, skipped"),
                }
            }
            Value::Array(items)
        }
        StructKind::Mapping => {
            let mut map = Map::new();
            for frag in group {
                match &frag.data {
                    Value::Object(entries) => {
                        map.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())))
                    }
                    other => warn!(chunk_id = %frag.chunk_id, "non-mapping piece {other} in mapping group, skipped"),
                }
            }
            Value::Object(map)
        }
        StructKind::Scalar => {
            let joined = concat_strings(group);
            serde_json::from_str(&joined).unwrap_or_else(|_| {
                warn!("scalar pieces did not parse back, kept as string");
                Value::String(joined)
            })
        }
        StructKind::Leaf => {
            if group.iter().all(|f| f.data.is_string()) {
                Value::String(concat_strings(group))
            } else {
                group[0].data.clone()
            }
        }
    }
}

fn concat_strings(group: &[&ReceivedFragment]) -> String {
    group
        .iter()
        .filter_map(|f| f.data.as_str())
        .collect::<Vec<_>>()
        .concat()
}

/// Walks `path` from `root`, creating containers as needed, and sets the
/// final slot. `Err` means the existing structure is incompatible.
fn insert_at(root: &mut Value, path: &[PathSegment], value: Value) -> std::result::Result<(), ()> {
    let (last, parents) = path.split_last().ok_or(())?;
    let mut cur = root;
    for (i, seg) in parents.iter().enumerate() {
        let next = &path[i + 1];
        match seg {
            PathSegment::Key(k) => {
                let map = cur.as_object_mut().ok_or(())?;
                let slot = map.entry(k.clone()).or_insert(Value::Null);
                ensure_container(slot, next)?;
                cur = slot;
            }
            PathSegment::Index(idx) => {
                let arr = cur.as_array_mut().ok_or(())?;
                if arr.len() <= *idx {
                    arr.resize(idx + 1, Value::Null);
                }
                let slot = &mut arr[*idx];
                ensure_container(slot, next)?;
                cur = slot;
            }
        }
    }
    match last {
        PathSegment::Key(k) => {
            cur.as_object_mut().ok_or(())?.insert(k.clone(), value);
        }
        PathSegment::Index(idx) => {
            let arr = cur.as_array_mut().ok_or(())?;
            if arr.len() <= *idx {
                arr.resize(idx + 1, Value::Null);
            }
            arr[*idx] = value;
        }
    }
    Ok(())
}

/// An intermediate slot must be a container matching the next segment.
/// Null fill and slot placeholders are promoted; anything else of the wrong
/// shape is a conflict.
fn ensure_container(slot: &mut Value, next: &PathSegment) -> std::result::Result<(), ()> {
    let vacant = slot.is_null() || matches!(slot, Value::String(s) if s.is_empty());
    match next {
        PathSegment::Index(_) => {
            if vacant {
                *slot = Value::Array(Vec::new());
            }
            if slot.is_array() {
                Ok(())
            } else {
                Err(())
            }
        }
        PathSegment::Key(_) => {
            if vacant {
                *slot = Value::Object(Map::new());
            }
            if slot.is_object() {
                Ok(())
            } else {
                Err(())
            }
        }
    }
}
