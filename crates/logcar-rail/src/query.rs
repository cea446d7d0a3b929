//! Translation of search specifications into the platform filter language

use std::collections::BTreeMap;

use logcar_chunk::Operation;
use uuid::Uuid;

/// Attribute predicates to negate in a search.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSpec {
    /// Exclude lines of this record
    pub rid: Option<Uuid>,
    /// Exclude lines of this operation
    pub op: Option<Operation>,
    /// Exclude lines matching these attribute values
    pub attributes: BTreeMap<String, String>,
}

/// A search request over the log index.
///
/// Every predicate becomes an `@key:"value"` term; exclusions get a leading
/// `-`; terms are joined with ` AND `, and a caller-supplied raw filter is
/// appended verbatim.
#[derive(Debug, Clone)]
pub struct SearchSpec {
    /// Restrict to one record
    pub rid: Option<Uuid>,
    /// Restrict to one operation
    pub op: Option<Operation>,
    /// Arbitrary attribute equality predicates
    pub attributes: BTreeMap<String, String>,
    /// Raw filter expression appended as-is
    pub raw_filter: Option<String>,
    /// Negated predicates
    pub exclude: Option<ExcludeSpec>,
    /// Number of records the caller wants back
    pub limit: usize,
}

impl Default for SearchSpec {
    fn default() -> Self {
        Self {
            rid: None,
            op: None,
            attributes: BTreeMap::new(),
            raw_filter: None,
            exclude: None,
            limit: 1,
        }
    }
}

impl SearchSpec {
    /// The canonical single-record lookup: one rid, `read` audit lines
    /// excluded so retrievals never mask the real state.
    pub fn for_record(rid: Uuid) -> Self {
        Self {
            rid: Some(rid),
            exclude: Some(ExcludeSpec {
                op: Some(Operation::Read),
                ..ExcludeSpec::default()
            }),
            limit: 1,
            ..Self::default()
        }
    }

    /// Renders the platform filter expression.
    pub fn to_filter(&self) -> String {
        let mut terms = Vec::new();
        if let Some(rid) = &self.rid {
            terms.push(format!("@__id:\"{rid}\""));
        }
        if let Some(op) = &self.op {
            terms.push(format!("@operation:\"{op}\""));
        }
        for (key, value) in &self.attributes {
            terms.push(format!("@{key}:\"{value}\""));
        }
        if let Some(exclude) = &self.exclude {
            if let Some(rid) = &exclude.rid {
                terms.push(format!("-@__id:\"{rid}\""));
            }
            if let Some(op) = &exclude.op {
                terms.push(format!("-@operation:\"{op}\""));
            }
            for (key, value) in &exclude.attributes {
                terms.push(format!("-@{key}:\"{value}\""));
            }
        }
        if let Some(raw) = &self.raw_filter {
            terms.push(raw.clone());
        }
        terms.join(" AND ")
    }
}
