//! The canonical persistent entity and its query surface.

use crate::id::VectorId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A stored vector plus its structured metadata.
///
/// Reserved metadata fields: `content` (original text, if any) and
/// `timestamp` is tracked separately rather than duplicated into
/// metadata (it is a first-class field here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: VectorId,
    pub vector: Vec<f32>,
    pub metadata: HashMap<String, Value>,
    /// Last-mutation time, milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl VectorRecord {
    #[must_use]
    pub fn new(id: VectorId, vector: Vec<f32>, metadata: HashMap<String, Value>) -> Self {
        Self {
            id,
            vector,
            metadata,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Size estimate used by the byte-accounted `vectordb_cache::VectorCache`:
    /// `vector.byteLength + 2*len(json(metadata)) + 100`.
    #[must_use]
    pub fn estimated_size_bytes(&self) -> usize {
        let vector_bytes = self.vector.len() * std::mem::size_of::<f32>();
        let metadata_bytes = serde_json::to_string(&self.metadata)
            .map(|s| s.len())
            .unwrap_or(0);
        vector_bytes + 2 * metadata_bytes + 100
    }
}

/// Distance metric an [`crate::traits::index::AnnIndex`] is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    L2,
    Dot,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        Self::Cosine
    }
}

/// A single result from [`crate::traits::index::AnnIndex::search`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: VectorId,
    pub score: f32,
    pub metadata: HashMap<String, Value>,
    /// Populated only when the coordinator hydrates full vectors.
    pub vector: Option<Vec<f32>>,
}

/// Recursive, composable metadata filter.
///
/// Evaluation is short-circuiting: `and` stops at the first non-matching
/// child, `or` stops at the first matching one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum QueryFilter {
    Leaf {
        field: String,
        op: FilterOp,
        value: Value,
    },
    Compound {
        op: CompoundOp,
        children: Vec<QueryFilter>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompoundOp {
    And,
    Or,
}

impl QueryFilter {
    /// Evaluate this filter against a record's metadata.
    #[must_use]
    pub fn matches(&self, metadata: &HashMap<String, Value>) -> bool {
        match self {
            Self::Leaf { field, op, value } => {
                let actual = metadata.get(field);
                eval_leaf(actual, *op, value)
            }
            Self::Compound { op, children } => match op {
                CompoundOp::And => children.iter().all(|c| c.matches(metadata)),
                CompoundOp::Or => children.iter().any(|c| c.matches(metadata)),
            },
        }
    }
}

fn eval_leaf(actual: Option<&Value>, op: FilterOp, expected: &Value) -> bool {
    match op {
        FilterOp::Eq => actual == Some(expected),
        FilterOp::Ne => actual != Some(expected),
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            let (Some(a), Some(b)) = (actual.and_then(Value::as_f64), expected.as_f64()) else {
                return false;
            };
            match op {
                FilterOp::Gt => a > b,
                FilterOp::Gte => a >= b,
                FilterOp::Lt => a < b,
                FilterOp::Lte => a <= b,
                _ => unreachable!(),
            }
        }
        FilterOp::Contains => match actual {
            Some(Value::Array(items)) => items.contains(expected),
            Some(Value::String(s)) => expected
                .as_str()
                .is_some_and(|needle| s.contains(needle)),
            _ => false,
        },
        FilterOp::In => match expected {
            Value::Array(items) => actual.is_some_and(|a| items.contains(a)),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn leaf_eq_matches() {
        let f = QueryFilter::Leaf {
            field: "cat".into(),
            op: FilterOp::Eq,
            value: json!("A"),
        };
        assert!(f.matches(&meta(&[("cat", json!("A"))])));
        assert!(!f.matches(&meta(&[("cat", json!("B"))])));
    }

    #[test]
    fn compound_and_short_circuits() {
        let f = QueryFilter::Compound {
            op: CompoundOp::And,
            children: vec![
                QueryFilter::Leaf {
                    field: "cat".into(),
                    op: FilterOp::Eq,
                    value: json!("A"),
                },
                QueryFilter::Leaf {
                    field: "score".into(),
                    op: FilterOp::Gte,
                    value: json!(10),
                },
            ],
        };
        assert!(f.matches(&meta(&[("cat", json!("A")), ("score", json!(10))])));
        assert!(!f.matches(&meta(&[("cat", json!("A"))])));
        assert!(!f.matches(&meta(&[("cat", json!("B")), ("score", json!(20))])));
    }

    #[test]
    fn contains_on_array_and_string() {
        let arr_filter = QueryFilter::Leaf {
            field: "tags".into(),
            op: FilterOp::Contains,
            value: json!("red"),
        };
        assert!(arr_filter.matches(&meta(&[("tags", json!(["red", "blue"]))])));

        let str_filter = QueryFilter::Leaf {
            field: "content".into(),
            op: FilterOp::Contains,
            value: json!("fox"),
        };
        assert!(str_filter.matches(&meta(&[("content", json!("the quick fox"))])));
        assert!(!str_filter.matches(&meta(&[("content", json!("the quick dog"))])));
    }

    #[test]
    fn estimated_size_matches_formula() {
        let rec = VectorRecord::new(
            VectorId::generate(),
            vec![0.0; 4],
            meta(&[("k", json!("v"))]),
        );
        let metadata_json_len = serde_json::to_string(&rec.metadata).unwrap().len();
        assert_eq!(rec.estimated_size_bytes(), 4 * 4 + 2 * metadata_json_len + 100);
    }
}
