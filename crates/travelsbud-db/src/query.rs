use std::cmp::Ordering;

use serde_json::Value;

use crate::document::Document;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { field: String, value: Value },
    ArrayContains { field: String, value: Value },
}

impl Filter {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Eq { field, value } => doc.get(field) == Some(value),
            Self::ArrayContains { field, value } => doc
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A collection query: equality / array-contains filters, one order-by, a limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: String,
    filters: Vec<Filter>,
    order_by: Option<(String, Direction)>,
    limit: Option<usize>,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn where_array_contains(
        mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.filters.push(Filter::ArrayContains {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Documents without `field` are excluded from ordered results.
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        let ordered = match &self.order_by {
            Some((field, _)) => doc.get(field).is_some(),
            None => true,
        };
        ordered && self.filters.iter().all(|f| f.matches(doc))
    }

    /// Filter, order and limit `docs`, which arrive in insertion order.
    pub(crate) fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut docs: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();

        if let Some((field, direction)) = &self.order_by {
            docs.sort_by(|a, b| {
                let ord = match (a.get(field), b.get(field)) {
                    (Some(x), Some(y)) => compare_values(x, y),
                    _ => Ordering::Equal,
                };
                let ord = match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                };
                ord.then(a.seq.cmp(&b.seq))
            });
        }

        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

/// Cross-type order: null < bool < number < string < array < object.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, seq: i64, fields: Value) -> Document {
        Document {
            id: id.into(),
            path: format!("c/{}", id),
            fields: fields.as_object().cloned().unwrap(),
            version: 1,
            seq,
        }
    }

    #[test]
    fn order_by_breaks_ties_by_insertion() {
        let docs = vec![
            doc("late", 3, json!({ "t": "2024-01-01T00:00:00.000002Z" })),
            doc("tie-b", 2, json!({ "t": "2024-01-01T00:00:00.000001Z" })),
            doc("tie-a", 1, json!({ "t": "2024-01-01T00:00:00.000001Z" })),
        ];
        let q = Query::new("c").order_by("t", Direction::Ascending);
        let ids: Vec<_> = q.apply(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["tie-a", "tie-b", "late"]);
    }

    #[test]
    fn order_by_excludes_documents_missing_the_field() {
        let docs = vec![doc("a", 1, json!({})), doc("b", 2, json!({ "t": 1 }))];
        let q = Query::new("c").order_by("t", Direction::Ascending);
        let ids: Vec<_> = q.apply(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn mixed_types_order_by_rank() {
        assert_eq!(compare_values(&json!(null), &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!(10), &json!("1")), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
    }
}
