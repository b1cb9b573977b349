//! Filters and patches for detached updates.

use serde_json::{Map, Value};

use crate::Document;

/// Selects the records a detached patch applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// The record whose `_id` equals the value.
    ById(Value),
    /// Every record whose `key` field equals `value`.
    Field { key: String, value: Value },
}

impl Filter {
    /// Returns `true` if `doc` is selected by this filter.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::ById(id) => doc.get("_id") == Some(id),
            Self::Field { key, value } => doc.get(key) == Some(value),
        }
    }
}

/// An in-place modification of a stored record.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Overwrite the listed fields.
    Set(Map<String, Value>),
    /// Add `by` to an integer field (a missing field counts as 0).
    Inc { field: String, by: i64 },
    /// Append to an array field (a missing field becomes a 1-element array).
    Push { field: String, value: Value },
    /// Remove leading entries of an array field until `counter` reaches
    /// `upto`. `counter` is an integer field holding how many entries were
    /// ever removed, so repeating the patch removes nothing new.
    DropFront {
        field: String,
        counter: String,
        upto: u64,
    },
    /// Apply each patch in order.
    All(Vec<Patch>),
}

impl Patch {
    /// Builds a single-field [`Patch::Set`].
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut map = Map::new();
        map.insert(field.into(), value.into());
        Self::Set(map)
    }

    /// Applies the patch to `doc`. Non-object documents are left alone.
    pub fn apply(&self, doc: &mut Document) {
        if let Self::All(patches) = self {
            for patch in patches {
                patch.apply(doc);
            }
            return;
        }
        let Some(fields) = doc.as_object_mut() else {
            return;
        };
        match self {
            Self::Set(values) => {
                for (k, v) in values {
                    fields.insert(k.clone(), v.clone());
                }
            }
            Self::Inc { field, by } => {
                let current =
                    fields.get(field).and_then(Value::as_i64).unwrap_or(0);
                fields.insert(field.clone(), Value::from(current + by));
            }
            Self::Push { field, value } => match fields.get_mut(field) {
                Some(Value::Array(items)) => items.push(value.clone()),
                _ => {
                    fields.insert(field.clone(), Value::Array(vec![value.clone()]));
                }
            },
            Self::DropFront {
                field,
                counter,
                upto,
            } => {
                let dropped = fields.get(counter).and_then(Value::as_u64).unwrap_or(0);
                if dropped >= *upto {
                    return;
                }
                let Some(Value::Array(items)) = fields.get_mut(field) else {
                    return;
                };
                let n = usize::try_from(upto - dropped)
                    .unwrap_or(usize::MAX)
                    .min(items.len());
                items.drain(..n);
                fields.insert(counter.clone(), Value::from(dropped + n as u64));
            }
            Self::All(_) => {}
        }
    }
}
