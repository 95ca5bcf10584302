//! The stamped-out data model: an ordered document of (name, value) pairs
//! where a value is one of a small closed set of leaf kinds, a nested
//! document, or a heterogeneous array. This is deliberately *not* BSON — the
//! wire codec is a store-adapter concern (see `mongo_wire`) — but it mirrors
//! BSON's shape closely enough that the estimator in `wire_size` is exact for
//! every value this crate can produce.

use chrono::{DateTime, Utc};

use crate::objectid::ObjectId;

/// An ordered sequence of (name, value) pairs. Names are not required to be
/// unique; duplicates are preserved in the order they occur.
pub type Document = Vec<(String, Value)>;

/// A binary blob with a BSON-style subtype byte.
#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub subtype: u8,
    pub bytes: Vec<u8>,
}

impl Binary {
    pub fn new(bytes: Vec<u8>) -> Self {
        Binary { subtype: 0, bytes }
    }
}

/// One stamped leaf or container value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Binary(Binary),
    Timestamp(DateTime<Utc>),
    ObjectId(ObjectId),
    Document(Document),
    Array(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Walks a `Value` tree and sums the bytes it would occupy in canonical BSON
/// encoding. The real BSON codec is a store-adapter concern, but the ingest
/// pipeline still needs a faithful notion of "wire size" to decide when to
/// flush a batch.
///
/// The estimate is exact for every `Value` shape this crate's generators and
/// compiler can produce; it is not a general-purpose BSON size calculator.
pub fn wire_size(doc: &Document) -> usize {
    // int32 length prefix + elements + trailing NUL.
    4 + doc.iter().map(|(k, v)| element_size(k, v)).sum::<usize>() + 1
}

fn element_size(name: &str, value: &Value) -> usize {
    // type tag + cstring field name (+ NUL) + payload
    1 + name.len() + 1 + value_payload_size(value)
}

fn value_payload_size(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int64(_) => 8,
        Value::Float64(_) => 8,
        Value::String(s) => 4 + s.len() + 1,
        Value::Binary(b) => 4 + 1 + b.bytes.len(),
        Value::Timestamp(_) => 8,
        Value::ObjectId(_) => 12,
        Value::Document(inner) => wire_size(inner),
        Value::Array(items) => {
            // arrays are encoded as documents keyed by stringified index
            let mut size = 4usize;
            for (i, item) in items.iter().enumerate() {
                size += element_size(&i.to_string(), item);
            }
            size + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_five_bytes() {
        let doc: Document = vec![];
        assert_eq!(wire_size(&doc), 5);
    }

    #[test]
    fn scalar_contributes_expected_bytes() {
        let doc: Document = vec![("x".to_string(), Value::Int64(1))];
        // 4 (len) + 1 (tag) + 1 ("x") + 1 (nul) + 8 (i64) + 1 (trailing nul)
        assert_eq!(wire_size(&doc), 4 + 1 + 1 + 1 + 8 + 1);
    }

    #[test]
    fn nested_document_is_recursive() {
        let inner: Document = vec![("y".to_string(), Value::Bool(true))];
        let doc: Document = vec![("x".to_string(), Value::Document(inner.clone()))];
        assert_eq!(
            wire_size(&doc),
            4 + (1 + 1 + 1 + wire_size(&inner)) + 1
        );
    }
}
