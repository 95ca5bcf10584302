//! Stamp-out engine: evaluates a `Plug` into one fresh `Document`, invoking
//! every embedded generator exactly once per call.

use crate::compiler::{Plug, PlugNode};
use crate::value::{Document, Value};

/// Produces one fresh document from a plug. No mutable sub-structure is
/// shared between the plug and the returned document, nor between two
/// documents produced by successive calls: every nested document and array
/// is freshly allocated.
pub fn stamp(plug: &Plug) -> Document {
    plug.root
        .iter()
        .map(|(k, node)| (k.clone(), stamp_node(node)))
        .collect()
}

fn stamp_node(node: &PlugNode) -> Value {
    match node {
        PlugNode::Null => Value::Null,
        PlugNode::Bool(b) => Value::Bool(*b),
        PlugNode::Int64(i) => Value::Int64(*i),
        PlugNode::Float64(f) => Value::Float64(*f),
        PlugNode::String(s) => Value::String(s.clone()),
        PlugNode::Document(entries) => {
            Value::Document(entries.iter().map(|(k, v)| (k.clone(), stamp_node(v))).collect())
        }
        PlugNode::Array(items) => Value::Array(items.iter().map(stamp_node).collect()),
        PlugNode::Generator(generator) => generator.call(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;

    #[test]
    fn literal_template_stamps_to_itself() {
        let plug = compile(r#"{"a":1,"b":"x","c":true,"d":null,"e":1.5}"#).unwrap();
        let doc = stamp(&plug);
        assert_eq!(
            doc,
            vec![
                ("a".to_string(), Value::Int64(1)),
                ("b".to_string(), Value::String("x".to_string())),
                ("c".to_string(), Value::Bool(true)),
                ("d".to_string(), Value::Null),
                ("e".to_string(), Value::Float64(1.5)),
            ]
        );
    }

    #[test]
    fn sequence_is_deterministic_across_calls() {
        let plug = compile(r#"{"s":{"generator_func":"Sequence","start":0,"step":2}}"#).unwrap();
        let values: Vec<Value> = (0..4).map(|_| stamp(&plug)[0].1.clone()).collect();
        assert_eq!(
            values,
            vec![
                Value::Float64(0.0),
                Value::Float64(2.0),
                Value::Float64(4.0),
                Value::Float64(6.0),
            ]
        );
    }

    #[test]
    fn stamps_do_not_share_mutable_structure() {
        let plug = compile(r#"{"nested":{"x":1}, "arr":[1,2,3]}"#).unwrap();
        let mut first = stamp(&plug);
        let second = stamp(&plug);
        if let Value::Document(inner) = &mut first[0].1 {
            inner.push(("mutated".to_string(), Value::Bool(true)));
        }
        if let Value::Array(items) = &mut first[1].1 {
            items.push(Value::Int64(99));
        }
        match &second[0].1 {
            Value::Document(inner) => assert_eq!(inner.len(), 1),
            other => panic!("expected document, got {:?}", other),
        }
        match &second[1].1 {
            Value::Array(items) => assert_eq!(items.len(), 3),
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn empty_plug_stamps_to_empty_document() {
        let plug = compile("{}").unwrap();
        assert!(stamp(&plug).is_empty());
    }
}
