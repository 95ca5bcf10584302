//! Template compiler: turns a decoded JSON tree into a `Plug` — an ordered
//! document whose leaves may be literal scalars, nested documents, arrays,
//! or bound generators.

use serde_json::{Map, Value as Json};

use crate::error::{DocplugError, DocplugResult};
use crate::generators::{self, GeneratorFn};

/// One leaf (or container) of a compiled plug.
#[derive(Debug)]
pub enum PlugNode {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Document(Vec<(String, PlugNode)>),
    Array(Vec<PlugNode>),
    Generator(GeneratorFn),
}

/// A compiled template: an ordered document whose leaves may be bound
/// generators. Immutable after compilation except for each `Sequence`
/// generator's own interior counter.
#[derive(Debug)]
pub struct Plug {
    pub root: Vec<(String, PlugNode)>,
}

/// Compiles a JSON template string into a `Plug`. The root must decode as a
/// JSON object; anything else (including malformed JSON) is a
/// `TemplateSyntax` error.
pub fn compile(template: &str) -> DocplugResult<Plug> {
    let decoded: Json = serde_json::from_str(template)?;
    let root = match decoded {
        Json::Object(map) => convert_document(&map),
        other => {
            return Err(DocplugError::TemplateSyntax(format!(
                "template root must be a JSON object, got {}",
                json_kind(&other)
            )))
        }
    };
    Ok(Plug { root })
}

fn json_kind(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn convert_document(map: &Map<String, Json>) -> Vec<(String, PlugNode)> {
    map.iter()
        .map(|(k, v)| (k.clone(), convert_value(v)))
        .collect()
}

fn convert_value(v: &Json) -> PlugNode {
    match v {
        Json::Null => PlugNode::Null,
        Json::Bool(b) => PlugNode::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                PlugNode::Int64(i)
            } else if let Some(u) = n.as_u64() {
                // Fits u64 but not i64 (> i64::MAX); leaves are only ever
                // int64 or float64, so this falls back to float64.
                PlugNode::Float64(u as f64)
            } else {
                PlugNode::Float64(n.as_f64().unwrap_or(0.0))
            }
        }
        Json::String(s) => PlugNode::String(s.clone()),
        Json::Array(items) => PlugNode::Array(items.iter().map(convert_value).collect()),
        Json::Object(map) => convert_object_or_generator(map),
    }
}

fn convert_object_or_generator(map: &Map<String, Json>) -> PlugNode {
    if let Some(Json::String(name)) = map.get("generator_func") {
        match generators::build(name, map) {
            Some(Some(generator)) => return PlugNode::Generator(generator),
            Some(None) => {
                // Recognized name, unbuildable options: fall back to literal.
                return PlugNode::Document(convert_document(map));
            }
            None => {
                log::warn!(
                    "unrecognized generator_func '{}', treating object as literal data",
                    name
                );
                return PlugNode::Document(convert_document(map));
            }
        }
    }
    PlugNode::Document(convert_document(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stamp::stamp;
    use crate::value::Value;

    #[test]
    fn empty_object_compiles_to_empty_plug() {
        let plug = compile("{}").unwrap();
        assert!(plug.root.is_empty());
    }

    #[test]
    fn non_object_root_is_template_syntax_error() {
        assert!(matches!(
            compile("[1,2,3]"),
            Err(DocplugError::TemplateSyntax(_))
        ));
        assert!(matches!(compile("\"x\""), Err(DocplugError::TemplateSyntax(_))));
    }

    #[test]
    fn malformed_json_is_template_syntax_error() {
        assert!(matches!(compile("{"), Err(DocplugError::TemplateSyntax(_))));
    }

    #[test]
    fn key_order_is_preserved() {
        let plug = compile(r#"{"z":1,"a":2,"m":3}"#).unwrap();
        let keys: Vec<&str> = plug.root.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn unrecognized_generator_func_is_literal() {
        let plug = compile(r#"{"foo":{"generator_func":"NoSuchFunc","x":1}}"#).unwrap();
        let doc = stamp(&plug);
        assert_eq!(doc.len(), 1);
        match &doc[0].1 {
            Value::Document(inner) => {
                assert_eq!(inner[0], ("generator_func".to_string(), Value::String("NoSuchFunc".into())));
                assert_eq!(inner[1], ("x".to_string(), Value::Int64(1)));
            }
            other => panic!("expected literal document, got {:?}", other),
        }
    }

    #[test]
    fn generator_inside_array_is_recognized() {
        let plug = compile(r#"{"a":[{"generator_func":"ObjectId"},{"generator_func":"ObjectId"}]}"#).unwrap();
        let doc = stamp(&plug);
        match &doc[0].1 {
            Value::Array(items) => {
                assert_eq!(items.len(), 2);
                match (&items[0], &items[1]) {
                    (Value::ObjectId(a), Value::ObjectId(b)) => assert_ne!(a, b),
                    other => panic!("expected two object ids, got {:?}", other),
                }
            }
            other => panic!("expected array, got {:?}", other),
        }
    }
}
