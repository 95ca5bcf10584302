//! A small, self-contained BSON codec. It exists purely to support
//! `mongo_wire::MongoWireStore` — the reference store adapter that speaks
//! just enough of the MongoDB wire protocol to run `hello`, `drop`, and
//! `insert` against a real `mongod`. It is not a general-purpose driver; it
//! encodes exactly the `Value` shapes this crate's generators and compiler
//! can produce, and decodes exactly the reply shapes those three commands
//! return. The byte layout mirrors `value::wire_size` exactly, so the two
//! stay trivially consistent.

use chrono::{TimeZone, Utc};

use crate::error::{DocplugError, DocplugResult};
use crate::objectid::ObjectId;
use crate::value::{Binary, Document, Value};

const TAG_DOUBLE: u8 = 0x01;
const TAG_STRING: u8 = 0x02;
const TAG_DOCUMENT: u8 = 0x03;
const TAG_ARRAY: u8 = 0x04;
const TAG_BINARY: u8 = 0x05;
const TAG_OBJECT_ID: u8 = 0x07;
const TAG_BOOL: u8 = 0x08;
const TAG_DATETIME: u8 = 0x09;
const TAG_NULL: u8 = 0x0A;
const TAG_INT32: u8 = 0x10;
const TAG_INT64: u8 = 0x12;

pub fn encode_document(doc: &Document) -> Vec<u8> {
    let mut elements = Vec::new();
    for (name, value) in doc {
        encode_element(&mut elements, name, value);
    }
    let total_len = 4 + elements.len() + 1;
    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(&(total_len as i32).to_le_bytes());
    out.extend_from_slice(&elements);
    out.push(0);
    out
}

fn encode_array(items: &[Value]) -> Vec<u8> {
    let doc: Document = items
        .iter()
        .enumerate()
        .map(|(i, v)| (i.to_string(), v.clone()))
        .collect();
    encode_document(&doc)
}

fn write_cstring(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&((bytes.len() + 1) as i32).to_le_bytes());
    buf.extend_from_slice(bytes);
    buf.push(0);
}

fn encode_element(buf: &mut Vec<u8>, name: &str, value: &Value) {
    match value {
        Value::Null => {
            buf.push(TAG_NULL);
            write_cstring(buf, name);
        }
        Value::Bool(b) => {
            buf.push(TAG_BOOL);
            write_cstring(buf, name);
            buf.push(if *b { 1 } else { 0 });
        }
        Value::Int64(i) => {
            buf.push(TAG_INT64);
            write_cstring(buf, name);
            buf.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float64(f) => {
            buf.push(TAG_DOUBLE);
            write_cstring(buf, name);
            buf.extend_from_slice(&f.to_le_bytes());
        }
        Value::String(s) => {
            buf.push(TAG_STRING);
            write_cstring(buf, name);
            write_string(buf, s);
        }
        Value::Binary(b) => {
            buf.push(TAG_BINARY);
            write_cstring(buf, name);
            buf.extend_from_slice(&(b.bytes.len() as i32).to_le_bytes());
            buf.push(b.subtype);
            buf.extend_from_slice(&b.bytes);
        }
        Value::Timestamp(dt) => {
            buf.push(TAG_DATETIME);
            write_cstring(buf, name);
            buf.extend_from_slice(&dt.timestamp_millis().to_le_bytes());
        }
        Value::ObjectId(oid) => {
            buf.push(TAG_OBJECT_ID);
            write_cstring(buf, name);
            buf.extend_from_slice(&oid.0);
        }
        Value::Document(inner) => {
            buf.push(TAG_DOCUMENT);
            write_cstring(buf, name);
            buf.extend_from_slice(&encode_document(inner));
        }
        Value::Array(items) => {
            buf.push(TAG_ARRAY);
            write_cstring(buf, name);
            buf.extend_from_slice(&encode_array(items));
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> DocplugResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(DocplugError::IOError("truncated BSON document".into()));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> DocplugResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn i32(&mut self) -> DocplugResult<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i64(&mut self) -> DocplugResult<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> DocplugResult<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn cstring(&mut self) -> DocplugResult<String> {
        let start = self.pos;
        while self.pos < self.buf.len() && self.buf[self.pos] != 0 {
            self.pos += 1;
        }
        if self.pos >= self.buf.len() {
            return Err(DocplugError::IOError("unterminated BSON cstring".into()));
        }
        let s = String::from_utf8_lossy(&self.buf[start..self.pos]).into_owned();
        self.pos += 1;
        Ok(s)
    }
}

/// Decodes one BSON document from the front of `bytes`, returning it
/// alongside the number of bytes consumed.
pub fn decode_document(bytes: &[u8]) -> DocplugResult<(Document, usize)> {
    let mut r = Reader::new(bytes);
    let total_len = r.i32()? as usize;
    let mut doc = Vec::new();
    loop {
        let tag = r.u8()?;
        if tag == 0 {
            break;
        }
        let name = r.cstring()?;
        let value = decode_value(&mut r, tag)?;
        doc.push((name, value));
    }
    Ok((doc, total_len))
}

fn decode_value(r: &mut Reader<'_>, tag: u8) -> DocplugResult<Value> {
    match tag {
        TAG_DOUBLE => Ok(Value::Float64(r.f64()?)),
        TAG_STRING => {
            let len = r.i32()? as usize;
            let bytes = r.take(len)?;
            let s = String::from_utf8_lossy(&bytes[..bytes.len().saturating_sub(1)]).into_owned();
            Ok(Value::String(s))
        }
        TAG_DOCUMENT => {
            let remaining = &r.buf[r.pos..];
            let (doc, consumed) = decode_document(remaining)?;
            r.pos += consumed;
            Ok(Value::Document(doc))
        }
        TAG_ARRAY => {
            let remaining = &r.buf[r.pos..];
            let (doc, consumed) = decode_document(remaining)?;
            r.pos += consumed;
            Ok(Value::Array(doc.into_iter().map(|(_, v)| v).collect()))
        }
        TAG_BINARY => {
            let len = r.i32()? as usize;
            let subtype = r.u8()?;
            let bytes = r.take(len)?.to_vec();
            Ok(Value::Binary(Binary { subtype, bytes }))
        }
        TAG_OBJECT_ID => {
            let raw = r.take(12)?;
            let mut bytes = [0u8; 12];
            bytes.copy_from_slice(raw);
            Ok(Value::ObjectId(ObjectId(bytes)))
        }
        TAG_BOOL => Ok(Value::Bool(r.u8()? != 0)),
        TAG_DATETIME => {
            let millis = r.i64()?;
            let dt = Utc
                .timestamp_millis_opt(millis)
                .single()
                .unwrap_or_else(Utc::now);
            Ok(Value::Timestamp(dt))
        }
        TAG_NULL => Ok(Value::Null),
        TAG_INT32 => Ok(Value::Int64(r.i32()? as i64)),
        TAG_INT64 => Ok(Value::Int64(r.i64()?)),
        other => Err(DocplugError::IOError(format!(
            "unsupported BSON element type 0x{:02x}",
            other
        ))),
    }
}

/// Looks up a top-level field by name in a decoded reply document.
pub fn get<'a>(doc: &'a Document, key: &str) -> Option<&'a Value> {
    doc.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_mixed_document() {
        let doc: Document = vec![
            ("a".to_string(), Value::Int64(42)),
            ("b".to_string(), Value::String("hello".to_string())),
            ("c".to_string(), Value::Bool(true)),
            ("d".to_string(), Value::Null),
            ("e".to_string(), Value::Float64(1.5)),
            (
                "f".to_string(),
                Value::Document(vec![("nested".to_string(), Value::Int64(7))]),
            ),
            ("g".to_string(), Value::Array(vec![Value::Int64(1), Value::Int64(2)])),
        ];
        let bytes = encode_document(&doc);
        let (decoded, consumed) = decode_document(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, doc);
    }

    #[test]
    fn encoded_length_matches_wire_size_estimator() {
        let doc: Document = vec![("x".to_string(), Value::Int64(1))];
        let bytes = encode_document(&doc);
        assert_eq!(bytes.len(), crate::value::wire_size(&doc));
    }

    #[test]
    fn object_id_round_trips() {
        let oid = ObjectId::generate();
        let doc: Document = vec![("_id".to_string(), Value::ObjectId(oid))];
        let bytes = encode_document(&doc);
        let (decoded, _) = decode_document(&bytes).unwrap();
        assert_eq!(decoded, doc);
    }
}
