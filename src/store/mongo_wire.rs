//! `MongoWireStore`: a minimal, unauthenticated MongoDB wire-protocol
//! (`OP_MSG`) adapter over a raw TCP socket. It speaks just enough of the
//! protocol to run `hello`, `drop`, and `insert` against a real
//! `mongod`/`mongos` — no SCRAM/TLS authentication, no replica-set topology
//! discovery beyond what a single `hello` reply reports, no retryable
//! writes. A production deployment is expected to supply its own adapter.
//! The framing style (length-prefixed reads off a raw `TcpStream` into a
//! growable buffer) follows the same shape as this crate's other
//! hand-rolled wire client.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use crate::error::{DocplugError, DocplugResult};
use crate::value::{Document, Value};

use super::bson::{self, get};
use super::{Namespace, NodeType, Session, Store};

const OP_MSG: i32 = 2013;

/// Translates a user-supplied write concern string into the `writeConcern`
/// document sent on the wire, downgrading to `w: 1` on a standalone node
/// (which cannot acknowledge replica-set-only concerns like `"majority"`).
fn build_write_concern(requested: &str, node_type: NodeType) -> Value {
    let w = if node_type == NodeType::Standalone {
        Value::Int64(1)
    } else if let Ok(n) = requested.parse::<i64>() {
        Value::Int64(n)
    } else {
        Value::String(requested.to_string())
    };
    Value::Document(vec![("w".to_string(), w)])
}

pub struct MongoWireStore {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl MongoWireStore {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        MongoWireStore {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Store for MongoWireStore {
    fn open_session(&self, namespace: &Namespace) -> DocplugResult<Box<dyn Session>> {
        let addr = format!("{}:{}", self.host, self.port);
        let socket_addr = addr
            .parse()
            .or_else(|_| {
                use std::net::ToSocketAddrs;
                addr.to_socket_addrs()
                    .ok()
                    .and_then(|mut it| it.next())
                    .ok_or(())
            })
            .map_err(|_| DocplugError::UnreachableStore(format!("cannot resolve {}", addr)))?;
        let stream = TcpStream::connect_timeout(&socket_addr, self.connect_timeout)
            .map_err(|e| DocplugError::UnreachableStore(format!("{}: {}", addr, e)))?;
        Ok(Box::new(MongoWireSession {
            stream,
            namespace: namespace.clone(),
            next_request_id: AtomicI32::new(1),
            write_concern: Value::Document(vec![("w".to_string(), Value::Int64(1))]),
        }))
    }
}

pub struct MongoWireSession {
    stream: TcpStream,
    namespace: Namespace,
    next_request_id: AtomicI32,
    /// The `writeConcern` document attached to `insert`/`drop` commands,
    /// set by `configure` once the node's topology is known.
    write_concern: Value,
}

impl MongoWireSession {
    fn run_command(&mut self, command: Document) -> DocplugResult<Document> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let body = bson::encode_document(&command);

        let mut message = Vec::with_capacity(16 + body.len());
        message.extend_from_slice(&0i32.to_le_bytes()); // messageLength placeholder
        message.extend_from_slice(&request_id.to_le_bytes());
        message.extend_from_slice(&0i32.to_le_bytes()); // responseTo
        message.extend_from_slice(&OP_MSG.to_le_bytes());
        message.extend_from_slice(&0u32.to_le_bytes()); // flagBits
        message.push(0); // section kind 0: single BSON document
        message.extend_from_slice(&body);
        let total_len = message.len() as i32;
        message[0..4].copy_from_slice(&total_len.to_le_bytes());

        self.stream.write_all(&message).map_err(classify_io_error)?;

        let mut header = [0u8; 16];
        read_exact_classified(&mut self.stream, &mut header)?;
        let reply_len = i32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
        if reply_len < 16 {
            return Err(DocplugError::LostConnection(
                "malformed reply header from store".into(),
            ));
        }
        let mut rest = vec![0u8; reply_len - 16];
        read_exact_classified(&mut self.stream, &mut rest)?;

        // flagBits(4) + section kind(1) + BSON document.
        if rest.len() < 5 {
            return Err(DocplugError::LostConnection(
                "truncated OP_MSG reply body".into(),
            ));
        }
        let (reply_doc, _) = bson::decode_document(&rest[5..])?;
        Ok(reply_doc)
    }

    fn command_with_db(&self, mut fields: Document) -> Document {
        fields.push((
            "$db".to_string(),
            crate::value::Value::String(self.namespace.database.clone()),
        ));
        fields
    }
}

fn read_exact_classified(stream: &mut TcpStream, buf: &mut [u8]) -> DocplugResult<()> {
    stream.read_exact(buf).map_err(classify_io_error)
}

fn classify_io_error(e: io::Error) -> DocplugError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => DocplugError::LostConnection(e.to_string()),
        _ => DocplugError::UnreachableStore(e.to_string()),
    }
}

fn is_ok(doc: &Document) -> bool {
    match get(doc, "ok") {
        Some(crate::value::Value::Float64(v)) => *v == 1.0,
        Some(crate::value::Value::Int64(v)) => *v == 1,
        _ => false,
    }
}

fn error_message(doc: &Document) -> String {
    match get(doc, "errmsg") {
        Some(crate::value::Value::String(s)) => s.clone(),
        _ => "command failed".to_string(),
    }
}

impl Session for MongoWireSession {
    fn configure(&mut self, write_concern: &str, _no_socket_timeout: bool) -> DocplugResult<()> {
        // The reference adapter never sets a client-side socket deadline,
        // relying on the store's own keepalive and the run's cancellation
        // flag instead. The requested write concern is resolved against
        // the node's topology and attached to every subsequent insert/drop.
        let node_type = self.node_type()?;
        self.write_concern = build_write_concern(write_concern, node_type);
        Ok(())
    }

    fn node_type(&mut self) -> DocplugResult<NodeType> {
        let command = self.command_with_db(vec![(
            "hello".to_string(),
            crate::value::Value::Int64(1),
        )]);
        let reply = self.run_command(command)?;
        if !is_ok(&reply) {
            return Err(DocplugError::UnreachableStore(error_message(&reply)));
        }
        if matches!(get(&reply, "msg"), Some(crate::value::Value::String(s)) if s == "isdbgrid") {
            return Ok(NodeType::Mongos);
        }
        if get(&reply, "setName").is_some() {
            return Ok(NodeType::ReplicaSet);
        }
        Ok(NodeType::Standalone)
    }

    fn drop_collection(&mut self) -> DocplugResult<()> {
        let command = self.command_with_db(vec![
            (
                "drop".to_string(),
                crate::value::Value::String(self.namespace.collection.clone()),
            ),
            ("writeConcern".to_string(), self.write_concern.clone()),
        ]);
        let reply = self.run_command(command)?;
        if is_ok(&reply) {
            return Ok(());
        }
        let is_namespace_not_found =
            matches!(get(&reply, "codeName"), Some(crate::value::Value::String(s)) if s == "NamespaceNotFound")
                || error_message(&reply).contains("ns not found");
        if is_namespace_not_found {
            return Ok(());
        }
        Err(DocplugError::UnreachableStore(error_message(&reply)))
    }

    fn bulk_insert(&mut self, documents: &[Document]) -> DocplugResult<()> {
        let docs: Vec<crate::value::Value> = documents
            .iter()
            .cloned()
            .map(crate::value::Value::Document)
            .collect();
        let command = self.command_with_db(vec![
            (
                "insert".to_string(),
                crate::value::Value::String(self.namespace.collection.clone()),
            ),
            ("documents".to_string(), crate::value::Value::Array(docs)),
            ("writeConcern".to_string(), self.write_concern.clone()),
        ]);
        let reply = self.run_command(command)?;
        if !is_ok(&reply) {
            return Err(DocplugError::InsertError(error_message(&reply)));
        }
        if let Some(crate::value::Value::Document(wce)) = get(&reply, "writeConcernError") {
            return Err(DocplugError::WriteConcernInvalid(error_message(wce)));
        }
        if let Some(crate::value::Value::Array(write_errors)) = get(&reply, "writeErrors") {
            if let Some(crate::value::Value::Document(first)) = write_errors.first() {
                return Err(DocplugError::InsertError(error_message(first)));
            }
        }
        Ok(())
    }
}
