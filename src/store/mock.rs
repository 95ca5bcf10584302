//! `MockStore`: an in-memory `Store`/`Session` adapter backed by a
//! mutex-guarded `Vec<Document>`, used by this crate's own test suite.
//! Supports injecting a simulated failure on the Nth bulk insert so the
//! cancellation/fail-fast path is testable without a live database.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{DocplugError, DocplugResult};
use crate::value::Document;

use super::{Namespace, NodeType, Session, Store};

/// A failure to inject on a specific 1-indexed bulk-insert call.
#[derive(Debug, Clone)]
pub struct InjectedFailure {
    pub on_call: usize,
    pub error: DocplugError,
}

#[derive(Debug, Default)]
pub struct MockStore {
    inserted: Arc<Mutex<Vec<Document>>>,
    bulk_insert_calls: Arc<AtomicUsize>,
    failure: Option<InjectedFailure>,
}

impl MockStore {
    pub fn new() -> Self {
        MockStore::default()
    }

    pub fn with_failure(failure: InjectedFailure) -> Self {
        MockStore {
            failure: Some(failure),
            ..MockStore::default()
        }
    }

    pub fn inserted_documents(&self) -> Vec<Document> {
        self.inserted.lock().expect("mock store mutex poisoned").clone()
    }

    pub fn inserted_count(&self) -> usize {
        self.inserted_documents().len()
    }
}

impl Store for MockStore {
    fn open_session(&self, _namespace: &Namespace) -> DocplugResult<Box<dyn Session>> {
        Ok(Box::new(MockSession {
            inserted: self.inserted.clone(),
            bulk_insert_calls: self.bulk_insert_calls.clone(),
            failure: self.failure.clone(),
        }))
    }
}

struct MockSession {
    inserted: Arc<Mutex<Vec<Document>>>,
    bulk_insert_calls: Arc<AtomicUsize>,
    failure: Option<InjectedFailure>,
}

impl Session for MockSession {
    fn configure(&mut self, _write_concern: &str, _no_socket_timeout: bool) -> DocplugResult<()> {
        Ok(())
    }

    fn node_type(&mut self) -> DocplugResult<NodeType> {
        Ok(NodeType::Standalone)
    }

    fn drop_collection(&mut self) -> DocplugResult<()> {
        self.inserted.lock().expect("mock store mutex poisoned").clear();
        Ok(())
    }

    fn bulk_insert(&mut self, documents: &[Document]) -> DocplugResult<()> {
        let call = self.bulk_insert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(failure) = &self.failure {
            if failure.on_call == call {
                return Err(failure.error.clone());
            }
        }
        self.inserted
            .lock()
            .expect("mock store mutex poisoned")
            .extend_from_slice(documents);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn records_inserted_documents() {
        let store = MockStore::new();
        let ns = Namespace::new("db", "coll");
        let mut session = store.open_session(&ns).unwrap();
        let docs = vec![vec![("x".to_string(), Value::Int64(1))]];
        session.bulk_insert(&docs).unwrap();
        assert_eq!(store.inserted_count(), 1);
    }

    #[test]
    fn injects_failure_on_configured_call() {
        let store = MockStore::with_failure(InjectedFailure {
            on_call: 2,
            error: DocplugError::LostConnection("simulated drop".into()),
        });
        let ns = Namespace::new("db", "coll");
        let mut session = store.open_session(&ns).unwrap();
        let docs = vec![vec![("x".to_string(), Value::Int64(1))]];
        assert!(session.bulk_insert(&docs).is_ok());
        assert!(matches!(
            session.bulk_insert(&docs),
            Err(DocplugError::LostConnection(_))
        ));
        assert_eq!(store.inserted_count(), 1);
    }
}
