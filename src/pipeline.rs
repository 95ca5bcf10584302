//! The bounded producer/consumer ingest pipeline: one producer thread
//! stamps documents into a bounded channel; N insertion worker threads
//! drain it in batches, enforcing both a per-batch document count and a
//! per-batch estimated-wire-size cap, with fail-fast propagation across
//! siblings via a shared cancellation flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, RecvTimeoutError, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::compiler::Plug;
use crate::error::DocplugError;
use crate::stamp::stamp;
use crate::store::{Namespace, Session, Store};
use crate::value::{wire_size, Document};

/// Two 16 MiB BSON documents' worth of estimated wire size.
pub const MAX_MESSAGE_SIZE_BYTES: usize = 2 * 16 * 1024 * 1024;
/// A single document beyond this estimated size triggers a warning.
pub const MAX_DOCUMENT_SIZE_BYTES: usize = 16 * 1024 * 1024;
/// Output channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

const PRODUCER_POLL_INTERVAL: Duration = Duration::from_millis(5);
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for one ingest run, bound together by `Coordinator::run`.
pub struct Coordinator {
    pub plug: Plug,
    /// Target document count. `None` means "run until cancelled".
    pub target: Option<u64>,
    pub num_workers: usize,
    pub channel_capacity: usize,
    pub bulk_buffer_size: usize,
    pub stop_on_error: bool,
    pub write_concern: String,
}

/// The result of one run: a best-effort inserted count and, if the run was
/// cut short, the first error that caused it.
#[derive(Debug)]
pub struct RunOutcome {
    pub inserted: u64,
    pub error: Option<DocplugError>,
}

impl Coordinator {
    /// Spawns the producer and every insertion worker inside one scoped
    /// thread region, waits for all of them, and returns the final counter
    /// and first recorded error.
    pub fn run(self, store: &dyn Store, namespace: &Namespace) -> RunOutcome {
        let (sender, receiver) = sync_channel::<Document>(self.channel_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let cancel = Arc::new(AtomicBool::new(false));
        let insertion_count = Arc::new(Mutex::new(0u64));
        let first_error: Arc<Mutex<Option<DocplugError>>> = Arc::new(Mutex::new(None));

        if self.num_workers == 0 {
            log::debug!("num_insertion_workers was 0; clamping to 1");
        }
        let num_workers = self.num_workers.max(1);
        let bulk_buffer_size = self.bulk_buffer_size.max(1);
        let stop_on_error = self.stop_on_error;
        let write_concern = self.write_concern.clone();
        let target = self.target;
        let plug = self.plug;

        thread::scope(|scope| {
            {
                let cancel = cancel.clone();
                scope.spawn(move || producer_loop(plug, sender, target, cancel));
            }

            for _ in 0..num_workers {
                let receiver = receiver.clone();
                let cancel = cancel.clone();
                let insertion_count = insertion_count.clone();
                let first_error = first_error.clone();
                let write_concern = write_concern.clone();

                scope.spawn(move || {
                    worker_entry(
                        store,
                        namespace,
                        &write_concern,
                        receiver,
                        cancel,
                        insertion_count,
                        bulk_buffer_size,
                        stop_on_error,
                        first_error,
                    );
                });
            }
        });

        let inserted = *insertion_count.lock().expect("insertion count mutex poisoned");
        let error = first_error
            .lock()
            .expect("first error mutex poisoned")
            .clone();
        RunOutcome { inserted, error }
    }
}

fn producer_loop(
    plug: Plug,
    sender: std::sync::mpsc::SyncSender<Document>,
    target: Option<u64>,
    cancel: Arc<AtomicBool>,
) {
    let mut produced: u64 = 0;
    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        if let Some(n) = target {
            if produced >= n {
                break;
            }
        }

        let mut doc = stamp(&plug);
        loop {
            if cancel.load(Ordering::Relaxed) {
                return;
            }
            match sender.try_send(doc) {
                Ok(()) => break,
                Err(TrySendError::Full(returned)) => {
                    doc = returned;
                    thread::sleep(PRODUCER_POLL_INTERVAL);
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
        produced += 1;
    }
    // Dropping `sender` here closes the channel — the sole signal to
    // workers that generation is complete.
}

#[allow(clippy::too_many_arguments)]
fn worker_entry(
    store: &dyn Store,
    namespace: &Namespace,
    write_concern: &str,
    receiver: Arc<Mutex<std::sync::mpsc::Receiver<Document>>>,
    cancel: Arc<AtomicBool>,
    insertion_count: Arc<Mutex<u64>>,
    bulk_buffer_size: usize,
    stop_on_error: bool,
    first_error: Arc<Mutex<Option<DocplugError>>>,
) {
    let mut session = match store.open_session(namespace) {
        Ok(session) => session,
        Err(e) => {
            record_fatal_error(&cancel, &first_error, e);
            return;
        }
    };

    if let Err(e) = session.configure(write_concern, true) {
        record_fatal_error(&cancel, &first_error, e);
        return;
    }

    worker_loop(
        session.as_mut(),
        receiver,
        cancel,
        insertion_count,
        bulk_buffer_size,
        stop_on_error,
        first_error,
    );
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    session: &mut dyn Session,
    receiver: Arc<Mutex<std::sync::mpsc::Receiver<Document>>>,
    cancel: Arc<AtomicBool>,
    insertion_count: Arc<Mutex<u64>>,
    bulk_buffer_size: usize,
    stop_on_error: bool,
    first_error: Arc<Mutex<Option<DocplugError>>>,
) {
    let mut batch: Vec<Document> = Vec::with_capacity(bulk_buffer_size);
    let mut batch_wire_size: usize = 0;

    loop {
        if cancel.load(Ordering::Relaxed) {
            // Pending batch is discarded, not flushed, on cancellation.
            return;
        }

        let next = {
            let rx = receiver.lock().expect("channel receiver mutex poisoned");
            rx.recv_timeout(WORKER_POLL_INTERVAL)
        };

        match next {
            Ok(document) => {
                let doc_size = wire_size(&document);
                if doc_size > MAX_DOCUMENT_SIZE_BYTES {
                    log::warn!(
                        "document estimated wire size {} exceeds {} bytes; inserting anyway",
                        doc_size,
                        MAX_DOCUMENT_SIZE_BYTES
                    );
                }
                batch.push(document);
                batch_wire_size += doc_size;

                if batch.len() >= bulk_buffer_size || batch_wire_size >= MAX_MESSAGE_SIZE_BYTES {
                    if flush(
                        session,
                        &mut batch,
                        &mut batch_wire_size,
                        &insertion_count,
                        stop_on_error,
                        &cancel,
                        &first_error,
                    )
                    .is_err()
                    {
                        return;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Channel closed cleanly: flush whatever is left regardless of
    // threshold.
    if !batch.is_empty() {
        let _ = flush(
            session,
            &mut batch,
            &mut batch_wire_size,
            &insertion_count,
            stop_on_error,
            &cancel,
            &first_error,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn flush(
    session: &mut dyn Session,
    batch: &mut Vec<Document>,
    batch_wire_size: &mut usize,
    insertion_count: &Arc<Mutex<u64>>,
    stop_on_error: bool,
    cancel: &Arc<AtomicBool>,
    first_error: &Arc<Mutex<Option<DocplugError>>>,
) -> Result<(), ()> {
    let result = session.bulk_insert(batch);
    let inserted_len = batch.len() as u64;
    batch.clear();
    *batch_wire_size = 0;

    match result {
        Ok(()) => {
            *insertion_count.lock().expect("insertion count mutex poisoned") += inserted_len;
            Ok(())
        }
        Err(e) => match filter_ingest_error(e, stop_on_error) {
            Some(propagated) => {
                record_fatal_error(cancel, first_error, propagated);
                Err(())
            }
            None => Ok(()),
        },
    }
}

fn record_fatal_error(
    cancel: &Arc<AtomicBool>,
    first_error: &Arc<Mutex<Option<DocplugError>>>,
    error: DocplugError,
) {
    log::error!("{}", error);
    cancel.store(true, Ordering::Relaxed);
    let mut slot = first_error.lock().expect("first error mutex poisoned");
    if slot.is_none() {
        *slot = Some(error);
    }
}

/// The error filter workers run before returning: `UnreachableStore` and
/// `LostConnection` always propagate, `WriteConcernInvalid` is always
/// swallowed, and any other error propagates only when `stop_on_error` is
/// set.
fn filter_ingest_error(e: DocplugError, stop_on_error: bool) -> Option<DocplugError> {
    match e {
        DocplugError::UnreachableStore(_) | DocplugError::LostConnection(_) => Some(e),
        DocplugError::WriteConcernInvalid(_) => {
            log::warn!("{}", e);
            None
        }
        other => {
            log::warn!("{}", other);
            if stop_on_error {
                Some(other)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::store::mock::{InjectedFailure, MockStore};

    fn run_with(template: &str, target: u64, workers: usize, bulk: usize) -> (RunOutcome, MockStore) {
        let plug = compile(template).unwrap();
        let store = MockStore::new();
        let namespace = Namespace::new("db", "coll");
        let coordinator = Coordinator {
            plug,
            target: Some(target),
            num_workers: workers,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            bulk_buffer_size: bulk,
            stop_on_error: false,
            write_concern: "majority".to_string(),
        };
        let outcome = coordinator.run(&store, &namespace);
        (outcome, store)
    }

    #[test]
    fn inserts_exactly_target_count_with_one_worker() {
        let (outcome, store) = run_with(
            r#"{"x":{"generator_func":"RandomInt","min":5,"max":10}}"#,
            100,
            1,
            16,
        );
        assert!(outcome.error.is_none());
        assert_eq!(outcome.inserted, 100);
        assert_eq!(store.inserted_count(), 100);
        for doc in store.inserted_documents() {
            match &doc[0].1 {
                crate::value::Value::Int64(v) => assert!((5..10).contains(v)),
                other => panic!("unexpected value: {:?}", other),
            }
        }
    }

    #[test]
    fn sequence_emits_strictly_increasing_values_in_producer_order() {
        let (outcome, store) = run_with(
            r#"{"s":{"generator_func":"Sequence","start":0,"step":2}}"#,
            4,
            1,
            16,
        );
        assert!(outcome.error.is_none());
        let values: Vec<f64> = store
            .inserted_documents()
            .into_iter()
            .map(|doc| match doc[0].1 {
                crate::value::Value::Float64(f) => f,
                _ => panic!("expected float"),
            })
            .collect();
        assert_eq!(values, vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn zero_target_inserts_nothing() {
        let (outcome, store) = run_with(r#"{"x":1}"#, 0, 1, 16);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.inserted, 0);
        assert_eq!(store.inserted_count(), 0);
    }

    #[test]
    fn lost_connection_cancels_run_and_propagates() {
        let plug = compile(r#"{"x":1}"#).unwrap();
        let store = MockStore::with_failure(InjectedFailure {
            on_call: 2,
            error: DocplugError::LostConnection("simulated drop".into()),
        });
        let namespace = Namespace::new("db", "coll");
        let coordinator = Coordinator {
            plug,
            target: Some(10_000),
            num_workers: 4,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            bulk_buffer_size: 1,
            stop_on_error: false,
            write_concern: "majority".to_string(),
        };
        let outcome = coordinator.run(&store, &namespace);
        assert!(matches!(outcome.error, Some(DocplugError::LostConnection(_))));
        assert_eq!(outcome.inserted as usize, store.inserted_count());
    }

    #[test]
    fn non_fatal_insert_error_is_swallowed_without_stop_on_error() {
        let plug = compile(r#"{"x":1}"#).unwrap();
        let store = MockStore::with_failure(InjectedFailure {
            on_call: 1,
            error: DocplugError::InsertError("duplicate key".into()),
        });
        let namespace = Namespace::new("db", "coll");
        let coordinator = Coordinator {
            plug,
            target: Some(3),
            num_workers: 1,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            bulk_buffer_size: 1,
            stop_on_error: false,
            write_concern: "majority".to_string(),
        };
        let outcome = coordinator.run(&store, &namespace);
        assert!(outcome.error.is_none());
        // First batch's error was swallowed; the other two still land.
        assert_eq!(outcome.inserted, 2);
    }
}
