#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqs_dispatch::{
    ConsumerDescriptor, DeleteBatchOutcome, DeleteEntry, FailedDelete, Message, ParameterBinder,
    PollWorker, QueueAddress, QueueTransport, ReceiveRequest, ReceiveRequestFactory, WorkerId,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};

/// ---- Fakes -----

/// Everything the fake queue and the test handlers saw, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Resolve(String),
    Receive(String),
    Delete(String, Vec<String>),
    Handler(String),
}

#[derive(Default)]
struct Inner {
    // queue name -> scripted receive results
    scripted: Mutex<HashMap<String, VecDeque<Result<Vec<Message>, String>>>>,
    calls: Mutex<Vec<Call>>,
    failing_deletes: Mutex<HashSet<String>>,
    unknown_queues: Mutex<HashSet<String>>,
    // queue name -> gate the next receive waits on
    gates: Mutex<HashMap<String, Arc<Notify>>>,
}

/// In-memory queue: scripted receives, recorded calls, configurable failures.
///
/// A receive with nothing scripted waits briefly and returns an empty batch, like a short
/// long-poll on an idle queue.
#[derive(Clone, Default)]
pub struct FakeQueue {
    inner: Arc<Inner>,
}

impl FakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&self, queue: &str, messages: Vec<Message>) {
        self.push(queue, Ok(messages));
    }

    pub fn push_receive_error(&self, queue: &str, reason: &str) {
        self.push(queue, Err(reason.to_string()));
    }

    fn push(&self, queue: &str, result: Result<Vec<Message>, String>) {
        self.inner
            .scripted
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_default()
            .push_back(result);
    }

    /// The next deletes of this message id are reported as failed entries
    pub fn fail_delete_of(&self, id: &str) {
        self.inner.failing_deletes.lock().unwrap().insert(id.to_string());
    }

    /// The next receive on `queue` is recorded, then blocks until the returned gate is
    /// notified
    pub fn hold_next_receive(&self, queue: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.inner
            .gates
            .lock()
            .unwrap()
            .insert(queue.to_string(), Arc::clone(&gate));
        gate
    }

    pub fn unknown_queue(&self, name: &str) {
        self.inner.unknown_queues.lock().unwrap().insert(name.to_string());
    }

    /// Handlers use this to show up in the call log
    pub fn record(&self, call: Call) {
        self.inner.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn handler_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Handler(seen) => Some(seen),
                _ => None,
            })
            .collect()
    }

    pub fn delete_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete(_, ids) => Some(ids),
                _ => None,
            })
            .collect()
    }

    pub fn receive_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Receive(_)))
            .count()
    }

    /// Wait until `predicate` holds on the call log, up to `timeout`
    pub async fn wait_for(&self, timeout: Duration, predicate: impl Fn(&[Call]) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if predicate(&self.calls()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        predicate(&self.calls())
    }
}

fn queue_name(address: &QueueAddress) -> String {
    address
        .as_str()
        .trim_start_matches("memory://")
        .to_string()
}

impl QueueTransport for FakeQueue {
    type Error = String;

    async fn resolve_queue_address(&self, name: &str) -> Result<QueueAddress, Self::Error> {
        self.record(Call::Resolve(name.to_string()));
        if self.inner.unknown_queues.lock().unwrap().contains(name) {
            return Err(format!("queue {name} does not exist"));
        }
        Ok(QueueAddress::new(format!("memory://{name}")))
    }

    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<Message>, Self::Error> {
        let queue = queue_name(&request.address);
        self.record(Call::Receive(queue.clone()));

        let gate = self.inner.gates.lock().unwrap().remove(&queue);
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let next = self
            .inner
            .scripted
            .lock()
            .unwrap()
            .get_mut(&queue)
            .and_then(VecDeque::pop_front);

        match next {
            Some(result) => result,
            None => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn delete_batch(
        &self,
        address: &QueueAddress,
        entries: Vec<DeleteEntry>,
    ) -> Result<DeleteBatchOutcome, Self::Error> {
        self.record(Call::Delete(
            queue_name(address),
            entries.iter().map(|e| e.id.clone()).collect(),
        ));

        let failing = self.inner.failing_deletes.lock().unwrap().clone();
        let (failed, succeeded): (Vec<_>, Vec<_>) =
            entries.into_iter().partition(|e| failing.contains(&e.id));

        Ok(DeleteBatchOutcome {
            succeeded: succeeded.into_iter().map(|e| e.id).collect(),
            failed: failed
                .into_iter()
                .map(|e| FailedDelete {
                    id: e.id,
                    code: "ReceiptHandleIsInvalid".to_string(),
                    reason: "receipt handle expired".to_string(),
                })
                .collect(),
        })
    }
}

/// Collects every event emitted while installed, as `level` and `field=value` text
#[derive(Clone, Default)]
pub struct CapturedEvents {
    events: Arc<Mutex<Vec<(tracing::Level, String)>>>,
}

impl CapturedEvents {
    /// Install on the current thread until the guard drops
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let events = Self::default();
        let subscriber = tracing_subscriber::registry().with(events.clone());
        (events, tracing::subscriber::set_default(subscriber))
    }

    /// Fields of every event at `level` whose message is `message`
    pub fn find(&self, level: tracing::Level, message: &str) -> Vec<String> {
        let needle = format!("message={message} ");
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(seen, fields)| *seen == level && fields.contains(&needle))
            .map(|(_, fields)| fields.clone())
            .collect()
    }
}

struct FieldText(String);

impl Visit for FieldText {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let _ = write!(self.0, "{}={:?} ", field.name(), value);
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CapturedEvents {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = FieldText(String::new());
        event.record(&mut fields);
        self.events
            .lock()
            .unwrap()
            .push((*event.metadata().level(), fields.0));
    }
}

/// ---- Helpers -----

pub fn message(id: &str, body: &str) -> Message {
    Message::new(id, format!("rh-{id}"), body)
}

pub async fn worker_for(
    queue: &FakeQueue,
    descriptor: ConsumerDescriptor,
    token: CancellationToken,
) -> PollWorker<FakeQueue> {
    let transport = Arc::new(queue.clone());
    let request = ReceiveRequestFactory::new(Arc::clone(&transport))
        .create_for(&descriptor)
        .await
        .expect("queue resolves");

    PollWorker::new(
        WorkerId {
            queue: descriptor.queue_name().to_string(),
            index: 0,
        },
        descriptor,
        Arc::new(request),
        transport,
        ParameterBinder::default(),
        token,
    )
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
