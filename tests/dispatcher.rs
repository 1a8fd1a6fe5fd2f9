mod common;

use std::time::Duration;

use serde::Deserialize;
use sqs_dispatch::{
    Arguments, ConsumerDescriptor, DispatchError, Dispatcher, DispatcherConfig, HandlerError,
    ParameterSpec, WorkerState, handler_fn,
};

use common::{Call, FakeQueue, message};

#[derive(Debug, Deserialize)]
struct Order {
    id: String,
}

fn consumer(queue: &FakeQueue, name: &str, concurrency: i32) -> ConsumerDescriptor {
    let log = queue.clone();
    ConsumerDescriptor::builder(name)
        .concurrency(concurrency)
        .parameter(ParameterSpec::of::<Order>())
        .handler(
            "tests::record",
            handler_fn(move |mut args: Arguments| {
                let log = log.clone();
                async move {
                    let order: Order = args.body(0)?;
                    log.record(Call::Handler(order.id));
                    Ok::<(), HandlerError>(())
                }
            }),
        )
}

fn fast_config() -> DispatcherConfig {
    DispatcherConfig::default().with_shutdown_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn one_worker_per_concurrency_unit() {
    common::init_tracing();
    let queue = FakeQueue::new();
    let mut dispatcher = Dispatcher::builder(queue.clone())
        .descriptors([consumer(&queue, "orders", 2), consumer(&queue, "refunds", 3)])
        .config(fast_config())
        .build();

    dispatcher.start().await.unwrap();

    let states = dispatcher.worker_states();
    assert_eq!(states.len(), 5);
    assert_eq!(states.iter().filter(|(id, _)| id.queue == "orders").count(), 2);
    assert_eq!(states.iter().filter(|(id, _)| id.queue == "refunds").count(), 3);
    assert!(dispatcher.is_running());

    dispatcher.stop().await.unwrap();

    assert!(
        dispatcher
            .worker_states()
            .iter()
            .all(|(_, state)| *state == WorkerState::Stopped)
    );
}

#[tokio::test]
async fn dispatched_messages_reach_the_handler_and_are_deleted() {
    let queue = FakeQueue::new();
    queue.push_batch("orders", vec![message("m1", r#"{"id":"42"}"#)]);
    let mut dispatcher = Dispatcher::builder(queue.clone())
        .descriptors([consumer(&queue, "orders", 1)])
        .config(fast_config())
        .build();

    dispatcher.start().await.unwrap();
    let deleted = queue
        .wait_for(Duration::from_secs(2), |calls| {
            calls.iter().any(|call| matches!(call, Call::Delete(..)))
        })
        .await;
    dispatcher.stop().await.unwrap();

    assert!(deleted);
    assert_eq!(queue.handler_calls(), vec!["42"]);
    assert_eq!(queue.delete_calls(), vec![vec!["m1".to_string()]]);
}

#[tokio::test]
async fn invalid_consumers_start_no_worker() {
    let queue = FakeQueue::new();
    let mut dispatcher = Dispatcher::builder(queue.clone())
        .descriptors([
            consumer(&queue, "orders", 0),
            consumer(&queue, "refunds", 1),
        ])
        .build();

    let err = dispatcher.start().await.unwrap_err();

    let DispatchError::Validation(validation) = &err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert_eq!(
        validation.messages,
        vec!["The number of concurrent consumers must be greater than 0. Queue=orders"]
    );
    assert!(dispatcher.worker_states().is_empty());
    assert!(queue.calls().is_empty());
}

#[tokio::test]
async fn unknown_queue_aborts_before_any_worker_starts() {
    let queue = FakeQueue::new();
    queue.unknown_queue("refunds");
    let mut dispatcher = Dispatcher::builder(queue.clone())
        .descriptors([consumer(&queue, "orders", 2), consumer(&queue, "refunds", 1)])
        .build();

    let err = dispatcher.start().await.unwrap_err();

    assert!(matches!(
        err,
        DispatchError::QueueResolution { ref queue, .. } if queue == "refunds"
    ));
    assert!(dispatcher.worker_states().is_empty());
    assert!(!dispatcher.is_running());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(queue.receive_count(), 0);
}

#[tokio::test]
async fn start_is_rejected_while_running() {
    let queue = FakeQueue::new();
    let mut dispatcher = Dispatcher::builder(queue.clone())
        .descriptors([consumer(&queue, "orders", 1)])
        .config(fast_config())
        .build();

    dispatcher.start().await.unwrap();
    let err = dispatcher.start().await.unwrap_err();
    dispatcher.stop().await.unwrap();

    assert!(matches!(err, DispatchError::AlreadyStarted));
    assert_eq!(dispatcher.worker_states().len(), 1);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let queue = FakeQueue::new();
    let mut dispatcher = Dispatcher::builder(queue.clone())
        .descriptors([consumer(&queue, "orders", 2)])
        .config(fast_config())
        .build();

    dispatcher.stop().await.unwrap();
    dispatcher.start().await.unwrap();
    dispatcher.stop().await.unwrap();
    dispatcher.stop().await.unwrap();

    assert!(!dispatcher.is_running());
}

#[tokio::test]
async fn no_consumers_is_a_valid_start() {
    let queue = FakeQueue::new();
    let mut dispatcher = Dispatcher::builder(queue.clone()).build();

    dispatcher.start().await.unwrap();

    assert!(dispatcher.worker_states().is_empty());
    dispatcher.stop().await.unwrap();
}

/// Handler that records its start, then sleeps far past any grace period
fn slow_consumer(queue: &FakeQueue) -> ConsumerDescriptor {
    queue.push_batch("slow", vec![message("m1", r#""payload""#)]);
    let log = queue.clone();
    ConsumerDescriptor::builder("slow")
        .parameter(ParameterSpec::body::<String>())
        .handler(
            "tests::sleep",
            handler_fn(move |_args: Arguments| {
                let log = log.clone();
                async move {
                    log.record(Call::Handler("started".into()));
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok::<(), HandlerError>(())
                }
            }),
        )
}

async fn start_slow(queue: &FakeQueue) -> Dispatcher<FakeQueue> {
    let mut dispatcher = Dispatcher::builder(queue.clone())
        .descriptors([slow_consumer(queue)])
        .config(DispatcherConfig::default().with_shutdown_timeout(Duration::from_millis(50)))
        .build();

    dispatcher.start().await.unwrap();
    assert!(
        queue
            .wait_for(Duration::from_secs(2), |calls| {
                calls.contains(&Call::Handler("started".into()))
            })
            .await
    );
    dispatcher
}

#[tokio::test]
async fn slow_handler_outlives_the_grace_period() {
    let queue = FakeQueue::new();
    let mut dispatcher = start_slow(&queue).await;

    let err = dispatcher.stop().await.unwrap_err();

    let DispatchError::ShutdownTimeout { pending, .. } = &err else {
        panic!("expected a shutdown timeout, got {err:?}");
    };
    assert_eq!(pending, &vec!["slow#0".to_string()]);
    assert_eq!(
        dispatcher.worker_states()[0].1,
        WorkerState::Stopping
    );
}

#[tokio::test]
async fn restart_is_rejected_while_workers_of_a_timed_out_stop_remain() {
    let queue = FakeQueue::new();
    let mut dispatcher = start_slow(&queue).await;
    assert!(dispatcher.stop().await.is_err());
    assert!(!dispatcher.is_running());

    let err = dispatcher.start().await.unwrap_err();

    assert!(matches!(err, DispatchError::AlreadyStarted));
    assert_eq!(dispatcher.worker_states().len(), 1);
    assert_eq!(
        queue
            .calls()
            .iter()
            .filter(|call| matches!(call, Call::Resolve(_)))
            .count(),
        1
    );
}
