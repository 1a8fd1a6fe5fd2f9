use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use sqs_dispatch::{
    Arguments, ConsumerDescriptor, DeleteBatchOutcome, DeleteEntry, DeletePolicy, Dispatcher,
    DispatcherConfig, HandlerError, Message, ParameterSpec, QueueAddress, QueueTransport,
    ReceiveRequest, handler_fn,
};
use tracing_subscriber::EnvFilter;

/// A single in-process queue holding JSON order messages
#[derive(Clone, Default)]
pub struct MemoryQueue {
    messages: Arc<Mutex<VecDeque<Message>>>,
}

impl MemoryQueue {
    pub fn publish(&self, id: usize, body: String) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push_back(Message::new(id.to_string(), format!("receipt_{id}"), body));
        }
    }
}

impl QueueTransport for MemoryQueue {
    type Error = anyhow::Error;

    async fn resolve_queue_address(&self, name: &str) -> Result<QueueAddress, Self::Error> {
        Ok(QueueAddress::new(format!("memory://{name}")))
    }

    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<Message>, Self::Error> {
        let batch: Vec<Message> = {
            let mut messages = self
                .messages
                .lock()
                .map_err(|_| anyhow::anyhow!("queue lock poisoned"))?;
            let count = messages.len().min(request.max_messages as usize);
            messages.drain(..count).collect()
        };

        if batch.is_empty() {
            // stand-in for long polling on an empty queue
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        Ok(batch)
    }

    async fn delete_batch(
        &self,
        _address: &QueueAddress,
        entries: Vec<DeleteEntry>,
    ) -> Result<DeleteBatchOutcome, Self::Error> {
        Ok(DeleteBatchOutcome::all_succeeded(&entries))
    }
}

#[derive(Debug, Deserialize)]
struct Order {
    id: String,
    amount: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_line_number(true)
        .init();

    let queue = MemoryQueue::default();
    for id in 0..20 {
        queue.publish(id, format!(r#"{{"id":"order-{id}","amount":{}}}"#, id * 10));
    }

    let orders = ConsumerDescriptor::builder("orders")
        .concurrency(2)
        .max_messages_per_poll(5)
        .wait_time_seconds(1)
        .delete_policy(DeletePolicy::AfterProcessing)
        .parameter(ParameterSpec::list_of::<Order>())
        .handler(
            "orders::on_orders",
            handler_fn(|mut args: Arguments| async move {
                let orders: Vec<Order> = args.bodies(0)?;
                for order in orders {
                    println!("Processing order {} ({})", order.id, order.amount);
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<(), HandlerError>(())
            }),
        );

    let mut dispatcher = Dispatcher::builder(queue)
        .descriptors([orders])
        .config(DispatcherConfig::from_env())
        .build();

    dispatcher.start().await?;

    tracing::info!("dispatcher running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    dispatcher.stop().await?;

    println!("done");

    Ok(())
}
