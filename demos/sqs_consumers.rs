use std::time::Duration;

use anyhow::Context;
use sqs_dispatch::{
    Arguments, ConsumerDescriptor, DeletePolicy, Dispatcher, DispatcherConfig, HandlerError,
    ParameterSpec, SqsTransport, handler_fn,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_line_number(true)
        .init();

    let queue_name = std::env::var("SQS_QUEUE_NAME").context("SQS_QUEUE_NAME is not set")?;
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region("us-east-1");
    if let Ok(endpoint) = std::env::var("SQS_ENDPOINT_URL") {
        loader = loader.endpoint_url(endpoint);
    }
    let aws_config = loader.load().await;

    let transport = SqsTransport::new(aws_sdk_sqs::Client::new(&aws_config));

    tracing::info!("initialized sqs transport");

    // the body holds the number of seconds to sleep, the tenant comes from an attribute
    let sleeper = ConsumerDescriptor::builder(queue_name)
        .concurrency(3)
        .wait_time_seconds(20)
        .delete_policy(DeletePolicy::AfterProcessing)
        .parameter(ParameterSpec::attribute("tenant"))
        .parameter(ParameterSpec::body::<u64>())
        .handler(
            "demo::sleep",
            handler_fn(|mut args: Arguments| async move {
                let tenant = args.attribute(0)?.unwrap_or("unknown").to_owned();
                let wait_time: u64 = args.body(1)?;
                println!("Processing message for {tenant}: sleeping {wait_time}s");
                tokio::time::sleep(Duration::from_secs(wait_time)).await;
                println!("Done processing message for {tenant}");
                Ok::<(), HandlerError>(())
            }),
        );

    let mut dispatcher = Dispatcher::builder(transport)
        .descriptors([sleeper])
        .config(DispatcherConfig::from_env().with_heartbeat_interval(Duration::from_secs(30)))
        .build();

    dispatcher.start().await?;

    tokio::signal::ctrl_c().await?;

    dispatcher.stop().await?;

    println!("done");

    Ok(())
}
