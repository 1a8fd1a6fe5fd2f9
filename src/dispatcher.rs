//! This module contains the configuration and implementation of the dispatcher

use std::{fmt, sync::Arc, time::Duration};

use crate::descriptor::DEFAULT_MAX_LONG_POLLING_IN_SECONDS;
use crate::error::DispatchError;
use crate::validation::RuleBasedValidator;
use crate::{
    BodyDeserializer, ConsumerDescriptor, DescriptorProvider, ParameterBinder, PollWorker,
    QueueTransport, ReceiveRequestFactory, StaticDescriptorProvider, WorkerId, WorkerPool,
    WorkerState,
};

const SHUTDOWN_TIMEOUT_ENV: &str = "SQS_DISPATCH_SHUTDOWN_TIMEOUT_SECS";
const HEARTBEAT_ENV: &str = "SQS_DISPATCH_HEARTBEAT_SECS";

/// Configuration for the dispatcher
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// How long [`Dispatcher::stop`] waits for workers to exit
    ///
    /// A worker only observes the stop signal once its current receive call returns, so this
    /// matches the longest allowed long polling wait.
    /// Default: 20 seconds
    pub shutdown_timeout: Duration,
    /// Heartbeat interval for worker health logging
    ///
    /// Workers log a "heartbeat" message at this interval to indicate they are still
    /// running and processing messages.
    /// Default: 60 seconds
    pub heartbeat_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(DEFAULT_MAX_LONG_POLLING_IN_SECONDS as u64),
            heartbeat_interval: Duration::from_secs(60), // 1 minute
        }
    }
}

impl DispatcherConfig {
    /// Defaults overridden by `SQS_DISPATCH_SHUTDOWN_TIMEOUT_SECS` and
    /// `SQS_DISPATCH_HEARTBEAT_SECS` when they hold a number of seconds
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`DispatcherConfig::from_env`], reading variables through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            shutdown_timeout: seconds(&lookup, SHUTDOWN_TIMEOUT_ENV)
                .unwrap_or(defaults.shutdown_timeout),
            heartbeat_interval: seconds(&lookup, HEARTBEAT_ENV)
                .unwrap_or(defaults.heartbeat_interval),
        }
    }

    /// Set the shutdown timeout (builder pattern)
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the heartbeat interval (builder pattern)
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(seconds) => Some(Duration::from_secs(seconds)),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "ignoring invalid duration");
            None
        }
    }
}

/// Runs every registered consumer on its own pool of poll workers.
///
/// [`Dispatcher::start`] collects the descriptors, validates all of them, resolves every
/// queue address and only then spawns `concurrency` workers per consumer. Any failure before
/// the spawn step aborts startup with no worker running.
///
/// # Examples
///
/// ```rust
/// # use sqs_dispatch::*;
/// # async fn example<T: QueueTransport + Send + Sync + 'static>(transport: T) -> Result<(), DispatchError> {
/// let orders = ConsumerDescriptor::builder("orders")
///     .concurrency(2)
///     .parameter(ParameterSpec::body::<String>())
///     .handler("orders::print", handler_fn(|mut args: Arguments| async move {
///         println!("{}", args.body::<String>(0)?);
///         Ok::<(), HandlerError>(())
///     }));
///
/// let mut dispatcher = Dispatcher::builder(transport)
///     .descriptors([orders])
///     .config(DispatcherConfig::default().with_shutdown_timeout(std::time::Duration::from_secs(5)))
///     .build();
///
/// dispatcher.start().await?;
/// // ...
/// dispatcher.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct Dispatcher<T> {
    transport: Arc<T>,
    provider: Arc<dyn DescriptorProvider>,
    validator: RuleBasedValidator,
    binder: ParameterBinder,
    config: DispatcherConfig,
    pool: Option<WorkerPool>,
}

impl<T> Dispatcher<T>
where
    T: QueueTransport + Send + Sync + 'static,
{
    pub fn builder(transport: T) -> DispatcherBuilder<T> {
        DispatcherBuilder {
            transport: Arc::new(transport),
            provider: None,
            validator: None,
            binder: None,
            config: DispatcherConfig::default(),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Whether workers were started and not yet told to stop
    pub fn is_running(&self) -> bool {
        self.pool.as_ref().is_some_and(|pool| !pool.token().is_cancelled())
    }

    /// Validate every consumer, resolve their queues and spawn their workers
    ///
    /// Rejected with [`DispatchError::AlreadyStarted`] while running, and after a stop that
    /// timed out until every worker of that run has exited.
    pub async fn start(&mut self) -> Result<(), DispatchError> {
        if self.is_running() || self.pool.as_ref().is_some_and(WorkerPool::has_live_workers) {
            return Err(DispatchError::AlreadyStarted);
        }

        let descriptors = self.provider.descriptors();
        tracing::info!(consumer_count = descriptors.len(), "starting dispatcher");

        self.validator.validate(&descriptors)?;

        if descriptors.is_empty() {
            tracing::info!("no consumer registered, no worker started");
            return Ok(());
        }

        let factory = ReceiveRequestFactory::new(Arc::clone(&self.transport));
        let mut requests = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            requests.push(Arc::new(factory.create_for(descriptor).await?));
        }

        let mut pool = WorkerPool::for_descriptors(&descriptors);
        tracing::info!(capacity = pool.capacity(), "spawning worker pool");

        for (descriptor, request) in descriptors.iter().zip(requests) {
            for index in 0..worker_count(descriptor) {
                let id = WorkerId {
                    queue: descriptor.queue_name().to_owned(),
                    index,
                };
                let worker = PollWorker::new(
                    id,
                    descriptor.clone(),
                    Arc::clone(&request),
                    Arc::clone(&self.transport),
                    self.binder.clone(),
                    pool.token(),
                )
                .with_heartbeat_interval(self.config.heartbeat_interval);

                pool.submit(worker);
            }
        }

        tracing::info!(worker_count = pool.len(), "dispatcher started successfully");
        self.pool = Some(pool);

        Ok(())
    }

    /// Signal every worker to stop and wait for them up to the shutdown timeout
    ///
    /// Calling it on a dispatcher that is not running does nothing.
    pub async fn stop(&mut self) -> Result<(), DispatchError> {
        match self.pool.as_mut() {
            Some(pool) => pool.shutdown(self.config.shutdown_timeout).await,
            None => Ok(()),
        }
    }

    /// State of every worker of the last start, in spawn order
    pub fn worker_states(&self) -> Vec<(WorkerId, WorkerState)> {
        self.pool
            .as_ref()
            .map(WorkerPool::states)
            .unwrap_or_default()
    }
}

impl<T> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("validator", &self.validator)
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

fn worker_count(descriptor: &ConsumerDescriptor) -> usize {
    usize::try_from(descriptor.config().concurrency).unwrap_or(0)
}

/// Builder for [`Dispatcher`]
pub struct DispatcherBuilder<T> {
    transport: Arc<T>,
    provider: Option<Arc<dyn DescriptorProvider>>,
    validator: Option<RuleBasedValidator>,
    binder: Option<ParameterBinder>,
    config: DispatcherConfig,
}

impl<T> DispatcherBuilder<T>
where
    T: QueueTransport + Send + Sync + 'static,
{
    /// Use a custom descriptor provider
    pub fn provider(mut self, provider: impl DescriptorProvider + 'static) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    /// Register a fixed set of consumers
    pub fn descriptors(mut self, descriptors: impl IntoIterator<Item = ConsumerDescriptor>) -> Self {
        self.provider = Some(Arc::new(StaticDescriptorProvider::of_descriptors(descriptors)));
        self
    }

    /// Replace the default rule set
    pub fn validator(mut self, validator: RuleBasedValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Replace the JSON body deserializer
    pub fn deserializer(mut self, deserializer: impl BodyDeserializer + 'static) -> Self {
        self.binder = Some(ParameterBinder::new(Arc::new(deserializer)));
        self
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Dispatcher<T> {
        Dispatcher {
            transport: self.transport,
            provider: self
                .provider
                .unwrap_or_else(|| Arc::new(StaticDescriptorProvider::of_descriptors([]))),
            validator: self.validator.unwrap_or_default(),
            binder: self.binder.unwrap_or_default(),
            config: self.config,
            pool: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_waits_for_the_longest_poll() {
        let config = DispatcherConfig::default();

        assert_eq!(config.shutdown_timeout, Duration::from_secs(20));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(60));
    }

    #[test]
    fn config_builder_overrides_defaults() {
        let config = DispatcherConfig::default()
            .with_shutdown_timeout(Duration::from_secs(3))
            .with_heartbeat_interval(Duration::from_secs(9));

        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(9));
    }

    fn vars(pairs: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let pairs = pairs.to_vec();
        move |key: &str| {
            pairs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn env_config_reads_seconds() {
        let config = DispatcherConfig::from_lookup(vars(&[
            (SHUTDOWN_TIMEOUT_ENV, "5"),
            (HEARTBEAT_ENV, " 30 "),
        ]));

        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn env_config_ignores_unparseable_values() {
        let config = DispatcherConfig::from_lookup(vars(&[(HEARTBEAT_ENV, "soon")]));

        assert_eq!(config, DispatcherConfig::default());
    }
}
