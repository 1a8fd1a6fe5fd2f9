//! This module provides where consumer descriptors come from.

use std::sync::Arc;

use crate::ConsumerDescriptor;

/// Supplies the descriptor set once, at dispatcher startup.
pub trait DescriptorProvider: Send + Sync {
    fn descriptors(&self) -> Vec<ConsumerDescriptor>;
}

/// A component that owns zero or more consumers.
///
/// This is the registration surface for application objects: instead of being scanned
/// for annotated methods, an object lists the consumers it exposes. Handlers usually
/// capture a clone of the `Arc` so they can reach the object's state.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use sqs_dispatch::{Arguments, ConsumerDescriptor, ConsumerSource, HandlerError, ParameterSpec, handler_fn};
///
/// struct Billing {
///     currency: String,
/// }
///
/// impl ConsumerSource for Billing {
///     fn consumers(self: Arc<Self>) -> Vec<ConsumerDescriptor> {
///         let billing = Arc::clone(&self);
///         vec![ConsumerDescriptor::builder("invoices")
///             .parameter(ParameterSpec::of::<String>())
///             .handler("billing::on_invoice", handler_fn(move |mut args: Arguments| {
///                 let billing = Arc::clone(&billing);
///                 async move {
///                     let invoice: String = args.body(0)?;
///                     println!("{invoice} in {}", billing.currency);
///                     Ok::<(), HandlerError>(())
///                 }
///             }))]
///     }
/// }
/// ```
pub trait ConsumerSource: Send + Sync + 'static {
    fn consumers(self: Arc<Self>) -> Vec<ConsumerDescriptor>;
}

/// A provider over a fixed descriptor set
#[derive(Debug, Clone, Default)]
pub struct StaticDescriptorProvider {
    descriptors: Vec<ConsumerDescriptor>,
}

impl StaticDescriptorProvider {
    /// Use an already built descriptor set
    pub fn of_descriptors(descriptors: impl IntoIterator<Item = ConsumerDescriptor>) -> Self {
        Self {
            descriptors: descriptors.into_iter().collect(),
        }
    }

    /// Collect the consumers of every candidate source, in source order
    pub fn of_sources(sources: impl IntoIterator<Item = Arc<dyn ConsumerSource>>) -> Self {
        let descriptors = sources
            .into_iter()
            .flat_map(|source| source.consumers())
            .collect::<Vec<_>>();

        tracing::debug!(consumer_count = descriptors.len(), "collected consumers from sources");

        Self { descriptors }
    }
}

impl DescriptorProvider for StaticDescriptorProvider {
    fn descriptors(&self) -> Vec<ConsumerDescriptor> {
        self.descriptors.clone()
    }
}
