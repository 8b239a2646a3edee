//! Assemble a [`Dispatcher`] from configuration, an audit sink and resources.

use std::fmt;
use std::sync::Arc;

use crate::config::DispatcherConfig;
use crate::core::{AppResult, AuditSink, Dispatcher, Message, Resource, SchedulerError};
use crate::infra::SimulatedResource;

type ResourceFactory<M> = Box<dyn FnMut(usize) -> Arc<dyn Resource<M>>>;

/// Builder for [`Dispatcher`].
///
/// Explicit resources are added first, then `config.initial_resources`
/// resources are produced by the factory. Without a factory those are
/// [`SimulatedResource`]s with the default one-second latency.
///
/// ```rust,ignore
/// let dispatcher = DispatcherBuilder::new(DispatcherConfig::default().with_initial_resources(2))
///     .audit(Arc::new(TracingAuditSink))
///     .resource_factory(|_| Arc::new(SimulatedResource::new(Duration::from_millis(10))))
///     .build()?;
/// ```
pub struct DispatcherBuilder<M: Message> {
    config: DispatcherConfig,
    audit: Option<Arc<dyn AuditSink>>,
    resources: Vec<Arc<dyn Resource<M>>>,
    factory: Option<ResourceFactory<M>>,
}

impl<M: Message> DispatcherBuilder<M> {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            audit: None,
            resources: Vec::new(),
            factory: None,
        }
    }

    /// Start from `SCHEDULER_*` environment variables (and `.env`).
    pub fn from_env() -> AppResult<Self> {
        Ok(Self::new(DispatcherConfig::from_env()?))
    }

    /// Record dispatch decisions to `sink`.
    #[must_use]
    pub fn audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Register `resource` at startup.
    #[must_use]
    pub fn resource(mut self, resource: Arc<dyn Resource<M>>) -> Self {
        self.resources.push(resource);
        self
    }

    /// Register every resource in `resources` at startup.
    #[must_use]
    pub fn resources<I>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Resource<M>>>,
    {
        self.resources.extend(resources);
        self
    }

    /// Produce the `initial_resources` startup resources with `factory`,
    /// which receives the index of the resource being built.
    #[must_use]
    pub fn resource_factory<F>(mut self, factory: F) -> Self
    where
        F: FnMut(usize) -> Arc<dyn Resource<M>> + 'static,
    {
        self.factory = Some(Box::new(factory));
        self
    }

    /// Build the dispatcher and register the startup resources.
    ///
    /// # Errors
    ///
    /// Any construction error from [`Dispatcher::new`], or a registration
    /// error for a duplicate or retired resource. The partially built
    /// dispatcher is shut down before the error is returned.
    pub fn build(self) -> Result<Dispatcher<M>, SchedulerError> {
        let Self {
            config,
            audit,
            resources,
            factory,
        } = self;
        let initial = config.initial_resources;

        let dispatcher = match audit {
            Some(sink) => Dispatcher::with_audit(config, sink)?,
            None => Dispatcher::new(config)?,
        };

        let mut factory = factory.unwrap_or_else(|| {
            Box::new(|_: usize| Arc::new(SimulatedResource::default()) as Arc<dyn Resource<M>>)
        });
        let produced = (0..initial).map(|idx| factory(idx));

        for resource in resources.into_iter().chain(produced) {
            if let Err(e) = dispatcher.add_resource(resource) {
                dispatcher.shutdown();
                return Err(e);
            }
        }

        tracing::info!(
            resources = dispatcher.stats().total_resources,
            "dispatcher assembled"
        );
        Ok(dispatcher)
    }
}

impl<M: Message> fmt::Debug for DispatcherBuilder<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("config", &self.config)
            .field("audit", &self.audit.is_some())
            .field("resources", &self.resources.len())
            .field("factory", &self.factory.is_some())
            .finish()
    }
}
