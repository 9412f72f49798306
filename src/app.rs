//! Composition root.
//!
//! [`App`] owns one instance of every component and wires them together:
//! the facade's domain events reach the task engine through the shared bus,
//! tours publish `tour-ended` on the same bus, and notices from the executor
//! and the cooldown guard go to the same sink.

use crate::config::AppConfig;
use crate::cooldown::CooldownGuard;
use crate::error::{AppError, Result};
use crate::onboarding::{Tour, TourStep};
use crate::storage::{Clock, FileStore, KeyValueStore, SystemClock};
use crate::tasks::{self, Catalog, TaskEngine};
use davetjet_transport::{
    EventBus, Executor, HttpClient, HttpResponse, InterceptPolicy, Notifier, OutgoingRequest,
    ReqwestClient, RequestFailure, TracingNotifier, TransportContext, TransportFacade,
};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// External collaborators an [`App`] is built from.
pub struct AppParts {
    pub store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
    pub client: Arc<dyn HttpClient>,
}

pub struct App {
    config: AppConfig,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    context: Arc<TransportContext>,
    executor: Arc<Executor>,
    facade: TransportFacade,
    tasks: Arc<Mutex<TaskEngine>>,
    cooldown: Arc<CooldownGuard>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("facade", &self.facade)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl App {
    /// Wire every component from `config` and `parts`, and install
    /// interception with the configured policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the task catalog
    /// cannot be built.
    pub fn new(config: AppConfig, parts: AppParts) -> Result<Self> {
        config.validate()?;
        let AppParts {
            store,
            clock,
            notifier,
            client,
        } = parts;

        let bus = Arc::new(EventBus::new());
        let context = Arc::new(TransportContext::new(Arc::clone(&notifier), bus));
        let executor = Arc::new(
            Executor::new(Arc::clone(&client), Arc::clone(&context))
                .with_defaults(config.transport.clone()),
        );
        let facade = TransportFacade::new(Arc::clone(&executor), client)?;
        facade.install(InterceptPolicy::from_settings(&config.intercept)?);

        let catalog = Arc::new(Catalog::builtin(&config.tasks)?);
        let engine = TaskEngine::new(catalog, Arc::clone(&store), Arc::clone(&clock));
        let tasks = Arc::new(Mutex::new(engine));
        tasks::subscribe(&tasks, context.bus());

        let cooldown = Arc::new(
            CooldownGuard::new(Arc::clone(&store), Arc::clone(&clock)).with_notifier(notifier),
        );

        tracing::debug!(
            api_prefix = %config.intercept.api_prefix,
            "app initialised"
        );
        Ok(Self {
            config,
            store,
            clock,
            context,
            executor,
            facade,
            tasks,
            cooldown,
        })
    }

    /// Production wiring: file-backed state, system clock, reqwest, notices
    /// logged through `tracing`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the
    /// configuration is invalid.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let state_file = config.storage.resolved_state_file();
        tracing::debug!(state_file = %state_file.display(), "using state file");
        let parts = AppParts {
            store: Arc::new(FileStore::new(state_file)),
            clock: Arc::new(SystemClock),
            notifier: Arc::new(TracingNotifier::new()),
            client: Arc::new(ReqwestClient::new(None)?),
        };
        Self::new(config, parts)
    }

    /// Load the config at `path` (defaults when absent) and wire production
    /// components.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or wiring fails.
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_config(AppConfig::load_or_default(path)?)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        self.context.bus()
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn facade(&self) -> &TransportFacade {
        &self.facade
    }

    pub fn cooldown(&self) -> &Arc<CooldownGuard> {
        &self.cooldown
    }

    /// Shared handle to the task engine, as subscribed to the bus.
    pub fn task_engine(&self) -> &Arc<Mutex<TaskEngine>> {
        &self.tasks
    }

    /// Lock the task engine.
    ///
    /// Do not hold the guard across [`App::fetch`] or [`Tour::end`]: both may
    /// deliver events to the engine.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`] if the lock is poisoned.
    pub fn tasks(&self) -> Result<MutexGuard<'_, TaskEngine>> {
        self.tasks
            .lock()
            .map_err(|e| AppError::Storage(format!("task engine lock poisoned: {e}")))
    }

    /// Perform a call through the facade.
    ///
    /// # Errors
    ///
    /// Returns the terminal [`RequestFailure`] for timeouts, aborts and
    /// network failures. Non-2xx answers are `Ok`.
    pub async fn fetch(&self, request: OutgoingRequest) -> std::result::Result<HttpResponse, RequestFailure> {
        self.facade.fetch(request).await
    }

    /// Tour for `page` over the declared steps, publishing on this app's bus.
    ///
    /// `page` also becomes the task engine's current page.
    pub fn tour(&self, page: impl Into<String>, steps: &[TourStep]) -> Tour {
        let page = page.into();
        match self.tasks.lock() {
            Ok(mut engine) => engine.set_current_page(Some(page.clone())),
            Err(_) => tracing::warn!(%page, "task engine lock poisoned; current page not set"),
        }
        Tour::for_page(page, steps, Arc::clone(&self.store), Arc::clone(self.bus()))
    }
}
