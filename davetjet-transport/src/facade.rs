//! Global interception of the ambient network primitive.
//!
//! Call sites talk to [`TransportFacade::fetch`] exactly as they would talk to
//! a plain [`HttpClient`]. While an [`InterceptPolicy`] is installed, calls in
//! its scope are routed through the [`Executor`]; everything else goes straight
//! to the native client. Successful POSTs matching an [`EventRule`] are
//! announced on the event bus regardless of interception.

use crate::config::{ConfigOverrides, ResponseMode};
use crate::error::{FailureKind, RequestFailure, Result, TransportError};
use crate::events::topics;
use crate::executor::Executor;
use crate::http::{HttpClient, HttpResponse, OutgoingRequest};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use url::Url;

/// Hint header: label for user-facing messages.
pub const LABEL_HEADER: &str = "X-Request-Label";
/// Hint header: any value makes the call non-silent.
pub const VERBOSE_HEADER: &str = "X-Request-Verbose";
/// Hint header: `0`/`false` disables the slow notice, anything else enables it.
pub const SLOW_HEADER: &str = "X-Request-Slow";

/// Static assets are never intercepted.
pub const STATIC_ASSET_PATTERN: &str = r"(?i)\.(css|js|png|jpg|jpeg|gif|svg|ico|webp|woff2?|ttf|map)$";

/// What an installed filter wants done with a call.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    /// Send straight to the native client.
    Bypass,
    /// Route through the executor with these overrides on top of the policy's.
    Intercept(ConfigOverrides),
    /// No opinion; the api-prefix rule decides.
    Defer,
}

/// User-supplied interception filter. Receives the request and its resolved URL.
pub type InterceptFilter = Arc<dyn Fn(&OutgoingRequest, &Url) -> FilterDecision + Send + Sync>;

/// Serializable part of an [`InterceptPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptSettings {
    /// Origin considered same-site; relative URLs resolve against it.
    /// Without one, every call passes through untouched.
    pub origin: Option<String>,
    /// Path prefix intercepted when no filter decides. Empty means every path.
    pub api_prefix: String,
    /// Path regexes that always bypass.
    pub exclude: Vec<String>,
    /// Overrides applied to every intercepted call.
    pub default_overrides: ConfigOverrides,
}

impl Default for InterceptSettings {
    fn default() -> Self {
        Self {
            origin: None,
            api_prefix: "/api/".to_owned(),
            exclude: vec![STATIC_ASSET_PATTERN.to_owned()],
            default_overrides: ConfigOverrides {
                silent: Some(true),
                show_slow_notice: Some(false),
                timeout_ms: Some(15_000),
                retries: Some(1),
                ..ConfigOverrides::default()
            },
        }
    }
}

/// Compiled interception rules.
#[derive(Clone)]
pub struct InterceptPolicy {
    origin: Option<Url>,
    api_prefix: String,
    exclude: Vec<Regex>,
    filter: Option<InterceptFilter>,
    default_overrides: ConfigOverrides,
}

impl std::fmt::Debug for InterceptPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptPolicy")
            .field("origin", &self.origin.as_ref().map(Url::as_str))
            .field("api_prefix", &self.api_prefix)
            .field("exclude", &self.exclude)
            .field("filter", &self.filter.is_some())
            .field("default_overrides", &self.default_overrides)
            .finish()
    }
}

/// Outcome of [`InterceptPolicy::decide`].
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Passthrough,
    Intercept(ConfigOverrides),
}

impl InterceptPolicy {
    /// Compile `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin is not an absolute URL or an exclude
    /// pattern does not compile.
    pub fn from_settings(settings: &InterceptSettings) -> Result<Self> {
        let origin = settings
            .origin
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|e| TransportError::Config(format!("origin {raw:?}: {e}")))
            })
            .transpose()?;
        let exclude = settings
            .exclude
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            origin,
            api_prefix: settings.api_prefix.clone(),
            exclude,
            filter: None,
            default_overrides: settings.default_overrides.clone(),
        })
    }

    /// Default policy for a site served from `origin`.
    ///
    /// # Errors
    ///
    /// Returns an error if `origin` is not an absolute URL.
    pub fn default_for(origin: &str) -> Result<Self> {
        Self::from_settings(&InterceptSettings {
            origin: Some(origin.to_owned()),
            ..InterceptSettings::default()
        })
    }

    /// Install a filter consulted for same-origin, non-excluded calls.
    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&OutgoingRequest, &Url) -> FilterDecision + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn origin(&self) -> Option<&Url> {
        self.origin.as_ref()
    }

    /// Resolve a possibly relative URL against the origin.
    pub fn resolve(&self, raw: &str) -> Option<Url> {
        match &self.origin {
            Some(origin) => origin.join(raw).ok(),
            None => Url::parse(raw).ok(),
        }
    }

    fn same_origin(&self, target: &Url) -> bool {
        self.origin
            .as_ref()
            .is_some_and(|origin| origin.origin() == target.origin())
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.exclude.iter().any(|re| re.is_match(path))
    }

    /// Route one call.
    pub fn decide(&self, request: &OutgoingRequest) -> Route {
        let Some(target) = self.resolve(&request.url) else {
            return Route::Passthrough;
        };
        if !self.same_origin(&target) || self.is_excluded(target.path()) {
            return Route::Passthrough;
        }

        let decision = self
            .filter
            .as_ref()
            .map_or(FilterDecision::Defer, |filter| filter(request, &target));
        match decision {
            FilterDecision::Bypass => Route::Passthrough,
            FilterDecision::Intercept(extra) => {
                Route::Intercept(self.default_overrides.clone().layered(&extra))
            }
            FilterDecision::Defer if target.path().starts_with(&self.api_prefix) => {
                Route::Intercept(self.default_overrides.clone())
            }
            FilterDecision::Defer => Route::Passthrough,
        }
    }
}

/// Maps a successful call to a domain event.
#[derive(Debug, Clone)]
pub struct EventRule {
    pub method: String,
    pub pattern: Regex,
    pub topic: &'static str,
}

impl EventRule {
    /// # Errors
    ///
    /// Returns an error if `pattern` does not compile.
    pub fn new(method: &str, pattern: &str, topic: &'static str) -> Result<Self> {
        Ok(Self {
            method: method.to_ascii_uppercase(),
            pattern: Regex::new(pattern)?,
            topic,
        })
    }

    fn matches(&self, method: &str, path: &str) -> bool {
        self.method == method && self.pattern.is_match(path)
    }
}

/// The built-in rules for invitation and sending endpoints.
///
/// # Errors
///
/// Only fails if a built-in pattern stops compiling.
pub fn default_event_rules() -> Result<Vec<EventRule>> {
    Ok(vec![
        EventRule::new("POST", r"(?i)/create-invitation-api", topics::INVITATION_CREATED)?,
        EventRule::new(
            "POST",
            r"(?i)/invitation-draft-promote/\d+/?$",
            topics::INVITATION_PROMOTED,
        )?,
        EventRule::new("POST", r"(?i)/api/schedule-send/\d+/?$", topics::SEND_SCHEDULED)?,
        EventRule::new("POST", r"(?i)/recipients/[^/]+/?$", topics::RECIPIENTS_ADDED)?,
    ])
}

/// Interception layer over the ambient network primitive.
pub struct TransportFacade {
    executor: Arc<Executor>,
    native: Arc<dyn HttpClient>,
    installed: AtomicBool,
    policy: RwLock<Option<InterceptPolicy>>,
    rules: Vec<EventRule>,
}

impl std::fmt::Debug for TransportFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportFacade")
            .field("installed", &self.is_installed())
            .field("rules", &self.rules.len())
            .finish_non_exhaustive()
    }
}

impl TransportFacade {
    /// # Errors
    ///
    /// Fails only if the built-in event rules do not compile.
    pub fn new(executor: Arc<Executor>, native: Arc<dyn HttpClient>) -> Result<Self> {
        Ok(Self::with_rules(executor, native, default_event_rules()?))
    }

    pub fn with_rules(
        executor: Arc<Executor>,
        native: Arc<dyn HttpClient>,
        rules: Vec<EventRule>,
    ) -> Self {
        Self {
            executor,
            native,
            installed: AtomicBool::new(false),
            policy: RwLock::new(None),
            rules,
        }
    }

    /// Start routing calls through the executor. Returns `false` (and keeps the
    /// existing policy) if already installed.
    pub fn install(&self, policy: InterceptPolicy) -> bool {
        if self
            .installed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("interception already installed");
            return false;
        }
        if let Ok(mut slot) = self.policy.write() {
            tracing::info!(origin = ?policy.origin().map(Url::as_str), "interception installed");
            *slot = Some(policy);
        }
        true
    }

    /// Restore plain passthrough. Returns `false` if nothing was installed.
    pub fn uninstall(&self) -> bool {
        if !self.installed.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Ok(mut slot) = self.policy.write() {
            *slot = None;
        }
        tracing::info!("interception removed");
        true
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// Perform a call through the ambient interface.
    ///
    /// Non-2xx answers come back as `Ok` responses. Timeouts, cancellation and
    /// network failures are errors.
    pub async fn fetch(&self, mut request: OutgoingRequest) -> std::result::Result<HttpResponse, RequestFailure> {
        let hints = take_hints(&mut request);
        let policy = self
            .policy
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .filter(|_| self.is_installed());

        let route = match &policy {
            Some(policy) => {
                if let Some(resolved) = policy.resolve(&request.url) {
                    request.url = resolved.to_string();
                }
                policy.decide(&request)
            }
            None => Route::Passthrough,
        };

        let result = match route {
            Route::Passthrough => self.passthrough(&request).await,
            Route::Intercept(overrides) => {
                let overrides = overrides.layered(&hints).layered(&ConfigOverrides {
                    response_mode: Some(ResponseMode::Raw),
                    ..ConfigOverrides::default()
                });
                tracing::trace!(url = %request.url, "intercepted call");
                self.intercepted(&request, &overrides).await
            }
        };

        if let Ok(response) = &result {
            self.announce(&request, response);
        }
        result
    }

    async fn passthrough(&self, request: &OutgoingRequest) -> std::result::Result<HttpResponse, RequestFailure> {
        self.native.send(request).await.map_err(|e| {
            RequestFailure::new(FailureKind::NetworkError, "", e.to_string())
        })
    }

    async fn intercepted(
        &self,
        request: &OutgoingRequest,
        overrides: &ConfigOverrides,
    ) -> std::result::Result<HttpResponse, RequestFailure> {
        match self.executor.execute(request.clone(), overrides, None).await {
            Ok(payload) => payload.into_raw().ok_or_else(|| {
                RequestFailure::new(FailureKind::NetworkError, "", "unexpected decoded payload")
            }),
            Err(RequestFailure {
                kind: FailureKind::HttpError,
                response: Some(response),
                ..
            }) => Ok(response),
            Err(failure) => Err(failure),
        }
    }

    fn announce(&self, request: &OutgoingRequest, response: &HttpResponse) {
        if !response.ok() {
            return;
        }
        let path = Url::parse(&request.url)
            .map(|u| u.path().to_owned())
            .unwrap_or_else(|_| request.url.clone());
        for rule in self.rules.iter().filter(|r| r.matches(&request.method, &path)) {
            tracing::debug!(topic = rule.topic, %path, "domain event");
            self.executor.context().bus().emit(
                rule.topic,
                &json!({
                    "url": request.url,
                    "method": request.method,
                    "status": response.status,
                }),
            );
        }
    }
}

/// Strip the hint headers from `request` and turn them into overrides.
fn take_hints(request: &mut OutgoingRequest) -> ConfigOverrides {
    let mut hints = ConfigOverrides::default();
    if let Some(label) = request.take_header(LABEL_HEADER).filter(|l| !l.is_empty()) {
        hints.label = Some(label);
    }
    if request.take_header(VERBOSE_HEADER).is_some() {
        hints.silent = Some(false);
    }
    if let Some(slow) = request.take_header(SLOW_HEADER) {
        hints.show_slow_notice = Some(!matches!(slow.trim(), "0" | "false"));
    }
    hints
}
