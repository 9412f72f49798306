//! Cancelable request executor.
//!
//! Wraps one logical call with:
//!
//! - a cancellation token (composed with an optional caller token),
//! - a per-attempt deadline,
//! - a "connection is slow" watchdog gated by the shared [`SlowSignal`],
//! - bounded retries with exponential backoff.
//!
//! Every timer lives inside the call's own future and is polled from the same
//! `select!` as the network attempt. Finalizing drops them, so no timer can
//! fire after the outcome is decided.
//!
//! [`SlowSignal`]: crate::slow::SlowSignal

use crate::config::{ConfigOverrides, RequestConfig, ResponseMode};
use crate::context::TransportContext;
use crate::error::{FailureBody, FailureKind, RequestFailure};
use crate::events::topics;
use crate::http::{HttpClient, HttpResponse, NetworkError, OutgoingRequest};
use crate::notify::{NoticeId, NotifyLevel, NotifyOptions};
use crate::policy::{backoff_delay, should_retry, AttemptSignal};
use crate::response::{HtmlDocument, RequestOutcome, ResponsePayload};
use crate::sidecar;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;
use tokio::time::{Instant, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

/// Display time for http failure notices.
const HTTP_ERROR_NOTICE_MS: u64 = 5_500;

/// Display time for timeout and network failure notices.
const TERMINAL_ERROR_NOTICE_MS: u64 = 6_000;

/// Why a call's token was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Timeout,
    Manual,
}

/// Handle to an in-flight call.
#[derive(Debug, Clone)]
pub struct PendingCall {
    id: u64,
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl PendingCall {
    /// Monotonic call id, unique per executor.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancel the call. The call ends with [`FailureKind::Aborted`] unless
    /// its deadline already claimed the cancellation.
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::Manual);
    }

    /// The reason recorded by whichever cancellation came first.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.get().copied()
    }

    fn cancel_with(&self, reason: CancelReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }
}

/// Result of a single attempt.
enum Step {
    Response(HttpResponse),
    Network(NetworkError),
    TimedOut,
    Cancelled,
}

impl Step {
    fn signal(&self) -> AttemptSignal {
        match self {
            Self::Response(response) => AttemptSignal::Status(response.status),
            Self::Network(_) => AttemptSignal::NetworkError,
            Self::TimedOut => AttemptSignal::Timeout,
            Self::Cancelled => AttemptSignal::Aborted,
        }
    }

    fn is_success(&self) -> bool {
        matches!(self, Self::Response(response) if response.ok())
    }
}

/// Per-call slow-notice watchdog.
struct Watchdog {
    sleep: Option<Pin<Box<Sleep>>>,
    notice: Option<NoticeId>,
}

impl Watchdog {
    fn new(threshold: Option<Duration>) -> Self {
        Self {
            sleep: threshold.map(|d| Box::pin(tokio::time::sleep(d))),
            notice: None,
        }
    }
}

/// Per-call cleanup that also runs when the call's future is dropped.
///
/// Removes the pending entry and clears the slow notice this call raised.
struct CallGuard<'a> {
    executor: &'a Executor,
    id: u64,
    watchdog: Watchdog,
    settled: bool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(call_id = self.id, "call dropped before completion");
        }
        self.executor.clear_slow(&mut self.watchdog);
        if let Ok(mut pending) = self.executor.pending.lock() {
            pending.remove(&self.id);
        }
    }
}

/// Resolves when the watchdog fires; never resolves once disarmed.
async fn watchdog_fired(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Runs logical calls against an [`HttpClient`].
pub struct Executor {
    client: Arc<dyn HttpClient>,
    context: Arc<TransportContext>,
    defaults: RwLock<RequestConfig>,
    pending: Mutex<HashMap<u64, PendingCall>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("defaults", &self.defaults())
            .field("pending", &self.pending_ids())
            .finish_non_exhaustive()
    }
}

impl Executor {
    pub fn new(client: Arc<dyn HttpClient>, context: Arc<TransportContext>) -> Self {
        Self {
            client,
            context,
            defaults: RwLock::new(RequestConfig::default()),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Replace the global defaults wholesale.
    #[must_use]
    pub fn with_defaults(self, defaults: RequestConfig) -> Self {
        if let Ok(mut guard) = self.defaults.write() {
            *guard = defaults;
        }
        self
    }

    /// Merge `overrides` into the global defaults used by later calls.
    pub fn set_defaults(&self, overrides: &ConfigOverrides) {
        if let Ok(mut guard) = self.defaults.write() {
            overrides.apply_to(&mut guard);
        }
    }

    /// Snapshot of the global defaults.
    pub fn defaults(&self) -> RequestConfig {
        self.defaults
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Defaults with `overrides` applied.
    pub fn config_for(&self, overrides: &ConfigOverrides) -> RequestConfig {
        RequestConfig::merged(&self.defaults(), overrides)
    }

    pub fn context(&self) -> &Arc<TransportContext> {
        &self.context
    }

    /// Perform `request` with the defaults layered under `overrides`.
    ///
    /// `external` cancels the call when cancelled; it does not replace the
    /// executor's own deadline.
    pub async fn execute(
        &self,
        request: OutgoingRequest,
        overrides: &ConfigOverrides,
        external: Option<&CancellationToken>,
    ) -> RequestOutcome {
        let call = self.register(external);
        let config = self.config_for(overrides);
        self.run(call, request, config).await
    }

    /// Allocate a [`PendingCall`] so the caller holds a handle before the
    /// call starts. Pass it to [`Executor::run`].
    pub fn register(&self, external: Option<&CancellationToken>) -> PendingCall {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let token = external.map_or_else(CancellationToken::new, CancellationToken::child_token);
        let call = PendingCall {
            id,
            token,
            reason: Arc::new(OnceLock::new()),
        };
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, call.clone());
        }
        call
    }

    /// Drive a registered call to its terminal outcome.
    ///
    /// Dropping the returned future abandons the call: it leaves the pending
    /// set and any slow notice it raised is dismissed.
    pub async fn run(
        &self,
        call: PendingCall,
        request: OutgoingRequest,
        config: RequestConfig,
    ) -> RequestOutcome {
        let span = tracing::debug_span!(
            "request",
            call_id = call.id,
            method = %request.method,
            url = %request.url,
        );
        let mut guard = CallGuard {
            executor: self,
            id: call.id,
            watchdog: Watchdog::new(config.slow_threshold()),
            settled: false,
        };
        let outcome = self
            .drive(&call, &request, &config, &mut guard.watchdog)
            .instrument(span)
            .await;
        guard.settled = true;
        outcome
    }

    /// Cancel a pending call by id. Returns `false` for unknown ids.
    pub fn cancel(&self, id: u64) -> bool {
        let call = self
            .pending
            .lock()
            .ok()
            .and_then(|pending| pending.get(&id).cloned());
        match call {
            Some(call) => {
                call.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending call. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let calls: Vec<PendingCall> = self
            .pending
            .lock()
            .map(|pending| pending.values().cloned().collect())
            .unwrap_or_default();
        for call in &calls {
            call.cancel();
        }
        calls.len()
    }

    /// Ids of calls that have not reached a terminal state, ascending.
    pub fn pending_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .pending
            .lock()
            .map(|pending| pending.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Race an arbitrary future against a deadline.
    ///
    /// On expiry the future is dropped, a timeout notice is surfaced unless
    /// `silent`, and a `request-timeout` event is emitted.
    pub async fn with_timeout<F: Future>(
        &self,
        future: F,
        label: &str,
        timeout: Duration,
        silent: bool,
    ) -> Result<F::Output, RequestFailure> {
        match tokio::time::timeout(timeout, future).await {
            Ok(value) => Ok(value),
            Err(_) => {
                let config = RequestConfig {
                    label: label.to_owned(),
                    silent,
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    ..RequestConfig::default()
                };
                Err(self.timed_out(None, &config))
            }
        }
    }

    async fn drive(
        &self,
        call: &PendingCall,
        request: &OutgoingRequest,
        config: &RequestConfig,
        watchdog: &mut Watchdog,
    ) -> RequestOutcome {
        let mut attempt: u32 = 0;

        let last = loop {
            let step = self.attempt(call, request, config, watchdog).await;
            if step.is_success() || !should_retry(step.signal(), attempt, config) {
                break step;
            }

            let delay = backoff_delay(attempt, config.retry_backoff_base_ms, &config.backoff);
            match &step {
                Step::Response(response) => debug!(
                    attempt,
                    status = response.status,
                    delay_ms = delay.as_millis() as u64,
                    "retryable status; backing off"
                ),
                Step::Network(e) => debug!(
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "network error; backing off"
                ),
                Step::TimedOut | Step::Cancelled => {}
            }
            attempt += 1;

            if !self.back_off(call, delay, config, watchdog).await {
                break Step::Cancelled;
            }
        };

        // Timers die with this frame; only the visible notice needs clearing.
        self.clear_slow(watchdog);

        self.finalize(last, request, config, attempt)
    }

    async fn attempt(
        &self,
        call: &PendingCall,
        request: &OutgoingRequest,
        config: &RequestConfig,
        watchdog: &mut Watchdog,
    ) -> Step {
        let timeout = config.timeout();
        let deadline = tokio::time::sleep(timeout.unwrap_or_default());
        tokio::pin!(deadline);
        let send = self.client.send(request);
        tokio::pin!(send);

        loop {
            tokio::select! {
                biased;
                () = call.token.cancelled() => return Step::Cancelled,
                () = &mut deadline, if timeout.is_some() => {
                    call.cancel_with(CancelReason::Timeout);
                    return match call.reason() {
                        Some(CancelReason::Timeout) => Step::TimedOut,
                        _ => Step::Cancelled,
                    };
                }
                () = watchdog_fired(&mut watchdog.sleep) => self.raise_slow(watchdog, config),
                result = &mut send => {
                    return match result {
                        Ok(response) => Step::Response(response),
                        Err(e) => Step::Network(e),
                    };
                }
            }
        }
    }

    /// Sleep between attempts. Returns `false` if the call was cancelled.
    async fn back_off(
        &self,
        call: &PendingCall,
        delay: Duration,
        config: &RequestConfig,
        watchdog: &mut Watchdog,
    ) -> bool {
        let pause = tokio::time::sleep(delay);
        tokio::pin!(pause);
        loop {
            tokio::select! {
                biased;
                () = call.token.cancelled() => return false,
                () = watchdog_fired(&mut watchdog.sleep) => self.raise_slow(watchdog, config),
                () = &mut pause => return true,
            }
        }
    }

    /// Dismiss this call's slow notice and free the signal. Calls that never
    /// raised the notice leave the signal alone.
    fn clear_slow(&self, watchdog: &mut Watchdog) {
        if let Some(notice) = watchdog.notice.take() {
            self.context.notifier().dismiss(notice);
            self.context.slow().release();
        }
    }

    fn raise_slow(&self, watchdog: &mut Watchdog, config: &RequestConfig) {
        watchdog.sleep = None;
        let cooldown = Duration::from_millis(config.slow_notice_cooldown_ms);
        if !self.context.slow().try_activate(Instant::now(), cooldown) {
            debug!("slow threshold passed; notice suppressed");
            return;
        }
        let message = format!("{}Connection seems slow…", config.message_prefix());
        let notice = self
            .context
            .notifier()
            .notify(NotifyLevel::Info, &message, NotifyOptions::sticky());
        watchdog.notice = Some(notice);
        debug!("slow notice raised");
    }

    fn finalize(
        &self,
        step: Step,
        request: &OutgoingRequest,
        config: &RequestConfig,
        retries_used: u32,
    ) -> RequestOutcome {
        match step {
            Step::Cancelled => {
                debug!(retries_used, "request aborted");
                Err(RequestFailure::new(
                    FailureKind::Aborted,
                    &config.label,
                    "request aborted",
                ))
            }
            Step::TimedOut => Err(self.timed_out(Some(&request.url), config)),
            Step::Network(e) => {
                warn!(retries_used, error = %e, "request failed at the network level");
                let message = format!("{}Network error. Please try again.", config.message_prefix());
                self.surface_error(config, &message, TERMINAL_ERROR_NOTICE_MS);
                Err(RequestFailure::new(
                    FailureKind::NetworkError,
                    &config.label,
                    message,
                ))
            }
            Step::Response(response) => self.decode(response, config, retries_used),
        }
    }

    fn timed_out(&self, url: Option<&str>, config: &RequestConfig) -> RequestFailure {
        let secs = (config.timeout_ms as f64 / 1000.0).round() as u64;
        let message = format!("{}Request timed out ({secs} s)", config.message_prefix());
        warn!(timeout_ms = config.timeout_ms, label = %config.label, "request timed out");
        self.surface_error(config, &message, TERMINAL_ERROR_NOTICE_MS);
        self.context.bus().emit(
            topics::REQUEST_TIMEOUT,
            &json!({
                "url": url,
                "timeoutMs": config.timeout_ms,
                "label": config.label,
            }),
        );
        RequestFailure::new(FailureKind::Timeout, &config.label, message)
    }

    fn decode(
        &self,
        response: HttpResponse,
        config: &RequestConfig,
        retries_used: u32,
    ) -> RequestOutcome {
        let status = response.status;
        let ok = response.ok();
        if !ok {
            warn!(status, retries_used, "request failed with http status");
        }
        let fallback = || {
            if response.status_text.is_empty() {
                "Request failed".to_owned()
            } else {
                response.status_text.clone()
            }
        };

        match config.response_mode {
            ResponseMode::Json => {
                let data: Value = response
                    .json()
                    .unwrap_or_else(|_| Value::Object(Map::new()));
                if ok {
                    return Ok(ResponsePayload::Json(data));
                }
                let server_message = ["message", "detail"]
                    .iter()
                    .find_map(|key| data.get(*key).and_then(Value::as_str))
                    .filter(|m| !m.is_empty())
                    .map(str::to_owned);
                let message = server_message.unwrap_or_else(fallback);
                Err(self.http_failure(status, config, message, Some(FailureBody::Json(data)), None))
            }
            ResponseMode::Text | ResponseMode::Html => {
                let text = response.text();
                if !ok {
                    let body = if config.response_mode == ResponseMode::Html {
                        FailureBody::Html(text)
                    } else {
                        FailureBody::Text(text)
                    };
                    return Err(self.http_failure(status, config, fallback(), Some(body), None));
                }
                self.surface_sidecar(config, &text);
                if config.response_mode == ResponseMode::Html {
                    Ok(ResponsePayload::Html(HtmlDocument::new(text)))
                } else {
                    Ok(ResponsePayload::Text(text))
                }
            }
            ResponseMode::Raw => {
                if ok {
                    return Ok(ResponsePayload::Raw(response));
                }
                let message = if response.status_text.is_empty() {
                    format!("HTTP {status}")
                } else {
                    response.status_text.clone()
                };
                Err(self.http_failure(status, config, message, None, Some(response)))
            }
        }
    }

    fn http_failure(
        &self,
        status: u16,
        config: &RequestConfig,
        message: String,
        body: Option<FailureBody>,
        response: Option<HttpResponse>,
    ) -> RequestFailure {
        let shown = format!("{}{message}", config.message_prefix());
        self.surface_error(config, &shown, HTTP_ERROR_NOTICE_MS);
        RequestFailure {
            body,
            response,
            ..RequestFailure::http(status, &config.label, message)
        }
    }

    fn surface_error(&self, config: &RequestConfig, message: &str, duration_ms: u64) {
        if config.silent {
            return;
        }
        self.context
            .notifier()
            .notify(NotifyLevel::Error, message, NotifyOptions::timed(duration_ms));
    }

    fn surface_sidecar(&self, config: &RequestConfig, html: &str) {
        if config.silent || !config.auto_sidecar {
            return;
        }
        for message in sidecar::messages(html) {
            let duration = message
                .duration
                .unwrap_or(sidecar::DEFAULT_SIDECAR_DURATION_MS);
            self.context.notifier().notify(
                NotifyLevel::parse_lenient(&message.level),
                &message.message,
                NotifyOptions::timed(duration),
            );
        }
    }
}
