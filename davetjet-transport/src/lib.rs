//! # davetjet-transport
//!
//! Request reliability layer for Davetjet.
//!
//! Every logical call made through this crate gets a deadline, bounded retries
//! with exponential backoff, a process-wide "connection is slow" notice, and a
//! single terminal outcome. A facade can route an application's ambient calls
//! through the same machinery without touching call sites.
//!
//! ## Design
//!
//! - [`policy`] answers "retry?" and "how long to wait?" and nothing else
//! - [`Executor`] owns the attempt loop, cancellation and timers
//! - [`TransportContext`] carries the shared slow signal, event bus and
//!   notification sink; tests build a fresh one each
//! - [`TransportFacade`] decides per call whether to intercept, based on an
//!   [`InterceptPolicy`], and announces domain events on the bus
//! - Rendering notices is left to a [`Notifier`] implementation
//!
//! ## Example
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use davetjet_transport::{
//!     ConfigOverrides, Executor, OutgoingRequest, ReqwestClient, ResponseMode, TransportContext,
//! };
//!
//! let client = Arc::new(ReqwestClient::new(None)?);
//! let executor = Executor::new(client, Arc::new(TransportContext::headless()));
//! let overrides = ConfigOverrides {
//!     retries: Some(2),
//!     response_mode: Some(ResponseMode::Json),
//!     ..ConfigOverrides::labelled("Guests")
//! };
//! let guests = executor
//!     .execute(OutgoingRequest::get("https://app.davetjet.com/api/guests"), &overrides, None)
//!     .await?;
//! println!("{:?}", guests.into_json());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod executor;
pub mod facade;
pub mod http;
pub mod notify;
pub mod policy;
pub mod response;
pub mod sidecar;
pub mod slow;

pub use config::{BackoffLimits, ConfigOverrides, RequestConfig, ResponseMode};
pub use context::TransportContext;
pub use error::{FailureBody, FailureKind, RequestFailure, Result, TransportError};
pub use events::{topics, EventBus, HandlerError};
pub use executor::{CancelReason, Executor, PendingCall};
pub use facade::{
    EventRule, FilterDecision, InterceptPolicy, InterceptSettings, Route, TransportFacade,
};
pub use http::{HttpClient, HttpResponse, NetworkError, OutgoingRequest, ReqwestClient};
pub use notify::{
    NoticeId, Notifier, NotifyLevel, NotifyOptions, RecordedNotice, RecordingNotifier,
    TracingNotifier,
};
pub use response::{HtmlDocument, RequestOutcome, ResponsePayload};
pub use slow::SlowSignal;
