//! Out-of-band messages embedded in HTML responses.
//!
//! Server-rendered pages carry flash messages in a JSON script tag:
//!
//! ```html
//! <script id="dj-messages" type="application/json">
//!   [{"level": "success", "message": "Saved"}]
//! </script>
//! ```
//!
//! Version 1 is the bare array above. Later versions wrap it as
//! `{"version": 2, "messages": [...]}`. Anything else is ignored.

use scraper::{Html, Selector};
use serde::Deserialize;

/// Element id of the sidecar script tag.
pub const SIDECAR_ELEMENT_ID: &str = "dj-messages";

/// Display time for a sidecar message without its own duration.
pub const DEFAULT_SIDECAR_DURATION_MS: u64 = 5_000;

/// One embedded message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SidecarMessage {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub duration: Option<u64>,
}

fn default_level() -> String {
    "info".to_owned()
}

/// Decoded sidecar payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarPayload {
    pub version: u32,
    pub messages: Vec<SidecarMessage>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WirePayload {
    Bare(Vec<SidecarMessage>),
    Versioned {
        version: u32,
        #[serde(default)]
        messages: Vec<SidecarMessage>,
    },
}

impl From<WirePayload> for SidecarPayload {
    fn from(wire: WirePayload) -> Self {
        match wire {
            WirePayload::Bare(messages) => Self {
                version: 1,
                messages,
            },
            WirePayload::Versioned { version, messages } => Self { version, messages },
        }
    }
}

/// Extract the sidecar payload from an HTML document, if one is present and
/// well-formed.
#[must_use]
pub fn extract(html: &str) -> Option<SidecarPayload> {
    let selector = Selector::parse(&format!("#{SIDECAR_ELEMENT_ID}")).ok()?;
    let document = Html::parse_document(html);
    let element = document.select(&selector).next()?;
    let raw: String = element.text().collect();
    let raw = raw.trim();
    let raw = if raw.is_empty() { "[]" } else { raw };

    match serde_json::from_str::<WirePayload>(raw) {
        Ok(wire) => Some(wire.into()),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed sidecar payload");
            None
        }
    }
}

/// Messages embedded in `html`, empty when there are none or the payload is
/// malformed.
#[must_use]
pub fn messages(html: &str) -> Vec<SidecarMessage> {
    extract(html).map(|p| p.messages).unwrap_or_default()
}
