//! Successful call payloads.

use crate::error::RequestFailure;
use crate::http::HttpResponse;
use scraper::{Html, Selector};
use serde_json::Value;

/// Terminal outcome of a logical call. Retries are invisible here.
pub type RequestOutcome = Result<ResponsePayload, RequestFailure>;

/// Decoded body of a successful call, shaped by the configured response mode.
#[derive(Debug, Clone)]
pub enum ResponsePayload {
    Raw(HttpResponse),
    Json(Value),
    Text(String),
    Html(HtmlDocument),
}

impl ResponsePayload {
    /// The raw response, when the call ran in raw mode.
    #[must_use]
    pub fn into_raw(self) -> Option<HttpResponse> {
        match self {
            Self::Raw(response) => Some(response),
            _ => None,
        }
    }

    /// The JSON value, when the call ran in json mode.
    #[must_use]
    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The text body, for text and html modes.
    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            Self::Html(doc) => Some(doc.source),
            _ => None,
        }
    }
}

/// An HTML response body.
///
/// The parsed tree is not `Send`, so the document keeps its source and parses
/// on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlDocument {
    source: String,
}

impl HtmlDocument {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Original markup.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parse into a DOM tree.
    #[must_use]
    pub fn parse(&self) -> Html {
        Html::parse_document(&self.source)
    }

    /// Text content of every element matching `selector`. An invalid selector
    /// matches nothing.
    #[must_use]
    pub fn select_text(&self, selector: &str) -> Vec<String> {
        let Ok(selector) = Selector::parse(selector) else {
            return Vec::new();
        };
        let document = self.parse();
        document
            .select(&selector)
            .map(|el| el.text().collect::<String>().trim().to_owned())
            .collect()
    }

    /// Contents of `<title>`, if any.
    #[must_use]
    pub fn title(&self) -> Option<String> {
        self.select_text("title").into_iter().next()
    }
}
