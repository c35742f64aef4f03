//! Outbound notification of a fatal error.
//!
//! When a migration is configured with an error callback, the first reporter
//! posts a small JSON document to it:
//!
//! ```text
//! {
//!   "ErrFrom": "copier",
//!   "ErrMessage": "deadlock detected",
//!   "StateDump": "{...}"
//! }
//! ```
//!
//! This module holds the pieces of that exchange: the configured destination
//! ([`HttpCallback`]), the payload document ([`ErrorPayload`]) and the
//! [`CallbackTransport`] contract that actually delivers it. A reqwest-backed
//! transport lives in the `ferry-fatal-http` crate.

use core::fmt;

use rootcause::Report;
use serde::{Deserialize, Serialize};

/// An HTTP endpoint notified when a fatal error is reported.
///
/// The field names match the `ErrorCallback` block of a migration config:
///
/// ```
/// use ferry_fatal::callback::HttpCallback;
///
/// let callback: HttpCallback =
///     serde_json::from_str(r#"{"URI": "http://localhost:8000/error"}"#).unwrap();
/// assert_eq!(callback.uri, "http://localhost:8000/error");
/// assert!(callback.payload.is_empty());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpCallback {
    /// Destination the payload is posted to.
    #[serde(rename = "URI")]
    pub uri: String,
    /// Body of the request. Filled in by the handler at report time.
    #[serde(rename = "Payload", default)]
    pub payload: String,
}

impl HttpCallback {
    /// Creates a callback for `uri` with an empty payload.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            payload: String::new(),
        }
    }

    /// Returns a copy of this callback carrying `payload`.
    ///
    /// The configured callback is never mutated, so the same handler can be
    /// shared freely between threads.
    #[must_use]
    pub fn with_payload(&self, payload: impl Into<String>) -> Self {
        Self {
            uri: self.uri.clone(),
            payload: payload.into(),
        }
    }
}

/// The JSON document posted to an [`HttpCallback`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorPayload {
    /// Which subsystem raised the fatal error.
    pub err_from: String,
    /// The top-level context of the cause.
    ///
    /// Child reports and attachments are left out to keep the notification
    /// short. The full rendered report is in the fatal log record.
    pub err_message: String,
    /// State snapshot, empty when it could not be produced.
    pub state_dump: String,
}

impl ErrorPayload {
    /// Builds the payload for a fatal error raised by `origin`.
    ///
    /// Only the top-level context of `cause` is used for the message. The
    /// full report still goes to the logs.
    pub fn new(origin: &str, cause: &Report, state_dump: Option<&str>) -> Self {
        Self {
            err_from: origin.to_owned(),
            err_message: cause.format_current_context().to_string(),
            state_dump: state_dump.unwrap_or_default().to_owned(),
        }
    }

    /// Serializes the payload as indented JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Why a callback could not be delivered.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    /// The callback has no destination.
    #[error("callback URI is empty")]
    EmptyUri,
    /// The transport client could not be constructed.
    #[error("failed to build callback client: {0}")]
    Client(String),
    /// The request did not complete.
    #[error("failed to send callback to {uri}: {reason}")]
    Connect {
        /// Destination of the failed request.
        uri: String,
        /// Transport-level description of the failure.
        reason: String,
    },
    /// The request did not finish within the configured timeout.
    #[error("callback to {0} timed out")]
    Timeout(String),
    /// The endpoint answered with something other than `200 OK`.
    #[error("callback returned non-200 status code {0}")]
    Status(u16),
}

/// Delivers a callback carrying its payload.
///
/// The handler calls [`post`](Self::post) at most once per instance, from the
/// first reporter. Implementations should bound how long they block. The
/// response body is not interpreted.
pub trait CallbackTransport: Send + Sync + 'static {
    /// Posts `callback.payload` to `callback.uri`.
    fn post(&self, callback: &HttpCallback) -> Result<(), Report<CallbackError>>;
}

/// A transport that refuses every delivery.
///
/// This is what a handler uses when a callback is configured without a
/// transport, so misconfiguration shows up as a logged delivery failure
/// instead of a silently dropped notification.
#[derive(Copy, Clone, Default)]
pub struct Unconfigured;

impl fmt::Debug for Unconfigured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unconfigured")
    }
}

impl CallbackTransport for Unconfigured {
    fn post(&self, callback: &HttpCallback) -> Result<(), Report<CallbackError>> {
        Err(Report::new(CallbackError::Client(format!(
            "no transport configured for {}",
            callback.uri
        ))))
    }
}
