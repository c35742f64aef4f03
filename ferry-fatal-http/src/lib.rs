#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! HTTP delivery of fatal-error callbacks for `ferry-fatal`.
//!
//! This crate provides [`HttpTransport`], a [`CallbackTransport`] that posts
//! the error payload to the configured [`HttpCallback`] URI with a blocking
//! reqwest client.
//!
//! # Quick Start
//!
//! ```no_run
//! use ferry_fatal::{PanicErrorHandler, callback::HttpCallback};
//! use ferry_fatal_http::HttpTransport;
//! use rootcause::Report;
//!
//! let handler = PanicErrorHandler::builder(|| -> Result<String, Report> { Ok("{}".into()) })
//!     .error_callback(HttpCallback::new("http://localhost:8000/error"))
//!     .transport(HttpTransport::new())
//!     .build();
//! ```
//!
//! # Delivery
//!
//! - A new client is built for every delivery. The handler delivers at most
//!   once per instance, so there is nothing worth keeping alive.
//! - The request is a `POST` with `Content-Type: application/json` and the
//!   callback payload as body. `https` URIs go through rustls.
//! - Anything but `200 OK` counts as a failure. The response body is ignored.
//! - The whole request is bounded by the configured timeout. There are no
//!   retries.
//!
//! The blocking client must not be used from inside an async runtime worker.
//! Call the handler from a plain thread or through
//! `tokio::task::spawn_blocking`.

use std::time::Duration;

use ferry_fatal::{
    LOG_TAG,
    callback::{CallbackError, CallbackTransport, HttpCallback},
    config::{DEFAULT_CALLBACK_TIMEOUT, FatalConfig},
};
use reqwest::{StatusCode, blocking::Client, header::CONTENT_TYPE};
use rootcause::Report;

/// Posts error callbacks over HTTP.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use ferry_fatal::config::FatalConfig;
/// use ferry_fatal_http::HttpTransport;
///
/// let config = FatalConfig::from_json_str(r#"{"ErrorCallbackTimeoutMs": 1500}"#).unwrap();
/// let transport = HttpTransport::from_config(&config);
/// assert_eq!(transport.timeout(), Duration::from_millis(1500));
/// ```
#[derive(Copy, Clone, Debug)]
pub struct HttpTransport {
    timeout: Duration,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    /// Creates a transport with the default timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_CALLBACK_TIMEOUT)
    }

    /// Creates a transport bounding every delivery by `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Creates a transport using the timeout from `config`.
    pub fn from_config(config: &FatalConfig) -> Self {
        Self::with_timeout(config.callback_timeout)
    }

    /// The upper bound on a single delivery.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl CallbackTransport for HttpTransport {
    fn post(&self, callback: &HttpCallback) -> Result<(), Report<CallbackError>> {
        if callback.uri.is_empty() {
            return Err(Report::new(CallbackError::EmptyUri));
        }

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Report::new(CallbackError::Client(e.to_string())))?;

        tracing::debug!(tag = LOG_TAG, uri = %callback.uri, "posting error callback");

        let response = client
            .post(&callback.uri)
            .header(CONTENT_TYPE, "application/json")
            .body(callback.payload.clone())
            .send()
            .map_err(|e| {
                let error = if e.is_timeout() {
                    CallbackError::Timeout(callback.uri.clone())
                } else {
                    CallbackError::Connect {
                        uri: callback.uri.clone(),
                        reason: e.to_string(),
                    }
                };
                Report::new(error)
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Report::new(CallbackError::Status(status.as_u16())));
        }
        Ok(())
    }
}
