//! The fatal-error contract and its report-once implementation.
//!
//! # Control Flow
//!
//! ```text
//! any thread ── fatal(origin, cause) ── report_error(origin, &cause)
//!                                            │
//!                           gate.enter() ────┤
//!                                            ├─ suppressed: log, return false
//!                                            └─ first: snapshot → dump channel
//!                                                      → callback (optional)
//!                                                      → log, return true
//!               true  → panic with FATAL_PANIC_MESSAGE
//!               false → return
//! ```
//!
//! A `fatal` call that loses the race returns normally. The first reporter is
//! already unwinding towards process exit, and a second abort would only
//! produce a duplicate, confusing crash. This only stays safe if whatever
//! catches the first unwind lets the process go down.

use std::{any::Any, fmt, sync::Arc};

use rootcause::Report;

use crate::{
    callback::{CallbackTransport, ErrorPayload, HttpCallback, Unconfigured},
    config::FatalConfig,
    dump::{DumpChannel, Stdout},
    gate::{Admission, ReportGate},
    state::StateProvider,
};

/// Value of the `tag` field on every log record emitted by this crate.
pub const LOG_TAG: &str = "error_handler";

/// Panic payload raised by [`ErrorHandler::fatal`] on the first-reporter path.
pub const FATAL_PANIC_MESSAGE: &str = "fatal error detected, see logs for details";

/// Escalation path for unrecoverable conditions.
///
/// Implementations must be safe to call from any number of threads at once.
/// Callers never receive an error value back: they learn whether they were
/// the reporting caller, or they unwind.
pub trait ErrorHandler: Send + Sync {
    /// Records a fatal error raised by `origin`.
    ///
    /// Returns `true` if this call performed the reporting side effects and
    /// `false` if an earlier call already did. Failures while reporting are
    /// logged and never change the return value.
    fn report_error(&self, origin: &str, cause: &Report) -> bool;

    /// Reports `cause` and aborts the calling path if this call was the
    /// reporting one.
    ///
    /// The abort is a panic whose payload is [`FATAL_PANIC_MESSAGE`]. A call
    /// that loses the race to an earlier fatal error returns normally.
    #[track_caller]
    fn fatal(&self, origin: &str, cause: Report) {
        if self.report_error(origin, &cause) {
            std::panic::panic_any(FATAL_PANIC_MESSAGE);
        }
    }
}

impl<H: ErrorHandler + ?Sized> ErrorHandler for Arc<H> {
    fn report_error(&self, origin: &str, cause: &Report) -> bool {
        (**self).report_error(origin, cause)
    }

    #[track_caller]
    fn fatal(&self, origin: &str, cause: Report) {
        (**self).fatal(origin, cause)
    }
}

impl<H: ErrorHandler + ?Sized> ErrorHandler for &H {
    fn report_error(&self, origin: &str, cause: &Report) -> bool {
        (**self).report_error(origin, cause)
    }

    #[track_caller]
    fn fatal(&self, origin: &str, cause: Report) {
        (**self).fatal(origin, cause)
    }
}

/// Returns `true` if a caught panic payload is the abort raised by
/// [`ErrorHandler::fatal`].
///
/// Meant for the supervising layer that catches the unwind before exiting:
///
/// ```
/// use std::panic::{AssertUnwindSafe, catch_unwind};
///
/// use ferry_fatal::{ErrorHandler, PanicErrorHandler, is_fatal_panic};
/// use rootcause::{Report, report};
///
/// let handler = PanicErrorHandler::new(|| -> Result<String, Report> { Ok("{}".into()) });
/// let payload = catch_unwind(AssertUnwindSafe(|| {
///     handler.fatal("copier", report!("deadlock detected"))
/// }))
/// .unwrap_err();
/// assert!(is_fatal_panic(payload.as_ref()));
/// ```
pub fn is_fatal_panic(payload: &(dyn Any + Send)) -> bool {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message == FATAL_PANIC_MESSAGE
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message == FATAL_PANIC_MESSAGE
    } else {
        false
    }
}

/// Reports the first fatal error once, then panics.
///
/// On the first call to [`report_error`](ErrorHandler::report_error) the
/// handler:
///
/// 1. asks the [`StateProvider`] for a snapshot,
/// 2. writes the snapshot to the [`DumpChannel`] (standard output by default),
/// 3. posts an [`ErrorPayload`] to the configured [`HttpCallback`], if any,
/// 4. logs the fatal error.
///
/// Every later call only logs that it was suppressed. Construct one handler
/// per process run and share it by reference or [`Arc`]; a fresh handler has
/// a fresh gate and would report again.
///
/// # Examples
///
/// ```
/// use ferry_fatal::{ErrorHandler, PanicErrorHandler, dump::MemoryDump};
/// use rootcause::{Report, report};
///
/// let dumps = MemoryDump::new();
/// let handler = PanicErrorHandler::builder(|| -> Result<String, Report> {
///     Ok(r#"{"LastSuccessfulPrimaryKeys":{}}"#.to_string())
/// })
/// .dump_channel(dumps.clone())
/// .build();
///
/// assert!(handler.report_error("copier", &report!("deadlock detected")));
/// assert!(!handler.report_error("verifier", &report!("checksum mismatch")));
/// assert_eq!(dumps.dumps().len(), 1);
/// ```
pub struct PanicErrorHandler {
    state: Arc<dyn StateProvider>,
    gate: ReportGate,
    error_callback: Option<HttpCallback>,
    transport: Arc<dyn CallbackTransport>,
    dump: Arc<dyn DumpChannel>,
}

impl fmt::Debug for PanicErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanicErrorHandler")
            .field("gate", &self.gate)
            .field("error_callback", &self.error_callback)
            .finish_non_exhaustive()
    }
}

impl PanicErrorHandler {
    /// Creates a handler without an error callback that dumps to stdout.
    pub fn new<P: StateProvider + 'static>(state: P) -> Self {
        Self::builder(state).build()
    }

    /// Starts configuring a handler around `state`.
    pub fn builder<P: StateProvider + 'static>(state: P) -> HandlerBuilder {
        Self::builder_shared(Arc::new(state))
    }

    /// Starts configuring a handler around a shared state provider.
    pub fn builder_shared(state: Arc<dyn StateProvider>) -> HandlerBuilder {
        HandlerBuilder {
            state,
            error_callback: None,
            transport: None,
            dump: Arc::new(Stdout),
        }
    }

    /// The configured callback, without any payload.
    pub fn error_callback(&self) -> Option<&HttpCallback> {
        self.error_callback.as_ref()
    }

    /// Whether a fatal error has already been reported by this handler.
    pub fn reported(&self) -> bool {
        self.gate.is_closed()
    }

    /// How many times [`report_error`](ErrorHandler::report_error) has been
    /// called, including suppressed calls.
    pub fn report_attempts(&self) -> u64 {
        self.gate.entries()
    }

    fn snapshot(&self, origin: &str) -> Option<String> {
        let dump = match self.state.serialize_state() {
            Ok(dump) => dump,
            Err(error) => {
                tracing::error!(
                    tag = LOG_TAG,
                    errfrom = origin,
                    error = %error,
                    "failed to dump state to JSON"
                );
                return None;
            }
        };

        if let Err(error) = self.dump.emit(&dump) {
            tracing::error!(
                tag = LOG_TAG,
                errfrom = origin,
                error = %error,
                "failed to emit state dump"
            );
        }
        Some(dump)
    }

    fn notify(&self, callback: &HttpCallback, origin: &str, cause: &Report, dump: Option<&str>) {
        let payload = match ErrorPayload::new(origin, cause, dump).to_json() {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(
                    tag = LOG_TAG,
                    errfrom = origin,
                    error = %error,
                    "failed to marshal error data"
                );
                return;
            }
        };

        if let Err(error) = self.transport.post(&callback.with_payload(payload)) {
            tracing::error!(
                tag = LOG_TAG,
                errfrom = origin,
                uri = %callback.uri,
                error = %error,
                "failed to notify error"
            );
        }
    }
}

impl ErrorHandler for PanicErrorHandler {
    fn report_error(&self, origin: &str, cause: &Report) -> bool {
        if let Admission::Suppressed { attempt } = self.gate.enter() {
            tracing::error!(
                tag = LOG_TAG,
                errfrom = origin,
                attempt,
                error = %cause,
                "multiple fatal errors detected, not reporting again"
            );
            return false;
        }

        let dump = self.snapshot(origin);

        if let Some(callback) = &self.error_callback {
            self.notify(callback, origin, cause, dump.as_deref());
        }

        tracing::error!(
            tag = LOG_TAG,
            errfrom = origin,
            error = %cause,
            "fatal error detected, state dump in stdout"
        );
        true
    }
}

/// Builder for [`PanicErrorHandler`].
///
/// ```
/// use ferry_fatal::{PanicErrorHandler, callback::HttpCallback};
/// use rootcause::Report;
///
/// let handler = PanicErrorHandler::builder(|| -> Result<String, Report> { Ok(String::new()) })
///     .error_callback(HttpCallback::new("http://localhost:8000/error"))
///     .build();
/// assert!(handler.error_callback().is_some());
/// ```
#[must_use]
pub struct HandlerBuilder {
    state: Arc<dyn StateProvider>,
    error_callback: Option<HttpCallback>,
    transport: Option<Arc<dyn CallbackTransport>>,
    dump: Arc<dyn DumpChannel>,
}

impl fmt::Debug for HandlerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBuilder")
            .field("error_callback", &self.error_callback)
            .field("has_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

impl HandlerBuilder {
    /// Notifies `callback` when the first fatal error is reported.
    ///
    /// A callback with an empty URI is ignored.
    pub fn error_callback(mut self, callback: HttpCallback) -> Self {
        self.error_callback = Some(callback).filter(|c| !c.uri.is_empty());
        self
    }

    /// Takes the callback URI from `config`.
    ///
    /// Only the callback is applied. `callback_timeout` belongs to the
    /// transport, which still has to be set, for example with
    /// `.transport(HttpTransport::from_config(&config))` from
    /// `ferry-fatal-http`. Without a transport every delivery fails and is
    /// only logged.
    pub fn config(mut self, config: &FatalConfig) -> Self {
        self.error_callback = config.error_callback.clone();
        self
    }

    /// Delivers callbacks through `transport`.
    pub fn transport<T: CallbackTransport>(self, transport: T) -> Self {
        self.shared_transport(Arc::new(transport))
    }

    /// Delivers callbacks through a shared transport.
    pub fn shared_transport(mut self, transport: Arc<dyn CallbackTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Writes state dumps to `dump` instead of standard output.
    pub fn dump_channel<D: DumpChannel>(mut self, dump: D) -> Self {
        self.dump = Arc::new(dump);
        self
    }

    /// Finishes the handler.
    ///
    /// A callback without a transport is kept; its delivery will fail and be
    /// logged when the first fatal error is reported.
    pub fn build(self) -> PanicErrorHandler {
        PanicErrorHandler {
            state: self.state,
            gate: ReportGate::new(),
            error_callback: self.error_callback,
            transport: self.transport.unwrap_or_else(|| Arc::new(Unconfigured)),
            dump: self.dump,
        }
    }
}
