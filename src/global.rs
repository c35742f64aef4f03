//! A process-wide fatal-error handler.
//!
//! Most call sites are handed a handler explicitly. Deep inside a migration,
//! threading a reference through every layer is not always practical, so one
//! handler can be installed for the whole process and reached through
//! [`fatal`]. The slot can be filled once and is never replaced, which keeps
//! the handler's report-once gate meaningful for the life of the process.
//!
//! ```
//! use ferry_fatal::{PanicErrorHandler, global};
//! use rootcause::Report;
//!
//! let handler = PanicErrorHandler::new(|| -> Result<String, Report> { Ok("{}".into()) });
//! global::install(handler).expect("fatal handler installed twice");
//! assert!(global::handler().is_some());
//! ```

use core::fmt;
use std::sync::OnceLock;

use rootcause::Report;

use crate::handler::{ErrorHandler, FATAL_PANIC_MESSAGE, LOG_TAG};

static GLOBAL_HANDLER: OnceLock<Box<dyn ErrorHandler>> = OnceLock::new();

/// Error returned when a process-wide handler is already installed.
///
/// Contains the handler that was rejected so it can still be used locally.
pub struct HandlerAlreadyInstalledError(pub Box<dyn ErrorHandler>);

impl fmt::Debug for HandlerAlreadyInstalledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerAlreadyInstalledError").finish()
    }
}

impl fmt::Display for HandlerAlreadyInstalledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a fatal error handler is already installed globally")
    }
}

impl core::error::Error for HandlerAlreadyInstalledError {}

/// Installs `handler` for the rest of the process.
pub fn install<H: ErrorHandler + 'static>(handler: H) -> Result<(), HandlerAlreadyInstalledError> {
    GLOBAL_HANDLER
        .set(Box::new(handler))
        .map_err(HandlerAlreadyInstalledError)
}

/// The installed handler, if any.
pub fn handler() -> Option<&'static dyn ErrorHandler> {
    GLOBAL_HANDLER.get().map(|handler| &**handler)
}

/// Calls [`ErrorHandler::fatal`] on the installed handler.
///
/// Without an installed handler the error is logged and the calling path
/// panics unconditionally.
#[track_caller]
pub fn fatal(origin: &str, cause: Report) {
    match handler() {
        Some(handler) => handler.fatal(origin, cause),
        None => {
            tracing::error!(
                tag = LOG_TAG,
                errfrom = origin,
                error = %cause,
                "fatal error detected without an installed handler"
            );
            std::panic::panic_any(FATAL_PANIC_MESSAGE);
        }
    }
}
