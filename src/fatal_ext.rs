use rootcause::Report;

use crate::handler::ErrorHandler;

/// Extension trait escalating the error of a [`Result`] as fatal.
///
/// # Examples
///
/// ```
/// use ferry_fatal::{FatalExt, PanicErrorHandler};
/// use rootcause::Report;
///
/// let handler = PanicErrorHandler::new(|| -> Result<String, Report> { Ok("{}".into()) });
///
/// let rows: Result<u64, std::io::Error> = Ok(12);
/// assert_eq!(rows.or_fatal(&handler, "copier"), Some(12));
/// ```
pub trait FatalExt<T> {
    /// Returns the success value, or reports the error through `handler`.
    ///
    /// If this call is the first fatal report it panics like
    /// [`ErrorHandler::fatal`]. If an earlier fatal error was already
    /// reported it returns `None`; the caller should stop what it is doing,
    /// since the process is already going down.
    #[track_caller]
    fn or_fatal<H: ErrorHandler + ?Sized>(self, handler: &H, origin: &str) -> Option<T>;
}

impl<T, E> FatalExt<T> for Result<T, E>
where
    E: Into<Report>,
{
    #[track_caller]
    fn or_fatal<H: ErrorHandler + ?Sized>(self, handler: &H, origin: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                handler.fatal(origin, error.into());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        panic::{AssertUnwindSafe, catch_unwind},
    };

    use rootcause::report;

    use super::*;
    use crate::{PanicErrorHandler, dump::MemoryDump, handler::is_fatal_panic};

    fn handler() -> PanicErrorHandler {
        PanicErrorHandler::builder(|| -> Result<String, Report> { Ok("{}".into()) })
            .dump_channel(MemoryDump::new())
            .build()
    }

    #[test]
    fn test_ok_passes_through_without_reporting() {
        let handler = handler();
        let value: Result<&str, Report> = Ok("row");
        assert_eq!(value.or_fatal(&handler, "copier"), Some("row"));
        assert!(!handler.reported());
    }

    #[test]
    fn test_first_error_panics_and_later_ones_return_none() {
        let handler = handler();

        let payload = catch_unwind(AssertUnwindSafe(|| {
            let failed: Result<(), io::Error> =
                Err(io::Error::new(io::ErrorKind::TimedOut, "lock wait timeout"));
            failed.or_fatal(&handler, "copier")
        }))
        .unwrap_err();
        assert!(is_fatal_panic(payload.as_ref()));

        let failed: Result<(), Report> = Err(report!("replication lag too high"));
        assert_eq!(failed.or_fatal(&handler, "binlog_streamer"), None);
    }
}
