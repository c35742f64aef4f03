//! The process-state collaborator queried by the first reporter.
//!
//! The long-lived migration context (the "ferry") knows how to describe its
//! own progress. The fatal handler only needs one thing from it: a text
//! snapshot produced on demand. That contract is the [`StateProvider`] trait.
//!
//! Closures work out of the box:
//!
//! ```
//! use ferry_fatal::state::StateProvider;
//! use rootcause::Report;
//!
//! let provider = || -> Result<String, Report> { Ok(r#"{"copied_rows":42}"#.to_string()) };
//! assert_eq!(provider.serialize_state().unwrap(), r#"{"copied_rows":42}"#);
//! ```

use rootcause::Report;

/// Serializes the current process state for a fatal-error report.
///
/// The snapshot is opaque to the handler. It is written verbatim to the dump
/// channel and copied into the notification payload. Implementations may
/// block on I/O; the handler calls this at most once per instance.
pub trait StateProvider: Send + Sync {
    /// Produces a text snapshot of the current state.
    ///
    /// An error here does not stop the report. The handler logs it and
    /// continues with an empty snapshot.
    fn serialize_state(&self) -> Result<String, Report>;
}

impl<F> StateProvider for F
where
    F: Fn() -> Result<String, Report> + Send + Sync,
{
    fn serialize_state(&self) -> Result<String, Report> {
        self()
    }
}
