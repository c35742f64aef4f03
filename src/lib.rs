#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Report-once fatal error escalation for long-running data migrations.
//!
//! ## Overview
//!
//! A migration runs many threads at once: a row copier, a binlog streamer, a
//! verifier, and so on. When one of them hits a condition it cannot recover
//! from, the process has to stop, and an operator needs to know *where it
//! stopped*. Several threads often fail at almost the same moment, and they
//! must not all dump state and page someone.
//!
//! This crate provides that escalation path:
//!
//! - exactly one report is produced per handler: a state snapshot written to
//!   standard output, an optional JSON notification to an HTTP endpoint, and
//!   an error log record,
//! - every later fatal error is logged as suppressed and performs no I/O,
//! - the reporting call then panics, so the supervising layer can catch the
//!   unwind, clean up and exit with a non-zero status.
//!
//! ## Quick Example
//!
//! ```
//! use std::panic::{AssertUnwindSafe, catch_unwind};
//!
//! use ferry_fatal::{ErrorHandler, PanicErrorHandler, dump::MemoryDump, is_fatal_panic};
//! use rootcause::{Report, report};
//!
//! let dumps = MemoryDump::new();
//! let handler = PanicErrorHandler::builder(|| -> Result<String, Report> {
//!     Ok(r#"{"CompletedTables":["users"]}"#.to_string())
//! })
//! .dump_channel(dumps.clone())
//! .build();
//!
//! let unwind = catch_unwind(AssertUnwindSafe(|| {
//!     handler.fatal("copier", report!("deadlock detected"));
//! }));
//! assert!(is_fatal_panic(unwind.unwrap_err().as_ref()));
//!
//! // A second fatal error is suppressed and does not unwind.
//! handler.fatal("verifier", report!("checksum mismatch"));
//! assert_eq!(dumps.dumps().len(), 1);
//! ```
//!
//! ## Collaborators
//!
//! The handler does not decide what is fatal, and it does not know how to
//! describe the migration. It relies on:
//!
//! - a [`StateProvider`](state::StateProvider), which serializes the
//!   migration's state on demand,
//! - a [`DumpChannel`](dump::DumpChannel), where that snapshot is written
//!   ([`Stdout`](dump::Stdout) unless configured otherwise),
//! - optionally an [`HttpCallback`](callback::HttpCallback) and a
//!   [`CallbackTransport`](callback::CallbackTransport) that delivers it.
//!   The `ferry-fatal-http` crate provides a reqwest-based transport.
//!
//! Causes are [`rootcause::Report`]s, so any error type converts with
//! `report!(error)` or `.into()` and keeps its attachments and children.
//!
//! ## Logging
//!
//! Every record is emitted through [`tracing`] at `ERROR` level with a
//! `tag = "error_handler"` field, plus `errfrom` (the origin) and `error`
//! (the cause) where they apply. Installing a subscriber is up to the
//! application.
//!
//! ## Supervision
//!
//! Only the first reporter unwinds. A losing caller returns from
//! [`ErrorHandler::fatal`] and relies on the first unwind reaching a process
//! exit. Whatever catches the panic (see [`is_fatal_panic`]) must therefore
//! not resume normal work.

pub mod callback;
pub mod config;
pub mod dump;
mod fatal_ext;
pub mod gate;
pub mod global;
mod handler;
pub mod state;

pub use self::{
    fatal_ext::FatalExt,
    handler::{
        ErrorHandler, FATAL_PANIC_MESSAGE, HandlerBuilder, LOG_TAG, PanicErrorHandler,
        is_fatal_panic,
    },
};
