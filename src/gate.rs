//! The single-shot gate deciding which caller performs the fatal report.
//!
//! A [`ReportGate`] is a counter that starts at zero and is incremented once
//! per call to [`ReportGate::enter`]. The caller whose increment moves the
//! counter from zero to one is the *first reporter*; every other caller is
//! told that a report has already been made. There is no way to reset the
//! gate, so a handler instance can report at most once in its lifetime.
//!
//! # Examples
//!
//! ```
//! use ferry_fatal::gate::{Admission, ReportGate};
//!
//! let gate = ReportGate::new();
//! assert_eq!(gate.enter(), Admission::First);
//! assert_eq!(gate.enter(), Admission::Suppressed { attempt: 2 });
//! ```

use core::sync::atomic::{AtomicU64, Ordering};

/// Outcome of entering a [`ReportGate`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    /// This caller was the first through the gate and must do the reporting.
    First,
    /// Someone else already passed the gate.
    Suppressed {
        /// The 1-based position of this caller in the total order of entries.
        attempt: u64,
    },
}

impl Admission {
    /// Returns `true` for [`Admission::First`].
    #[inline]
    pub fn is_first(self) -> bool {
        matches!(self, Admission::First)
    }
}

/// A lock-free, non-resettable "first caller wins" counter.
#[derive(Debug, Default)]
pub struct ReportGate {
    entries: AtomicU64,
}

impl ReportGate {
    /// Creates a gate that nobody has entered yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: AtomicU64::new(0),
        }
    }

    /// Records one entry and reports whether it was the first.
    ///
    /// The increment and the comparison happen in a single `fetch_add`, so
    /// exactly one caller can ever observe [`Admission::First`], no matter
    /// how many threads race here.
    #[inline]
    pub fn enter(&self) -> Admission {
        // AcqRel: the first reporter's side effects happen-before any later
        // entry that observes the incremented value.
        let attempt = self.entries.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        if attempt == 1 {
            Admission::First
        } else {
            Admission::Suppressed { attempt }
        }
    }

    /// Number of times the gate has been entered so far.
    #[inline]
    pub fn entries(&self) -> u64 {
        self.entries.load(Ordering::Acquire)
    }

    /// Whether some caller has already been admitted as first reporter.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.entries() > 0
    }
}
