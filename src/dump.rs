//! Where the first reporter writes the state snapshot.
//!
//! Operators capture the dump from a well-known local stream, which is
//! standard output by default. The snapshot is written verbatim, followed by
//! a newline.

use std::{
    fmt,
    io::{self, Write},
    sync::{Arc, Mutex},
};

/// A local sink for the state snapshot.
pub trait DumpChannel: Send + Sync + 'static {
    /// Writes `dump` followed by a newline.
    fn emit(&self, dump: &str) -> io::Result<()>;
}

/// Writes dumps to the process standard output.
#[derive(Copy, Clone, Debug, Default)]
pub struct Stdout;

impl DumpChannel for Stdout {
    fn emit(&self, dump: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{dump}")?;
        out.flush()
    }
}

/// Keeps every emitted dump in memory.
///
/// Clones share the same buffer, so one clone can be handed to the handler
/// while another is inspected afterwards.
#[derive(Clone, Default)]
pub struct MemoryDump(Arc<Mutex<Vec<String>>>);

impl MemoryDump {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// The dumps emitted so far, oldest first.
    pub fn dumps(&self) -> Vec<String> {
        match self.0.lock() {
            Ok(dumps) => dumps.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl fmt::Debug for MemoryDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDump")
            .field("dumps", &self.dumps().len())
            .finish()
    }
}

impl DumpChannel for MemoryDump {
    fn emit(&self, dump: &str) -> io::Result<()> {
        let mut dumps = match self.0.lock() {
            Ok(dumps) => dumps,
            Err(poisoned) => poisoned.into_inner(),
        };
        dumps.push(dump.to_owned());
        Ok(())
    }
}
