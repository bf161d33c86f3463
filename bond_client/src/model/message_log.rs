//! Append-only log of display lines.
use std::sync::RwLock;

use bond_common::Result;

/// Ordered, append-only sequence of display strings; most recent last.
///
/// Every append takes the write lock once, so the lines of one message are never
/// interleaved with another delivery and nothing already logged is rewritten.
#[derive(Debug, Default)]
pub struct MessageLog {
    lines: RwLock<Vec<String>>,
}

impl MessageLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `lines` after the latest entry and return the new length.
    pub fn append(&self, lines: &[String]) -> Result<usize> {
        let mut current = self.lines.write()?;
        current.extend_from_slice(lines);
        Ok(current.len())
    }

    /// Copy of every entry in display order.
    pub fn snapshot(&self) -> Result<Vec<String>> {
        Ok(self.lines.read()?.clone())
    }

    /// Number of entries.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lines.read()?.len())
    }

    /// Whether nothing has been logged yet.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lines.read()?.is_empty())
    }
}
