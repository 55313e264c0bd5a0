//! Tab lifecycle.

use serde::{Deserialize, Serialize};

/// The state of a tab in its lifecycle.
///
/// ```text
/// NoTab ──► Open ──► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TabState {
    /// Nothing has happened on this aggregate yet.
    #[default]
    NoTab,

    /// Drinks can be ordered and served.
    Open,

    /// Paid and closed (terminal state).
    Closed,
}

impl TabState {
    pub fn is_open(&self) -> bool {
        matches!(self, TabState::Open)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TabState::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TabState::NoTab => "NoTab",
            TabState::Open => "Open",
            TabState::Closed => "Closed",
        }
    }
}

impl std::fmt::Display for TabState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
