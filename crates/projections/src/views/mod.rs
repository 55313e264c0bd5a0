//! Read model views for the query side.

pub mod open_tabs;

pub use open_tabs::{OpenTabsView, TabInvoice, TabItem, TabStatus};
