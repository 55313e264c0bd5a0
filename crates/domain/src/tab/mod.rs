//! Tab aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod menu;
mod service;
mod state;
mod value_objects;

pub use aggregate::TabAggregate;
pub use commands::TabCommand;
pub use events::{DrinksOrderedData, DrinksServedData, TabClosedData, TabEvent, TabOpenedData};
pub use menu::{InMemoryMenu, MenuError, MenuRepository};
pub use service::TabService;
pub use state::TabState;
pub use value_objects::{MenuItem, Money, MoneyParseError};

use thiserror::Error;

/// Reasons a tab rejects a command.
///
/// All of these are detected before anything is written and are returned to
/// the caller unchanged. Retrying the same command will not help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TabError {
    /// The tab has not been opened, or is already closed.
    #[error("Tab is not open")]
    TabNotOpen,

    /// OpenTab on an aggregate that already has a tab.
    #[error("Tab has already been opened")]
    TabAlreadyOpened,

    /// Some of the drinks to serve are not outstanding.
    #[error("Cannot serve drinks that were not ordered: {offending:?}")]
    ItemsNotOrdered { offending: Vec<u32> },

    #[error("Cannot close tab with {count} unserved items")]
    UnservedItemsRemain { count: usize },

    /// The tab total would not fit in a `Money`.
    #[error("Order would take the tab total past {limit}")]
    TotalTooLarge { limit: Money },

    #[error("Insufficient payment: served total is {served_total}, paid {amount_paid}")]
    InsufficientPayment {
        served_total: Money,
        amount_paid: Money,
    },
}
