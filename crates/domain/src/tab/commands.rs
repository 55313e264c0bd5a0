//! Tab commands.

use common::AggregateId;

use crate::dispatcher::Command;

use super::{MenuItem, Money};

/// Intents a caller can issue against a tab.
///
/// Every variant names the tab it targets. External references such as menu
/// numbers are already resolved into full line items by the time a
/// `PlaceOrder` is built.
#[derive(Debug, Clone, PartialEq)]
pub enum TabCommand {
    OpenTab {
        tab_id: AggregateId,
        table_number: u32,
        waiter: String,
    },
    PlaceOrder {
        tab_id: AggregateId,
        items: Vec<MenuItem>,
    },
    MarkDrinksServed {
        tab_id: AggregateId,
        menu_numbers: Vec<u32>,
    },
    CloseTab {
        tab_id: AggregateId,
        amount_paid: Money,
    },
}

impl TabCommand {
    /// Opens a tab under a freshly generated id.
    pub fn open_tab(table_number: u32, waiter: impl Into<String>) -> Self {
        TabCommand::OpenTab {
            tab_id: AggregateId::new(),
            table_number,
            waiter: waiter.into(),
        }
    }

    pub fn place_order(tab_id: AggregateId, items: Vec<MenuItem>) -> Self {
        TabCommand::PlaceOrder { tab_id, items }
    }

    pub fn mark_drinks_served(tab_id: AggregateId, menu_numbers: Vec<u32>) -> Self {
        TabCommand::MarkDrinksServed {
            tab_id,
            menu_numbers,
        }
    }

    pub fn close_tab(tab_id: AggregateId, amount_paid: Money) -> Self {
        TabCommand::CloseTab {
            tab_id,
            amount_paid,
        }
    }
}

impl Command for TabCommand {
    fn aggregate_id(&self) -> AggregateId {
        match self {
            TabCommand::OpenTab { tab_id, .. }
            | TabCommand::PlaceOrder { tab_id, .. }
            | TabCommand::MarkDrinksServed { tab_id, .. }
            | TabCommand::CloseTab { tab_id, .. } => *tab_id,
        }
    }

    fn command_type(&self) -> &'static str {
        match self {
            TabCommand::OpenTab { .. } => "OpenTab",
            TabCommand::PlaceOrder { .. } => "PlaceOrder",
            TabCommand::MarkDrinksServed { .. } => "MarkDrinksServed",
            TabCommand::CloseTab { .. } => "CloseTab",
        }
    }
}
