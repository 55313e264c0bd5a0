//! Tab domain events.

use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{MenuItem, Money};

/// Facts recorded on a tab aggregate.
///
/// Serialized adjacently tagged so the variant name doubles as the stored
/// `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TabEvent {
    TabOpened(TabOpenedData),
    DrinksOrdered(DrinksOrderedData),
    DrinksServed(DrinksServedData),
    TabClosed(TabClosedData),
}

impl DomainEvent for TabEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TabEvent::TabOpened(_) => "TabOpened",
            TabEvent::DrinksOrdered(_) => "DrinksOrdered",
            TabEvent::DrinksServed(_) => "DrinksServed",
            TabEvent::TabClosed(_) => "TabClosed",
        }
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            TabEvent::TabOpened(data) => data.tab_id,
            TabEvent::DrinksOrdered(data) => data.tab_id,
            TabEvent::DrinksServed(data) => data.tab_id,
            TabEvent::TabClosed(data) => data.tab_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabOpenedData {
    pub tab_id: AggregateId,
    pub table_number: u32,
    pub waiter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrinksOrderedData {
    pub tab_id: AggregateId,

    /// Line items in the order they were submitted.
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrinksServedData {
    pub tab_id: AggregateId,

    /// One entry per drink served; repeats mean several of the same drink.
    pub menu_numbers: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabClosedData {
    pub tab_id: AggregateId,
    pub amount_paid: Money,

    /// Total price of everything served.
    pub order_amount: Money,

    /// `amount_paid - order_amount`, never negative.
    pub tip: Money,
}

// Event constructors
impl TabEvent {
    pub fn tab_opened(tab_id: AggregateId, table_number: u32, waiter: impl Into<String>) -> Self {
        TabEvent::TabOpened(TabOpenedData {
            tab_id,
            table_number,
            waiter: waiter.into(),
        })
    }

    pub fn drinks_ordered(tab_id: AggregateId, items: Vec<MenuItem>) -> Self {
        TabEvent::DrinksOrdered(DrinksOrderedData { tab_id, items })
    }

    pub fn drinks_served(tab_id: AggregateId, menu_numbers: Vec<u32>) -> Self {
        TabEvent::DrinksServed(DrinksServedData {
            tab_id,
            menu_numbers,
        })
    }

    pub fn tab_closed(tab_id: AggregateId, amount_paid: Money, order_amount: Money) -> Self {
        TabEvent::TabClosed(TabClosedData {
            tab_id,
            amount_paid,
            order_amount,
            tip: amount_paid - order_amount,
        })
    }
}
