//! Tab aggregate implementation.

use std::collections::HashMap;

use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};

use super::{
    MenuItem, Money, TabCommand, TabError, TabEvent, TabState,
    events::{DrinksOrderedData, DrinksServedData, TabOpenedData},
};

/// Tab aggregate root.
///
/// Tracks one tab from opening to payment. State is only ever produced by
/// folding `TabEvent`s; commands read it and return new events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabAggregate {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    state: TabState,

    table_number: Option<u32>,

    waiter: Option<String>,

    /// Ordered but not yet served, in order of arrival.
    outstanding: Vec<MenuItem>,

    /// Running total of everything served.
    served_amount: Money,
}

impl Aggregate for TabAggregate {
    type Event = TabEvent;
    type Command = TabCommand;
    type Error = TabError;

    fn aggregate_type() -> &'static str {
        "Tab"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            TabEvent::TabOpened(data) => self.apply_tab_opened(data),
            TabEvent::DrinksOrdered(data) => self.apply_drinks_ordered(data),
            TabEvent::DrinksServed(data) => self.apply_drinks_served(data),
            TabEvent::TabClosed(_) => {
                self.state = TabState::Closed;
            }
        }
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TabCommand::OpenTab {
                tab_id,
                table_number,
                waiter,
            } => self.open(*tab_id, *table_number, waiter),
            TabCommand::PlaceOrder { tab_id, items } => self.place_order(*tab_id, items),
            TabCommand::MarkDrinksServed {
                tab_id,
                menu_numbers,
            } => self.mark_served(*tab_id, menu_numbers),
            TabCommand::CloseTab {
                tab_id,
                amount_paid,
            } => self.close(*tab_id, *amount_paid),
        }
    }
}

impl SnapshotCapable for TabAggregate {}

// Query methods
impl TabAggregate {
    pub fn state(&self) -> TabState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn table_number(&self) -> Option<u32> {
        self.table_number
    }

    pub fn waiter(&self) -> Option<&str> {
        self.waiter.as_deref()
    }

    /// Drinks ordered but not yet served.
    pub fn outstanding(&self) -> &[MenuItem] {
        &self.outstanding
    }

    pub fn served_amount(&self) -> Money {
        self.served_amount
    }
}

// Command methods (return events)
impl TabAggregate {
    fn open(
        &self,
        tab_id: AggregateId,
        table_number: u32,
        waiter: &str,
    ) -> Result<Vec<TabEvent>, TabError> {
        if self.state != TabState::NoTab {
            return Err(TabError::TabAlreadyOpened);
        }
        Ok(vec![TabEvent::tab_opened(tab_id, table_number, waiter)])
    }

    fn place_order(
        &self,
        tab_id: AggregateId,
        items: &[MenuItem],
    ) -> Result<Vec<TabEvent>, TabError> {
        if !self.is_open() {
            return Err(TabError::TabNotOpen);
        }

        // Served plus outstanding plus the new items must stay representable,
        // so serving and closing never overflow.
        let total = self
            .outstanding
            .iter()
            .chain(items)
            .try_fold(self.served_amount, |acc, item| acc.checked_add(item.price));
        if total.is_none() {
            return Err(TabError::TotalTooLarge {
                limit: Money::from_cents(i64::MAX),
            });
        }

        Ok(vec![TabEvent::drinks_ordered(tab_id, items.to_vec())])
    }

    fn mark_served(
        &self,
        tab_id: AggregateId,
        menu_numbers: &[u32],
    ) -> Result<Vec<TabEvent>, TabError> {
        if !self.is_open() {
            return Err(TabError::TabNotOpen);
        }

        let offending = self.not_outstanding(menu_numbers);
        if !offending.is_empty() {
            return Err(TabError::ItemsNotOrdered { offending });
        }

        if menu_numbers.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![TabEvent::drinks_served(tab_id, menu_numbers.to_vec())])
    }

    fn close(&self, tab_id: AggregateId, amount_paid: Money) -> Result<Vec<TabEvent>, TabError> {
        if !self.is_open() {
            return Err(TabError::TabNotOpen);
        }
        if !self.outstanding.is_empty() {
            return Err(TabError::UnservedItemsRemain {
                count: self.outstanding.len(),
            });
        }
        if amount_paid < self.served_amount {
            return Err(TabError::InsufficientPayment {
                served_total: self.served_amount,
                amount_paid,
            });
        }

        Ok(vec![TabEvent::tab_closed(
            tab_id,
            amount_paid,
            self.served_amount,
        )])
    }

    /// Requested numbers beyond what is outstanding, in request order.
    ///
    /// A number requested more times than it was ordered is reported once per
    /// surplus request.
    fn not_outstanding(&self, menu_numbers: &[u32]) -> Vec<u32> {
        let mut available: HashMap<u32, usize> = HashMap::new();
        for item in &self.outstanding {
            *available.entry(item.menu_number).or_default() += 1;
        }

        let mut offending = Vec::new();
        for &number in menu_numbers {
            match available.get_mut(&number) {
                Some(count) if *count > 0 => *count -= 1,
                _ => offending.push(number),
            }
        }
        offending
    }
}

// Apply event helpers
impl TabAggregate {
    fn apply_tab_opened(&mut self, data: TabOpenedData) {
        self.id = Some(data.tab_id);
        self.table_number = Some(data.table_number);
        self.waiter = Some(data.waiter);
        self.state = TabState::Open;
    }

    fn apply_drinks_ordered(&mut self, data: DrinksOrderedData) {
        self.outstanding.extend(data.items);
    }

    /// Each served number consumes the earliest outstanding line item with
    /// that number.
    fn apply_drinks_served(&mut self, data: DrinksServedData) {
        for number in data.menu_numbers {
            if let Some(pos) = self
                .outstanding
                .iter()
                .position(|item| item.menu_number == number)
            {
                let item = self.outstanding.remove(pos);
                self.served_amount += item.price;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beer() -> MenuItem {
        MenuItem::new(11, "beer", Money::from_cents(150))
    }

    fn water() -> MenuItem {
        MenuItem::new(12, "water", Money::from_cents(100))
    }

    fn open_tab(id: AggregateId) -> TabAggregate {
        TabAggregate::replay(vec![TabEvent::tab_opened(id, 5, "w1")])
    }

    fn apply_all(tab: &mut TabAggregate, events: Vec<TabEvent>) {
        tab.apply_events(events);
    }

    #[test]
    fn open_tab_on_fresh_aggregate() {
        let id = AggregateId::new();
        let tab = TabAggregate::default();

        let events = tab
            .handle(&TabCommand::OpenTab {
                tab_id: id,
                table_number: 5,
                waiter: "w1".to_string(),
            })
            .unwrap();
        assert_eq!(events, vec![TabEvent::tab_opened(id, 5, "w1")]);
    }

    #[test]
    fn open_tab_twice_is_rejected() {
        let id = AggregateId::new();
        let tab = open_tab(id);
        let result = tab.handle(&TabCommand::OpenTab {
            tab_id: id,
            table_number: 6,
            waiter: "w2".to_string(),
        });
        assert_eq!(result, Err(TabError::TabAlreadyOpened));
    }

    #[test]
    fn apply_tab_opened_sets_details() {
        let id = AggregateId::new();
        let tab = open_tab(id);

        assert_eq!(tab.id(), Some(id));
        assert_eq!(tab.state(), TabState::Open);
        assert_eq!(tab.table_number(), Some(5));
        assert_eq!(tab.waiter(), Some("w1"));
        assert_eq!(tab.version(), Version::first());
    }

    #[test]
    fn place_order_requires_open_tab() {
        let tab = TabAggregate::default();
        let result = tab.handle(&TabCommand::place_order(AggregateId::new(), vec![beer()]));
        assert_eq!(result, Err(TabError::TabNotOpen));
    }

    #[test]
    fn place_order_carries_items_verbatim() {
        let id = AggregateId::new();
        let tab = open_tab(id);
        let items = vec![beer(), water(), beer()];

        let events = tab
            .handle(&TabCommand::place_order(id, items.clone()))
            .unwrap();
        assert_eq!(events, vec![TabEvent::drinks_ordered(id, items)]);
    }

    #[test]
    fn orders_accumulate_outstanding_items() {
        let id = AggregateId::new();
        let mut tab = open_tab(id);
        apply_all(
            &mut tab,
            vec![
                TabEvent::drinks_ordered(id, vec![beer()]),
                TabEvent::drinks_ordered(id, vec![water(), beer()]),
            ],
        );
        assert_eq!(tab.outstanding(), &[beer(), water(), beer()]);
    }

    #[test]
    fn serve_reports_every_offending_number() {
        let id = AggregateId::new();
        let mut tab = open_tab(id);
        apply_all(&mut tab, vec![TabEvent::drinks_ordered(id, vec![beer()])]);

        let result = tab.handle(&TabCommand::mark_drinks_served(id, vec![11, 11, 13]));
        assert_eq!(
            result,
            Err(TabError::ItemsNotOrdered {
                offending: vec![11, 13]
            })
        );
    }

    #[test]
    fn serve_respects_ordered_counts() {
        let id = AggregateId::new();
        let mut tab = open_tab(id);
        apply_all(
            &mut tab,
            vec![TabEvent::drinks_ordered(id, vec![beer(), beer()])],
        );

        let events = tab
            .handle(&TabCommand::mark_drinks_served(id, vec![11, 11]))
            .unwrap();
        assert_eq!(events, vec![TabEvent::drinks_served(id, vec![11, 11])]);
    }

    #[test]
    fn serve_nothing_emits_nothing() {
        let id = AggregateId::new();
        let tab = open_tab(id);
        let events = tab
            .handle(&TabCommand::mark_drinks_served(id, vec![]))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn serving_moves_price_into_served_amount() {
        let id = AggregateId::new();
        let mut tab = open_tab(id);
        apply_all(
            &mut tab,
            vec![
                TabEvent::drinks_ordered(id, vec![beer(), water(), beer()]),
                TabEvent::drinks_served(id, vec![11]),
            ],
        );

        assert_eq!(tab.outstanding(), &[water(), beer()]);
        assert_eq!(tab.served_amount(), Money::from_cents(150));
    }

    #[test]
    fn close_with_exact_payment_has_zero_tip() {
        let id = AggregateId::new();
        let mut tab = open_tab(id);
        apply_all(
            &mut tab,
            vec![
                TabEvent::drinks_ordered(id, vec![beer(), water()]),
                TabEvent::drinks_served(id, vec![11, 12]),
            ],
        );

        let events = tab
            .handle(&TabCommand::close_tab(id, Money::from_cents(250)))
            .unwrap();
        assert_eq!(
            events,
            vec![TabEvent::tab_closed(
                id,
                Money::from_cents(250),
                Money::from_cents(250)
            )]
        );
    }

    #[test]
    fn close_checks_run_in_order() {
        let id = AggregateId::new();

        let fresh = TabAggregate::default();
        assert_eq!(
            fresh.handle(&TabCommand::close_tab(id, Money::from_cents(1000))),
            Err(TabError::TabNotOpen)
        );

        let mut tab = open_tab(id);
        apply_all(
            &mut tab,
            vec![
                TabEvent::drinks_ordered(id, vec![beer(), water()]),
                TabEvent::drinks_served(id, vec![11]),
            ],
        );
        // Unserved items win over a short payment
        assert_eq!(
            tab.handle(&TabCommand::close_tab(id, Money::zero())),
            Err(TabError::UnservedItemsRemain { count: 1 })
        );

        apply_all(&mut tab, vec![TabEvent::drinks_served(id, vec![12])]);
        assert_eq!(
            tab.handle(&TabCommand::close_tab(id, Money::from_cents(249))),
            Err(TabError::InsufficientPayment {
                served_total: Money::from_cents(250),
                amount_paid: Money::from_cents(249),
            })
        );
    }

    #[test]
    fn closed_tab_accepts_nothing() {
        let id = AggregateId::new();
        let mut tab = open_tab(id);
        apply_all(
            &mut tab,
            vec![TabEvent::tab_closed(id, Money::zero(), Money::zero())],
        );
        assert!(tab.state().is_terminal());

        assert_eq!(
            tab.handle(&TabCommand::place_order(id, vec![beer()])),
            Err(TabError::TabNotOpen)
        );
        assert_eq!(
            tab.handle(&TabCommand::mark_drinks_served(id, vec![])),
            Err(TabError::TabNotOpen)
        );
        assert_eq!(
            tab.handle(&TabCommand::close_tab(id, Money::zero())),
            Err(TabError::TabNotOpen)
        );
        assert_eq!(
            tab.handle(&TabCommand::OpenTab {
                tab_id: id,
                table_number: 5,
                waiter: "w1".to_string()
            }),
            Err(TabError::TabAlreadyOpened)
        );
    }

    #[test]
    fn serving_before_any_tab_is_not_open_rather_than_not_ordered() {
        let tab = TabAggregate::default();
        let result = tab.handle(&TabCommand::mark_drinks_served(AggregateId::new(), vec![11]));
        assert_eq!(result, Err(TabError::TabNotOpen));
    }

    #[test]
    fn order_that_would_overflow_the_tab_total_is_rejected() {
        let id = AggregateId::new();
        let mut tab = open_tab(id);
        let pricey = MenuItem::new(1, "vintage", Money::from_cents(i64::MAX));

        let events = tab
            .handle(&TabCommand::place_order(id, vec![pricey.clone()]))
            .unwrap();
        apply_all(&mut tab, events);

        assert_eq!(
            tab.handle(&TabCommand::place_order(id, vec![pricey.clone()])),
            Err(TabError::TotalTooLarge {
                limit: Money::from_cents(i64::MAX)
            })
        );
        assert_eq!(
            tab.handle(&TabCommand::place_order(id, vec![beer()])),
            Err(TabError::TotalTooLarge {
                limit: Money::from_cents(i64::MAX)
            })
        );
    }

    #[test]
    fn replaying_amounts_past_the_money_range_does_not_panic() {
        let id = AggregateId::new();
        let pricey = MenuItem::new(1, "vintage", Money::from_cents(i64::MAX));
        let tab = TabAggregate::replay(vec![
            TabEvent::tab_opened(id, 5, "w1"),
            TabEvent::drinks_ordered(id, vec![pricey.clone(), pricey]),
            TabEvent::drinks_served(id, vec![1, 1]),
        ]);

        assert!(tab.outstanding().is_empty());
        assert_eq!(tab.served_amount(), Money::from_cents(i64::MAX));
    }

    #[test]
    fn snapshot_round_trip_preserves_state() {
        let id = AggregateId::new();
        let mut tab = open_tab(id);
        apply_all(
            &mut tab,
            vec![TabEvent::drinks_ordered(id, vec![beer(), water()])],
        );

        let json = serde_json::to_value(&tab).unwrap();
        let restored: TabAggregate = serde_json::from_value(json).unwrap();
        assert_eq!(restored, tab);
    }
}
