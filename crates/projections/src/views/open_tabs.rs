//! Open tabs read model: what each table has ordered, been served, and owes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::{MenuItem, Money, TabEvent};
use event_store::{EventEnvelope, Version};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ProjectionError;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;
use crate::Result;

/// A drink on a tab, either waiting to be served or already served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabItem {
    pub menu_number: u32,
    pub description: String,
    pub price: Money,
}

impl From<MenuItem> for TabItem {
    fn from(item: MenuItem) -> Self {
        Self {
            menu_number: item.menu_number,
            description: item.description,
            price: item.price,
        }
    }
}

/// What a table has outstanding and what it has had.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabStatus {
    pub tab_id: AggregateId,
    pub table_number: u32,
    pub waiter: String,
    pub to_serve: Vec<TabItem>,
    pub served: Vec<TabItem>,
}

/// The bill for a table: served drinks only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabInvoice {
    pub tab_id: AggregateId,
    pub table_number: u32,
    pub items: Vec<TabItem>,
    pub total: Money,
    pub has_unserved_items: bool,
}

#[derive(Debug, Clone)]
struct Tab {
    table_number: u32,
    waiter: String,
    to_serve: Vec<TabItem>,
    served: Vec<TabItem>,
}

#[derive(Debug, Default)]
struct OpenTabs {
    tabs: HashMap<AggregateId, Tab>,

    /// Last applied version per aggregate, kept after the tab closes so a
    /// redelivered event for a closed tab is still recognised.
    ///
    /// Holds one entry for every tab seen since the last reset, open or
    /// closed. `reset` (and so `ProjectionProcessor::rebuild_all`) empties it.
    versions: HashMap<AggregateId, Version>,

    position: ProjectionPosition,
}

impl OpenTabs {
    /// Open tab for a table. If several are open, the earliest opened wins.
    fn tab_for_table(&self, table: u32) -> Result<(AggregateId, &Tab)> {
        self.tabs
            .iter()
            .filter(|(_, tab)| tab.table_number == table)
            .min_by_key(|(id, _)| **id)
            .map(|(id, tab)| (*id, tab))
            .ok_or(ProjectionError::NoTabForTable(table))
    }

    fn apply(&mut self, tab_id: AggregateId, event: TabEvent) -> Result<()> {
        if let TabEvent::TabOpened(data) = event {
            self.tabs.insert(
                tab_id,
                Tab {
                    table_number: data.table_number,
                    waiter: data.waiter,
                    to_serve: Vec::new(),
                    served: Vec::new(),
                },
            );
            return Ok(());
        }

        let tab = self
            .tabs
            .get_mut(&tab_id)
            .ok_or(ProjectionError::UnknownTab(tab_id))?;

        match event {
            TabEvent::DrinksOrdered(data) => {
                tab.to_serve.extend(data.items.into_iter().map(TabItem::from));
            }
            TabEvent::DrinksServed(data) => {
                for number in data.menu_numbers {
                    match tab.to_serve.iter().position(|i| i.menu_number == number) {
                        Some(index) => {
                            let item = tab.to_serve.remove(index);
                            tab.served.push(item);
                        }
                        None => tracing::warn!(
                            tab_id = %tab_id,
                            menu_number = number,
                            "Served drink was not waiting to be served"
                        ),
                    }
                }
            }
            TabEvent::TabClosed(_) => {
                self.tabs.remove(&tab_id);
            }
            TabEvent::TabOpened(_) => {}
        }
        Ok(())
    }
}

/// Read model of every open tab.
///
/// Each event is applied under one write lock, so queries never see half of
/// one. Envelopes at or below the last applied version for their tab are
/// ignored; an envelope further ahead is a `SequenceGap` and is not applied.
#[derive(Clone, Default)]
pub struct OpenTabsView {
    state: Arc<RwLock<OpenTabs>>,
}

impl OpenTabsView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table numbers with an open tab, ascending. A table with two open tabs
    /// is listed twice.
    pub async fn active_table_numbers(&self) -> Vec<u32> {
        let state = self.state.read().await;
        let mut tables: Vec<u32> = state.tabs.values().map(|t| t.table_number).collect();
        tables.sort_unstable();
        tables
    }

    pub async fn tab_id_for_table(&self, table: u32) -> Result<AggregateId> {
        let state = self.state.read().await;
        state.tab_for_table(table).map(|(id, _)| id)
    }

    pub async fn tab_for_table(&self, table: u32) -> Result<TabStatus> {
        let state = self.state.read().await;
        let (tab_id, tab) = state.tab_for_table(table)?;
        Ok(TabStatus {
            tab_id,
            table_number: tab.table_number,
            waiter: tab.waiter.clone(),
            to_serve: tab.to_serve.clone(),
            served: tab.served.clone(),
        })
    }

    pub async fn invoice_for_table(&self, table: u32) -> Result<TabInvoice> {
        let state = self.state.read().await;
        let (tab_id, tab) = state.tab_for_table(table)?;
        Ok(TabInvoice {
            tab_id,
            table_number: tab.table_number,
            items: tab.served.clone(),
            total: tab.served.iter().map(|i| i.price).sum(),
            has_unserved_items: !tab.to_serve.is_empty(),
        })
    }

    /// Drinks still to serve, by table, for every open tab the waiter owns.
    /// Tables with nothing outstanding are included with an empty list.
    pub async fn todo_list_for_waiter(&self, waiter: &str) -> BTreeMap<u32, Vec<TabItem>> {
        let state = self.state.read().await;
        let mut todo: BTreeMap<u32, Vec<TabItem>> = BTreeMap::new();
        for tab in state.tabs.values().filter(|t| t.waiter == waiter) {
            todo.entry(tab.table_number)
                .or_default()
                .extend(tab.to_serve.iter().cloned());
        }
        todo
    }

    /// Last version applied for the aggregate, 0 if none.
    pub async fn last_version(&self, aggregate_id: AggregateId) -> Version {
        let state = self.state.read().await;
        state.versions.get(&aggregate_id).copied().unwrap_or_default()
    }
}

#[async_trait]
impl Projection for OpenTabsView {
    fn name(&self) -> &'static str {
        "OpenTabsView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let aggregate_id = event.aggregate_id;
        let mut state = self.state.write().await;

        let last = state
            .versions
            .get(&aggregate_id)
            .copied()
            .unwrap_or_default();
        if event.version <= last {
            metrics::counter!("projection_duplicates_total").increment(1);
            tracing::debug!(
                aggregate_id = %aggregate_id,
                version = %event.version,
                "Ignoring already applied event"
            );
            return Ok(());
        }
        if event.version != last.next() {
            return Err(ProjectionError::SequenceGap {
                aggregate_id,
                expected: last.next(),
                received: event.version,
            });
        }

        let tab_event: TabEvent = event.decode()?;
        state.apply(aggregate_id, tab_event)?;

        state.versions.insert(aggregate_id, event.version);
        state.position = state.position.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        *self.state.write().await = OpenTabs::default();
        Ok(())
    }
}

#[async_trait]
impl ReadModel for OpenTabsView {
    fn name(&self) -> &'static str {
        "OpenTabsView"
    }

    async fn count(&self) -> usize {
        self.state.read().await.tabs.len()
    }
}
