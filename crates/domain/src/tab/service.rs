//! Tab service providing a simplified API for tab operations.

use common::AggregateId;
use event_bus::EventBus;
use event_store::EventStore;

use crate::dispatcher::{Command, CommandDispatcher, CommandResult};
use crate::error::{DispatchError, ServiceError};
use crate::retry::RetryPolicy;

use super::{MenuItem, MenuRepository, Money, TabAggregate, TabCommand};

/// Service for managing tabs.
///
/// One method per command. Each re-dispatches on a concurrency conflict
/// according to the service's retry policy; every other error is returned
/// as-is.
pub struct TabService<S: EventStore, B: EventBus> {
    dispatcher: CommandDispatcher<S, B>,
    retry: RetryPolicy,
}

impl<S: EventStore, B: EventBus> TabService<S, B> {
    pub fn new(dispatcher: CommandDispatcher<S, B>) -> Self {
        Self::with_retry(dispatcher, RetryPolicy::default())
    }

    pub fn with_retry(dispatcher: CommandDispatcher<S, B>, retry: RetryPolicy) -> Self {
        Self { dispatcher, retry }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Opens a tab and returns its id.
    #[tracing::instrument(skip(self))]
    pub async fn open_tab(
        &self,
        table_number: u32,
        waiter: &str,
    ) -> Result<AggregateId, DispatchError> {
        let command = TabCommand::open_tab(table_number, waiter);
        let tab_id = command.aggregate_id();
        self.dispatch_with_retry(command, &self.retry).await?;
        Ok(tab_id)
    }

    #[tracing::instrument(skip(self, items), fields(items = items.len()))]
    pub async fn place_order(
        &self,
        tab_id: AggregateId,
        items: Vec<MenuItem>,
    ) -> Result<CommandResult<TabAggregate>, DispatchError> {
        self.dispatch_with_retry(TabCommand::place_order(tab_id, items), &self.retry)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_drinks_served(
        &self,
        tab_id: AggregateId,
        menu_numbers: Vec<u32>,
    ) -> Result<CommandResult<TabAggregate>, DispatchError> {
        self.dispatch_with_retry(
            TabCommand::mark_drinks_served(tab_id, menu_numbers),
            &self.retry,
        )
        .await
    }

    #[tracing::instrument(skip(self), fields(amount_paid = %amount_paid))]
    pub async fn close_tab(
        &self,
        tab_id: AggregateId,
        amount_paid: Money,
    ) -> Result<CommandResult<TabAggregate>, DispatchError> {
        self.dispatch_with_retry(TabCommand::close_tab(tab_id, amount_paid), &self.retry)
            .await
    }

    /// Resolves menu numbers through `menu`, then places the order.
    #[tracing::instrument(skip(self, menu))]
    pub async fn place_order_from_menu<M: MenuRepository + ?Sized>(
        &self,
        menu: &M,
        tab_id: AggregateId,
        menu_numbers: &[u32],
    ) -> Result<CommandResult<TabAggregate>, ServiceError> {
        let items = menu.read_items(menu_numbers).await?;
        Ok(self.place_order(tab_id, items).await?)
    }

    /// Loads the current state of a tab.
    ///
    /// Returns None if the tab was never opened.
    pub async fn get_tab(&self, tab_id: AggregateId) -> Result<Option<TabAggregate>, DispatchError> {
        let tab = self.dispatcher.load(tab_id).await?;
        Ok(tab.table_number().is_some().then_some(tab))
    }

    /// Dispatches `command`, trying again on concurrency conflicts only.
    ///
    /// Each retry reloads the aggregate, so the command is re-validated
    /// against whatever the winning writer appended.
    pub async fn dispatch_with_retry(
        &self,
        command: TabCommand,
        policy: &RetryPolicy,
    ) -> Result<CommandResult<TabAggregate>, DispatchError> {
        let attempts = policy.attempts();
        let mut attempt = 1;
        loop {
            match self.dispatcher.dispatch(command.clone()).await {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = policy.delay_after(attempt);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying command after conflict"
                    );
                    metrics::counter!("command_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
