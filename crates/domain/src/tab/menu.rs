//! Menu lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use super::MenuItem;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MenuError {
    /// Requested menu numbers that are not on the menu, in request order.
    #[error("Unknown menu items: {0:?}")]
    UnknownMenuItems(Vec<u32>),

    #[error("Menu unavailable: {0}")]
    Unavailable(String),
}

/// Source of menu items, consulted before an order is placed.
#[async_trait]
pub trait MenuRepository: Send + Sync {
    /// Resolves menu numbers to items.
    ///
    /// The result follows the request order, one item per requested number,
    /// so a repeated number yields repeated items.
    async fn read_items(&self, menu_numbers: &[u32]) -> Result<Vec<MenuItem>, MenuError>;

    /// Every item on the menu, ordered by menu number.
    async fn read_all_items(&self) -> Result<Vec<MenuItem>, MenuError>;
}

#[async_trait]
impl<M: MenuRepository + ?Sized> MenuRepository for Arc<M> {
    async fn read_items(&self, menu_numbers: &[u32]) -> Result<Vec<MenuItem>, MenuError> {
        (**self).read_items(menu_numbers).await
    }

    async fn read_all_items(&self) -> Result<Vec<MenuItem>, MenuError> {
        (**self).read_all_items().await
    }
}

/// Menu held in memory.
#[derive(Clone, Default)]
pub struct InMemoryMenu {
    items: Arc<RwLock<BTreeMap<u32, MenuItem>>>,
}

impl InMemoryMenu {
    pub fn new(items: impl IntoIterator<Item = MenuItem>) -> Self {
        let items = items
            .into_iter()
            .map(|item| (item.menu_number, item))
            .collect();
        Self {
            items: Arc::new(RwLock::new(items)),
        }
    }

    /// Adds an item, replacing any item with the same number.
    pub async fn insert(&self, item: MenuItem) {
        self.items.write().await.insert(item.menu_number, item);
    }
}

#[async_trait]
impl MenuRepository for InMemoryMenu {
    async fn read_items(&self, menu_numbers: &[u32]) -> Result<Vec<MenuItem>, MenuError> {
        let items = self.items.read().await;

        let mut found = Vec::with_capacity(menu_numbers.len());
        let mut unknown = Vec::new();
        for number in menu_numbers {
            match items.get(number) {
                Some(item) => found.push(item.clone()),
                None => unknown.push(*number),
            }
        }

        if unknown.is_empty() {
            Ok(found)
        } else {
            Err(MenuError::UnknownMenuItems(unknown))
        }
    }

    async fn read_all_items(&self) -> Result<Vec<MenuItem>, MenuError> {
        Ok(self.items.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tab::Money;

    fn menu() -> InMemoryMenu {
        InMemoryMenu::new([
            MenuItem::new(12, "water", Money::from_cents(100)),
            MenuItem::new(11, "beer", Money::from_cents(150)),
        ])
    }

    #[tokio::test]
    async fn read_items_keeps_order_and_repeats() {
        let items = menu().read_items(&[12, 11, 12]).await.unwrap();
        let numbers: Vec<_> = items.iter().map(|i| i.menu_number).collect();
        assert_eq!(numbers, vec![12, 11, 12]);
    }

    #[tokio::test]
    async fn unknown_numbers_are_all_reported() {
        let err = menu().read_items(&[11, 40, 41]).await.unwrap_err();
        assert_eq!(err, MenuError::UnknownMenuItems(vec![40, 41]));
    }

    #[tokio::test]
    async fn read_all_is_sorted() {
        let menu = menu();
        menu.insert(MenuItem::new(3, "cola", Money::from_cents(120)))
            .await;

        let numbers: Vec<_> = menu
            .read_all_items()
            .await
            .unwrap()
            .iter()
            .map(|i| i.menu_number)
            .collect();
        assert_eq!(numbers, vec![3, 11, 12]);
    }
}
