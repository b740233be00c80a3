use super::order::{Amount, Currency, Order, OrderId};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Storage for orders with per-order optimistic concurrency.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Stores a brand-new order. Fails with `DuplicateOrder` if either key is taken.
    async fn insert(&self, order: Order) -> Result<()>;
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;
    async fn get_by_order_ref(&self, order_ref: &str) -> Result<Option<Order>>;
    /// Finds the order a processor payment was recorded against.
    async fn get_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Order>>;
    /// Replaces the order only if its stored version is still `expected_version`.
    ///
    /// Returns `false` (and writes nothing) when another writer got there first.
    async fn compare_and_set(
        &self,
        id: OrderId,
        expected_version: u64,
        order: Order,
    ) -> Result<bool>;
    async fn all(&self) -> Result<Vec<Order>>;
}

/// Ledger of webhook event ids that have already been handled.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    async fn contains(&self, event_id: &str) -> Result<bool>;
    /// Records the event; returns `false` if it was already present.
    async fn mark_processed(&self, event_id: &str) -> Result<bool>;
}

/// The processor-side "create order" call.
#[async_trait]
pub trait RemoteOrderGateway: Send + Sync {
    /// Returns the processor's order reference for a new order.
    async fn create_order(&self, amount: Amount, currency: &Currency, receipt: &str)
    -> Result<String>;
}

pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type ProcessedEventStoreRef = Arc<dyn ProcessedEventStore>;
pub type RemoteOrderGatewayRef = Arc<dyn RemoteOrderGateway>;
