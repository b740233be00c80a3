use crate::domain::order::{Order, OrderId};
use crate::domain::ports::{OrderStore, ProcessedEventStore};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct OrderTable {
    orders: HashMap<OrderId, Order>,
    by_order_ref: HashMap<String, OrderId>,
}

/// A thread-safe in-memory order store.
///
/// Both indexes live behind one `RwLock` so an insert can never leave them out of
/// step. The lock is only held for the duration of a single map operation, never
/// across an engine decision.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    table: Arc<RwLock<OrderTable>>,
}

impl InMemoryOrderStore {
    /// Creates a new, empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let mut table = self.table.write().await;
        if table.orders.contains_key(&order.internal_id) {
            return Err(PaymentError::DuplicateOrder(order.internal_id.to_string()));
        }
        if table.by_order_ref.contains_key(&order.external_order_ref) {
            return Err(PaymentError::DuplicateOrder(order.external_order_ref));
        }
        table
            .by_order_ref
            .insert(order.external_order_ref.clone(), order.internal_id);
        table.orders.insert(order.internal_id, order);
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let table = self.table.read().await;
        Ok(table.orders.get(&id).cloned())
    }

    async fn get_by_order_ref(&self, order_ref: &str) -> Result<Option<Order>> {
        let table = self.table.read().await;
        Ok(table
            .by_order_ref
            .get(order_ref)
            .and_then(|id| table.orders.get(id))
            .cloned())
    }

    async fn get_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Order>> {
        let table = self.table.read().await;
        Ok(table
            .orders
            .values()
            .find(|o| o.external_payment_ref.as_deref() == Some(payment_ref))
            .cloned())
    }

    async fn compare_and_set(&self, id: OrderId, expected_version: u64, order: Order) -> Result<bool> {
        check_successor(id, expected_version, &order)?;
        let mut table = self.table.write().await;
        match table.orders.get_mut(&id) {
            Some(current) if current.version == expected_version => {
                if current.external_order_ref != order.external_order_ref {
                    return Err(PaymentError::ValidationError(
                        "external order reference is immutable".to_string(),
                    ));
                }
                *current = order;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(PaymentError::OrderNotFound(id.to_string())),
        }
    }

    async fn all(&self) -> Result<Vec<Order>> {
        let table = self.table.read().await;
        let mut orders: Vec<Order> = table.orders.values().cloned().collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }
}

/// Rejects writes that could not have come from a valid read-decide-write cycle.
pub(crate) fn check_successor(id: OrderId, expected_version: u64, order: &Order) -> Result<()> {
    if order.internal_id != id {
        return Err(PaymentError::ValidationError(format!(
            "order {} cannot replace order {id}",
            order.internal_id
        )));
    }
    if order.version <= expected_version {
        return Err(PaymentError::ValidationError(format!(
            "version must advance past {expected_version}, got {}",
            order.version
        )));
    }
    Ok(())
}

/// In-memory ledger of handled webhook event ids.
#[derive(Default, Clone)]
pub struct InMemoryEventStore {
    seen: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryEventStore {
    async fn contains(&self, event_id: &str) -> Result<bool> {
        Ok(self.seen.read().await.contains(event_id))
    }

    async fn mark_processed(&self, event_id: &str) -> Result<bool> {
        Ok(self.seen.write().await.insert(event_id.to_string()))
    }
}
