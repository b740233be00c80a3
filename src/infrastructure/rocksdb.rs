use crate::domain::order::{Order, OrderId};
use crate::domain::ports::{OrderStore, ProcessedEventStore};
use crate::error::{PaymentError, Result};
use crate::infrastructure::in_memory::check_successor;
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Column Family for order records, keyed by internal id.
pub const CF_ORDERS: &str = "orders";
/// Column Family mapping external order references to internal ids.
pub const CF_ORDER_REFS: &str = "order_refs";
/// Column Family of handled webhook event ids.
pub const CF_EVENTS: &str = "events";

const LOCK_STRIPES: usize = 64;

/// A persistent store implementation using RocksDB.
///
/// Orders and the order-reference index live in separate Column Families and are
/// always written together in one `WriteBatch`. Compare-and-set is serialised per
/// lock stripe, so writers to different orders rarely contend.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    stripes: Arc<Vec<Mutex<()>>>,
    insert_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_ORDERS, CF_ORDER_REFS, CF_EVENTS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            stripes: Arc::new((0..LOCK_STRIPES).map(|_| Mutex::new(())).collect()),
            insert_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn stripe(&self, id: OrderId) -> Result<MutexGuard<'_, ()>> {
        let index = id.as_bytes()[15] as usize % self.stripes.len();
        self.stripes[index].lock().map_err(|_| poisoned())
    }

    fn read_order(&self, id: OrderId) -> Result<Option<Order>> {
        let cf = self.cf(CF_ORDERS)?;
        match self.db.get_pinned_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

fn poisoned() -> PaymentError {
    PaymentError::InternalError(Box::new(std::io::Error::other("store lock poisoned")))
}

fn encode(order: &Order) -> Result<Vec<u8>> {
    serde_json::to_vec(order).map_err(|e| {
        PaymentError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Serialization error: {}", e),
        )))
    })
}

fn decode(bytes: &[u8]) -> Result<Order> {
    serde_json::from_slice(bytes).map_err(|e| {
        PaymentError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

#[async_trait]
impl OrderStore for RocksDbStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let _guard = self.insert_lock.lock().map_err(|_| poisoned())?;
        let orders = self.cf(CF_ORDERS)?;
        let refs = self.cf(CF_ORDER_REFS)?;

        if self.db.get_pinned_cf(orders, order.internal_id.as_bytes())?.is_some() {
            return Err(PaymentError::DuplicateOrder(order.internal_id.to_string()));
        }
        if self
            .db
            .get_pinned_cf(refs, order.external_order_ref.as_bytes())?
            .is_some()
        {
            return Err(PaymentError::DuplicateOrder(order.external_order_ref));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(orders, order.internal_id.as_bytes(), encode(&order)?);
        batch.put_cf(
            refs,
            order.external_order_ref.as_bytes(),
            order.internal_id.as_bytes(),
        );
        self.db.write(batch)?;
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        self.read_order(id)
    }

    async fn get_by_order_ref(&self, order_ref: &str) -> Result<Option<Order>> {
        let refs = self.cf(CF_ORDER_REFS)?;
        let Some(raw_id) = self.db.get_pinned_cf(refs, order_ref.as_bytes())? else {
            return Ok(None);
        };
        let bytes: [u8; 16] = raw_id.as_ref().try_into().map_err(|_| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "corrupt index entry for {order_ref}"
            ))))
        })?;
        self.read_order(OrderId::from_bytes(bytes))
    }

    async fn get_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Order>> {
        let handle = self.cf(CF_ORDERS)?;
        for item in self.db.iterator_cf(handle, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            let order = decode(&value)?;
            if order.external_payment_ref.as_deref() == Some(payment_ref) {
                return Ok(Some(order));
            }
        }
        Ok(None)
    }

    async fn compare_and_set(&self, id: OrderId, expected_version: u64, order: Order) -> Result<bool> {
        check_successor(id, expected_version, &order)?;
        let _guard = self.stripe(id)?;
        let Some(current) = self.read_order(id)? else {
            return Err(PaymentError::OrderNotFound(id.to_string()));
        };
        if current.version != expected_version {
            return Ok(false);
        }
        if current.external_order_ref != order.external_order_ref {
            return Err(PaymentError::ValidationError(
                "external order reference is immutable".to_string(),
            ));
        }
        self.db.put_cf(self.cf(CF_ORDERS)?, id.as_bytes(), encode(&order)?)?;
        Ok(true)
    }

    async fn all(&self) -> Result<Vec<Order>> {
        let handle = self.cf(CF_ORDERS)?;
        let mut orders = Vec::new();
        for item in self.db.iterator_cf(handle, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            orders.push(decode(&value)?);
        }
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }
}

#[async_trait]
impl ProcessedEventStore for RocksDbStore {
    async fn contains(&self, event_id: &str) -> Result<bool> {
        let cf = self.cf(CF_EVENTS)?;
        Ok(self.db.get_pinned_cf(cf, event_id.as_bytes())?.is_some())
    }

    async fn mark_processed(&self, event_id: &str) -> Result<bool> {
        let _guard = self.insert_lock.lock().map_err(|_| poisoned())?;
        let cf = self.cf(CF_EVENTS)?;
        if self.db.get_pinned_cf(cf, event_id.as_bytes())?.is_some() {
            return Ok(false);
        }
        self.db.put_cf(cf, event_id.as_bytes(), b"")?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Amount, Currency, CustomerDetails};
    use crate::domain::status::PaymentStatus;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn order(order_ref: &str) -> Order {
        Order::open(
            order_ref.to_string(),
            Amount::new(dec!(100.0)).unwrap(),
            Currency::new("USD").unwrap(),
            CustomerDetails::default(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_ORDERS).is_some());
        assert!(store.db.cf_handle(CF_ORDER_REFS).is_some());
        assert!(store.db.cf_handle(CF_EVENTS).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_order_store() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        let order = order("order_1");

        store.insert(order.clone()).await.unwrap();
        assert!(matches!(
            store.insert(order.clone()).await,
            Err(PaymentError::DuplicateOrder(_))
        ));

        let by_ref = store.get_by_order_ref("order_1").await.unwrap().unwrap();
        assert_eq!(by_ref, order);

        assert!(store.get_by_payment_ref("pay_1").await.unwrap().is_none());
        let mut next = order.transition(PaymentStatus::Success, Utc::now()).unwrap();
        next.external_payment_ref = Some("pay_1".to_string());
        assert!(store.compare_and_set(order.internal_id, 0, next.clone()).await.unwrap());
        assert_eq!(store.get_by_payment_ref("pay_1").await.unwrap(), Some(next.clone()));
        let stale = order.transition(PaymentStatus::Failed, Utc::now()).unwrap();
        assert!(!store.compare_and_set(order.internal_id, 0, stale).await.unwrap());

        assert_eq!(store.get(order.internal_id).await.unwrap(), Some(next));
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_reopen_keeps_orders_and_events() {
        let dir = tempdir().unwrap();
        let order = order("order_1");
        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            store.insert(order.clone()).await.unwrap();
            assert!(store.mark_processed("evt_1").await.unwrap());
        }
        let store = RocksDbStore::open(dir.path()).unwrap();
        assert_eq!(store.get(order.internal_id).await.unwrap(), Some(order));
        assert!(store.contains("evt_1").await.unwrap());
        assert!(!store.mark_processed("evt_1").await.unwrap());
    }
}
