#![allow(dead_code)]

use async_trait::async_trait;
use payrecon::application::engine::{NewOrder, ReconciliationEngine};
use payrecon::application::signature;
use payrecon::application::webhook::{WebhookDelivery, WebhookDispatcher};
use payrecon::config::{EngineConfig, GatewayConfig};
use payrecon::domain::order::{CustomerDetails, Order, OrderId};
use payrecon::domain::ports::{OrderStore, OrderStoreRef};
use payrecon::error::Result;
use payrecon::infrastructure::gateway::OfflineGateway;
use payrecon::infrastructure::in_memory::{InMemoryEventStore, InMemoryOrderStore};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

pub const KEY_SECRET: &str = "key_secret_for_tests";
pub const WEBHOOK_SECRET: &str = "webhook_secret_for_tests";

pub fn gateway_config() -> GatewayConfig {
    GatewayConfig::new("rzp_test_key", KEY_SECRET).with_webhook_secret(WEBHOOK_SECRET)
}

pub fn engine_with(orders: OrderStoreRef, config: EngineConfig) -> Arc<ReconciliationEngine> {
    Arc::new(ReconciliationEngine::new(
        orders,
        Arc::new(OfflineGateway),
        &gateway_config(),
        config,
    ))
}

pub fn engine() -> Arc<ReconciliationEngine> {
    engine_with(Arc::new(InMemoryOrderStore::new()), EngineConfig::default())
}

pub fn dispatcher(engine: &Arc<ReconciliationEngine>) -> WebhookDispatcher {
    WebhookDispatcher::new(engine.clone(), Arc::new(InMemoryEventStore::new()))
}

pub fn new_order(receipt: &str, amount: Decimal) -> NewOrder {
    NewOrder {
        amount,
        currency: "USD".to_string(),
        receipt: Some(receipt.to_string()),
        customer: CustomerDetails::default(),
    }
}

pub fn confirmation_signature(payment_ref: &str, order_ref: &str) -> String {
    signature::sign(
        format!("{payment_ref}|{order_ref}").as_bytes(),
        KEY_SECRET.as_bytes(),
    )
}

pub fn webhook_body(event: &str, payment_ref: &str, order_ref: &str) -> Vec<u8> {
    serde_json::json!({
        "event": event,
        "payload": {
            "payment": { "id": payment_ref, "order_id": order_ref },
            "order": { "id": order_ref }
        }
    })
    .to_string()
    .into_bytes()
}

pub fn webhook_signature(body: &[u8]) -> String {
    signature::sign(body, WEBHOOK_SECRET.as_bytes())
}

pub fn signed_delivery(event_id: Option<&str>, body: Vec<u8>) -> WebhookDelivery {
    let signature = webhook_signature(&body);
    WebhookDelivery {
        event_id: event_id.map(str::to_string),
        body,
        signature,
    }
}

/// Delegates to an in-memory store but sleeps before every read.
pub struct SlowStore {
    inner: InMemoryOrderStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(inner: InMemoryOrderStore, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl OrderStore for SlowStore {
    async fn insert(&self, order: Order) -> Result<()> {
        self.inner.insert(order).await
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(id).await
    }

    async fn get_by_order_ref(&self, order_ref: &str) -> Result<Option<Order>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_by_order_ref(order_ref).await
    }

    async fn get_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Order>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_by_payment_ref(payment_ref).await
    }

    async fn compare_and_set(&self, id: OrderId, expected_version: u64, order: Order) -> Result<bool> {
        self.inner.compare_and_set(id, expected_version, order).await
    }

    async fn all(&self) -> Result<Vec<Order>> {
        self.inner.all().await
    }
}

/// A store where some other writer always wins the race.
pub struct ContendedStore {
    inner: InMemoryOrderStore,
}

impl ContendedStore {
    pub fn new(inner: InMemoryOrderStore) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl OrderStore for ContendedStore {
    async fn insert(&self, order: Order) -> Result<()> {
        self.inner.insert(order).await
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        self.inner.get(id).await
    }

    async fn get_by_order_ref(&self, order_ref: &str) -> Result<Option<Order>> {
        self.inner.get_by_order_ref(order_ref).await
    }

    async fn get_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Order>> {
        self.inner.get_by_payment_ref(payment_ref).await
    }

    async fn compare_and_set(&self, _: OrderId, _: u64, _: Order) -> Result<bool> {
        Ok(false)
    }

    async fn all(&self) -> Result<Vec<Order>> {
        self.inner.all().await
    }
}
