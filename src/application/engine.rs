use crate::application::signature::{self, SignatureVerifier};
use crate::config::{EngineConfig, GatewayConfig};
use crate::domain::order::{Amount, Currency, CustomerDetails, Order, OrderId};
use crate::domain::ports::{OrderStoreRef, RemoteOrderGatewayRef};
use crate::domain::status::PaymentStatus;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt::{self, Display};
use std::future::Future;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a reconciliation request that was not rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The order moved to a new status.
    Applied(Order),
    /// The client confirmed a payment we had already recorded.
    AlreadyConfirmed(Order),
    /// The requested status was already in place.
    NoOp(Order),
    /// Event type this engine does not act on. Acknowledged and ignored.
    Unhandled { event_type: String },
}

impl Outcome {
    pub fn order(&self) -> Option<&Order> {
        match self {
            Outcome::Applied(order) | Outcome::AlreadyConfirmed(order) | Outcome::NoOp(order) => {
                Some(order)
            }
            Outcome::Unhandled { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Applied(_) => "Applied",
            Outcome::AlreadyConfirmed(_) => "AlreadyConfirmed",
            Outcome::NoOp(_) => "NoOp",
            Outcome::Unhandled { .. } => "UnhandledEvent",
        }
    }
}

/// Request to open a new order.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub amount: Decimal,
    pub currency: String,
    /// Merchant-side receipt number. Generated when absent.
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub customer: CustomerDetails,
}

/// A payment confirmation posted by the client after checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfirmation {
    #[serde(alias = "paymentId", alias = "razorpay_payment_id")]
    pub payment_id: String,
    #[serde(alias = "orderId", alias = "razorpay_order_id")]
    pub order_id: String,
    #[serde(alias = "razorpay_signature")]
    pub signature: String,
    #[serde(flatten)]
    pub customer: CustomerDetails,
}

/// Statuses an operator may set directly. Confirmation needs a signed payment
/// reference and refunds go through [`ReconciliationEngine::refund`].
pub const OPERATOR_TARGETS: [PaymentStatus; 3] = [
    PaymentStatus::Cancelled,
    PaymentStatus::Expired,
    PaymentStatus::Failed,
];

/// Maps a processor event name to the status it asks for.
pub fn webhook_target(event_type: &str) -> Option<PaymentStatus> {
    match event_type {
        "payment.authorized" => Some(PaymentStatus::Authorized),
        "payment.captured" => Some(PaymentStatus::Success),
        "payment.failed" => Some(PaymentStatus::Failed),
        "payment.refunded" => Some(PaymentStatus::Refunded),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
enum OrderKey<'a> {
    Id(OrderId),
    Ref(&'a str),
}

impl Display for OrderKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKey::Id(id) => id.fmt(f),
            OrderKey::Ref(order_ref) => f.write_str(order_ref),
        }
    }
}

enum Decision {
    Commit(Order),
    Settled(Outcome),
}

/// The payment state machine.
///
/// Every status change goes through a read-decide-write cycle committed with a
/// compare-and-set on the order version, so concurrent callers touching the same
/// order never overwrite each other and callers touching different orders never
/// wait on each other.
pub struct ReconciliationEngine {
    key_id: String,
    orders: OrderStoreRef,
    gateway: RemoteOrderGatewayRef,
    payment_verifier: SignatureVerifier,
    webhook_verifier: SignatureVerifier,
    config: EngineConfig,
}

impl ReconciliationEngine {
    pub fn new(
        orders: OrderStoreRef,
        gateway: RemoteOrderGatewayRef,
        gateway_config: &GatewayConfig,
        config: EngineConfig,
    ) -> Self {
        Self {
            key_id: gateway_config.key_id.clone(),
            orders,
            gateway,
            payment_verifier: SignatureVerifier::new(gateway_config.key_secret.clone()),
            webhook_verifier: SignatureVerifier::new(gateway_config.webhook_secret.clone()),
            config,
        }
    }

    /// Creates the remote order and stores a new PENDING order.
    pub async fn open_order(&self, request: NewOrder) -> Result<Order> {
        self.within_deadline(self.open_order_inner(request)).await
    }

    async fn open_order_inner(&self, request: NewOrder) -> Result<Order> {
        let amount = Amount::new(request.amount)?;
        let currency = Currency::new(&request.currency)?;
        let receipt = request
            .receipt
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| format!("ORDER_{}", short_token()));

        let order_ref = match self.gateway.create_order(amount, &currency, &receipt).await {
            Ok(order_ref) => order_ref,
            Err(PaymentError::RemoteUnavailable(reason)) if self.config.degraded_mode => {
                let placeholder = format!("order_local_{}", short_token());
                warn!(
                    %receipt,
                    %reason,
                    %placeholder,
                    "Remote order creation failed; degraded mode substitutes a local reference"
                );
                placeholder
            }
            Err(e) => return Err(e),
        };
        signature::validate_reference(&order_ref)?;

        let order = Order::open(order_ref, amount, currency, request.customer, Utc::now());
        self.orders.insert(order.clone()).await?;
        info!(
            key_id = %self.key_id,
            order_id = %order.internal_id,
            order_ref = %order.external_order_ref,
            amount = %order.amount.value(),
            currency = %order.currency,
            "Opened order"
        );
        Ok(order)
    }

    /// Handles a client-side payment confirmation.
    ///
    /// The signature covers `payment_ref|order_ref` under the key secret.
    pub async fn confirm_client_payment(
        &self,
        order_ref: &str,
        payment_ref: &str,
        signature: &str,
        customer: Option<&CustomerDetails>,
    ) -> Result<Outcome> {
        self.within_deadline(self.confirm_inner(order_ref, payment_ref, signature, customer))
            .await
    }

    async fn confirm_inner(
        &self,
        order_ref: &str,
        payment_ref: &str,
        signature: &str,
        customer: Option<&CustomerDetails>,
    ) -> Result<Outcome> {
        if !self
            .payment_verifier
            .verify_payment(payment_ref, order_ref, signature)?
        {
            warn!(
                security_event = true,
                %order_ref,
                "Rejected client confirmation with an invalid signature"
            );
            return Err(PaymentError::SignatureInvalid);
        }

        self.reconcile(OrderKey::Ref(order_ref), |order, now| {
            if order.status.is_confirmed() {
                return if order.external_payment_ref.as_deref() == Some(payment_ref) {
                    debug!(order_id = %order.internal_id, "Payment already confirmed");
                    Ok(Decision::Settled(Outcome::AlreadyConfirmed(order.clone())))
                } else {
                    warn!(
                        security_event = true,
                        order_id = %order.internal_id,
                        %payment_ref,
                        "Confirmation carries a different payment reference than the captured one"
                    );
                    Err(PaymentError::PaymentRefConflict {
                        order_ref: order.external_order_ref.clone(),
                    })
                };
            }
            let mut next = order.transition(PaymentStatus::Success, now)?;
            next.external_payment_ref = Some(payment_ref.to_string());
            if let Some(customer) = customer
                && !customer.is_empty()
            {
                debug!(order_id = %order.internal_id, "Merging client-supplied customer details");
                next.customer.merge(customer);
            }
            Ok(Decision::Commit(next))
        })
        .await
    }

    /// Applies a processor webhook event.
    ///
    /// `raw_payload` must be the request body exactly as received; the signature
    /// is checked against it before anything else happens.
    pub async fn apply_webhook_event(
        &self,
        event_type: &str,
        payment_ref: &str,
        order_ref: &str,
        raw_payload: &[u8],
        signature: &str,
    ) -> Result<Outcome> {
        self.within_deadline(self.webhook_inner(
            event_type,
            payment_ref,
            order_ref,
            raw_payload,
            signature,
        ))
        .await
    }

    async fn webhook_inner(
        &self,
        event_type: &str,
        payment_ref: &str,
        order_ref: &str,
        raw_payload: &[u8],
        signature: &str,
    ) -> Result<Outcome> {
        if !self.verify_webhook(raw_payload, signature) {
            warn!(
                security_event = true,
                %event_type,
                %order_ref,
                "Rejected webhook with an invalid signature"
            );
            return Err(PaymentError::SignatureInvalid);
        }

        let Some(target) = webhook_target(event_type) else {
            info!(%event_type, "Ignoring unhandled webhook event");
            return Ok(Outcome::Unhandled {
                event_type: event_type.to_string(),
            });
        };
        signature::validate_reference(payment_ref)?;

        self.reconcile(OrderKey::Ref(order_ref), |order, now| {
            let other_payment = order
                .external_payment_ref
                .as_deref()
                .is_some_and(|r| r != payment_ref);
            let conflict = || PaymentError::PaymentRefConflict {
                order_ref: order.external_order_ref.clone(),
            };
            if order.status.is_equivalent(target) {
                if target.is_confirmed() && other_payment {
                    return Err(conflict());
                }
                debug!(
                    order_id = %order.internal_id,
                    status = %order.status,
                    "Webhook re-applies current status"
                );
                return Ok(Decision::Settled(Outcome::NoOp(order.clone())));
            }
            let mut next = order.transition(target, now)?;
            if target.is_refunded() {
                // A refund must name the payment that was captured.
                if other_payment {
                    return Err(conflict());
                }
            } else {
                next.external_payment_ref = Some(payment_ref.to_string());
            }
            Ok(Decision::Commit(next))
        })
        .await
    }

    /// Operator refund of a confirmed order.
    pub async fn refund(&self, id: OrderId, partial: bool) -> Result<Outcome> {
        let target = if partial {
            PaymentStatus::PartiallyRefunded
        } else {
            PaymentStatus::Refunded
        };
        self.change_status(id, target).await
    }

    /// Operator-driven status change: cancelling, expiring or failing an order.
    ///
    /// Any other target is a `ValidationError`.
    pub async fn transition(&self, id: OrderId, target: PaymentStatus) -> Result<Outcome> {
        if !OPERATOR_TARGETS.contains(&target) {
            return Err(PaymentError::ValidationError(format!(
                "operators may not set {target}; expected one of CANCELLED, EXPIRED, FAILED"
            )));
        }
        self.change_status(id, target).await
    }

    async fn change_status(&self, id: OrderId, target: PaymentStatus) -> Result<Outcome> {
        self.within_deadline(self.reconcile(OrderKey::Id(id), |order, now| {
            if order.status.is_equivalent(target) {
                return Ok(Decision::Settled(Outcome::NoOp(order.clone())));
            }
            Ok(Decision::Commit(order.transition(target, now)?))
        }))
        .await
    }

    pub async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        self.orders.get(id).await
    }

    pub async fn order_by_ref(&self, order_ref: &str) -> Result<Option<Order>> {
        self.orders.get_by_order_ref(order_ref).await
    }

    pub async fn order_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Order>> {
        self.orders.get_by_payment_ref(payment_ref).await
    }

    pub async fn orders(&self) -> Result<Vec<Order>> {
        self.orders.all().await
    }

    /// Checks a raw webhook body against the webhook secret.
    pub fn verify_webhook(&self, raw_payload: &[u8], signature: &str) -> bool {
        self.webhook_verifier.verify(raw_payload, signature)
    }

    pub fn payment_verifier(&self) -> &SignatureVerifier {
        &self.payment_verifier
    }

    pub fn webhook_verifier(&self) -> &SignatureVerifier {
        &self.webhook_verifier
    }

    async fn within_deadline<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.config.deadline {
            Some(deadline) => tokio::time::timeout(deadline, fut)
                .await
                .map_err(|_| PaymentError::Timeout)?,
            None => fut.await,
        }
    }

    async fn load(&self, key: OrderKey<'_>) -> Result<Order> {
        let order = match key {
            OrderKey::Id(id) => self.orders.get(id).await?,
            OrderKey::Ref(order_ref) => self.orders.get_by_order_ref(order_ref).await?,
        };
        order.ok_or_else(|| PaymentError::OrderNotFound(key.to_string()))
    }

    async fn reconcile<F>(&self, key: OrderKey<'_>, mut decide: F) -> Result<Outcome>
    where
        F: FnMut(&Order, DateTime<Utc>) -> Result<Decision>,
    {
        let attempts = self.config.max_attempts.max(1);
        for attempt in 1..=attempts {
            let current = self.load(key).await?;
            let next = match decide(&current, Utc::now())? {
                Decision::Commit(next) => next,
                Decision::Settled(outcome) => return Ok(outcome),
            };
            // Nothing may be awaited after a successful write: a deadline firing
            // here would report Timeout for a committed change.
            if self
                .orders
                .compare_and_set(current.internal_id, current.version, next.clone())
                .await?
            {
                info!(
                    order_id = %next.internal_id,
                    from = %current.status,
                    to = %next.status,
                    version = next.version,
                    "Order status updated"
                );
                return Ok(Outcome::Applied(next));
            }
            debug!(order = %key, attempt, "Order version moved underneath us, retrying");
        }
        warn!(order = %key, attempts, "Giving up after repeated concurrent modifications");
        Err(PaymentError::ConcurrentModification(key.to_string(), attempts))
    }
}

fn short_token() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}
