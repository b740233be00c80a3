use crate::domain::status::PaymentStatus;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use uuid::Uuid;

/// Internal, system-generated order identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for OrderId {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| PaymentError::ValidationError(format!("bad order id {s}: {e}")))
    }
}

/// A positive monetary amount.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Amount in the currency's minor unit, as processors expect it.
    pub fn minor_units(&self) -> Decimal {
        (self.0 * Decimal::ONE_HUNDRED).trunc()
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// ISO-4217 style three-letter currency code, stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_uppercase()))
        } else {
            Err(PaymentError::ValidationError(format!(
                "Currency must be a three-letter code, got {code:?}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Customer-supplied details attached to an order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetails {
    #[serde(default, alias = "customerName", alias = "customer_name")]
    pub name: Option<String>,
    #[serde(default, alias = "customerEmail", alias = "customer_email")]
    pub email: Option<String>,
    #[serde(default, alias = "customerPhone", alias = "customer_phone")]
    pub phone: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CustomerDetails {
    /// Overwrites fields for which `update` carries a non-blank value.
    pub fn merge(&mut self, update: &CustomerDetails) {
        fn take(slot: &mut Option<String>, value: &Option<String>) {
            if let Some(v) = value
                && !v.trim().is_empty()
            {
                *slot = Some(v.trim().to_string());
            }
        }
        take(&mut self.name, &update.name);
        take(&mut self.email, &update.email);
        take(&mut self.phone, &update.phone);
        take(&mut self.description, &update.description);
    }

    pub fn is_empty(&self) -> bool {
        [&self.name, &self.email, &self.phone, &self.description]
            .iter()
            .all(|field| field.as_deref().is_none_or(|v| v.trim().is_empty()))
    }
}

/// One payment order and its reconciliation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub internal_id: OrderId,
    /// Issued by the processor when the remote order is created.
    pub external_order_ref: String,
    /// Issued by the processor once a payment attempt exists.
    pub external_payment_ref: Option<String>,
    pub amount: Amount,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub customer: CustomerDetails,
    pub created_at: DateTime<Utc>,
    pub captured_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    /// Compare-and-set token, bumped on every committed mutation.
    pub version: u64,
}

impl Order {
    pub fn open(
        external_order_ref: String,
        amount: Amount,
        currency: Currency,
        customer: CustomerDetails,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            internal_id: OrderId::generate(),
            external_order_ref,
            external_payment_ref: None,
            amount,
            currency,
            status: PaymentStatus::Pending,
            customer,
            created_at: now,
            captured_at: None,
            refunded_at: None,
            version: 0,
        }
    }

    /// Computes the successor of this order after moving to `target`.
    ///
    /// The receiver is untouched; the caller commits the returned order with a
    /// compare-and-set against `self.version`.
    pub fn transition(&self, target: PaymentStatus, now: DateTime<Utc>) -> Result<Order> {
        if !self.status.can_transition_to(target) {
            return Err(PaymentError::StatusConflict {
                from: self.status,
                to: target,
            });
        }
        let mut next = self.clone();
        next.status = target;
        if target.is_confirmed() && next.captured_at.is_none() {
            next.captured_at = Some(now);
        }
        if target.is_refunded() && next.refunded_at.is_none() {
            next.refunded_at = Some(now);
        }
        next.version += 1;
        Ok(next)
    }
}
