use crate::domain::order::Order;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct OrderRecord<'a> {
    internal_id: String,
    order_ref: &'a str,
    payment_ref: Option<&'a str>,
    amount: Decimal,
    currency: &'a str,
    status: String,
    version: u64,
    captured_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Order> for OrderRecord<'a> {
    fn from(order: &'a Order) -> Self {
        Self {
            internal_id: order.internal_id.to_string(),
            order_ref: &order.external_order_ref,
            payment_ref: order.external_payment_ref.as_deref(),
            amount: order.amount.value(),
            currency: order.currency.as_str(),
            status: order.status.to_string(),
            version: order.version,
            captured_at: order.captured_at,
            refunded_at: order.refunded_at,
        }
    }
}

/// Writes final order states as CSV.
pub struct OrderWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OrderWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_orders<'a>(&mut self, orders: impl IntoIterator<Item = &'a Order>) -> Result<()> {
        for order in orders {
            self.writer.serialize(OrderRecord::from(order))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
