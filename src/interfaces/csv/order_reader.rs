use crate::application::engine::NewOrder;
use crate::domain::order::CustomerDetails;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of an order import file.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct OrderRow {
    pub receipt: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub description: Option<String>,
}

impl From<OrderRow> for NewOrder {
    fn from(row: OrderRow) -> Self {
        NewOrder {
            amount: row.amount,
            currency: row.currency,
            receipt: row.receipt,
            customer: CustomerDetails {
                name: row.name,
                email: row.email,
                phone: row.phone,
                description: row.description,
            },
        }
    }
}

/// Reads orders to open from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<NewOrder>`.
/// It handles whitespace trimming and flexible record lengths automatically, so the
/// customer columns may be left off entirely.
pub struct OrderReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OrderReader<R> {
    /// Creates a new `OrderReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes orders.
    pub fn orders(self) -> impl Iterator<Item = Result<NewOrder>> {
        self.reader
            .into_deserialize::<OrderRow>()
            .map(|result| result.map(NewOrder::from).map_err(PaymentError::from))
    }
}
