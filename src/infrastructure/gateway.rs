use crate::domain::order::{Amount, Currency};
use crate::domain::ports::RemoteOrderGateway;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use tracing::debug;

/// Stand-in for the processor's order API when running without network access.
///
/// Issues `order_<receipt>`, so replayed confirmations and webhooks can name
/// orders before they are created.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineGateway;

#[async_trait]
impl RemoteOrderGateway for OfflineGateway {
    async fn create_order(&self, amount: Amount, currency: &Currency, receipt: &str) -> Result<String> {
        let receipt = receipt.trim();
        if receipt.is_empty() {
            return Err(PaymentError::RemoteUnavailable(
                "offline gateway needs a receipt".to_string(),
            ));
        }
        debug!(%receipt, minor_units = %amount.minor_units(), %currency, "Offline order created");
        Ok(format!("order_{receipt}"))
    }
}

/// A processor that cannot be reached. Every order creation fails with
/// `RemoteUnavailable`, which exercises degraded mode end to end.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnreachableGateway;

#[async_trait]
impl RemoteOrderGateway for UnreachableGateway {
    async fn create_order(&self, _: Amount, _: &Currency, receipt: &str) -> Result<String> {
        debug!(%receipt, "Processor unreachable, order not created");
        Err(PaymentError::RemoteUnavailable(
            "processor unreachable".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_offline_reference_follows_receipt() {
        let gateway = OfflineGateway;
        let amount = Amount::new(dec!(10)).unwrap();
        let currency = Currency::new("INR").unwrap();
        let order_ref = gateway.create_order(amount, &currency, "r42").await.unwrap();
        assert_eq!(order_ref, "order_r42");
        assert!(matches!(
            gateway.create_order(amount, &currency, " ").await,
            Err(PaymentError::RemoteUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_always_fails() {
        let amount = Amount::new(dec!(10)).unwrap();
        let currency = Currency::new("INR").unwrap();
        assert!(matches!(
            UnreachableGateway.create_order(amount, &currency, "r42").await,
            Err(PaymentError::RemoteUnavailable(_))
        ));
    }
}
