use crate::domain::status::PaymentStatus;
use thiserror::Error;

/// Every way a reconciliation request can be rejected.
///
/// Soft outcomes (already confirmed, unhandled event types, idempotent
/// re-application) are not errors; see [`crate::application::engine::Outcome`].
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("order not found: {0}")]
    OrderNotFound(String),
    #[error("cannot move order from {from} to {to}")]
    StatusConflict {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error("order {order_ref} is already confirmed with a different payment reference")]
    PaymentRefConflict { order_ref: String },
    #[error("order {0} kept changing underneath us after {1} attempts")]
    ConcurrentModification(String, u32),
    #[error("deadline elapsed before the update was committed")]
    Timeout,
    #[error("remote order creation failed: {0}")]
    RemoteUnavailable(String),
    #[error("invalid reference {0:?}: must be non-empty and must not contain '|'")]
    InvalidReference(String),
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("an order with reference {0} already exists")]
    DuplicateOrder(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("storage error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        PaymentError::InternalError(Box::new(err))
    }
}

impl PaymentError {
    /// Short, stable name of the error kind. Safe to hand back to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentError::SignatureInvalid => "SignatureInvalid",
            PaymentError::OrderNotFound(_) => "OrderNotFound",
            PaymentError::StatusConflict { .. } => "StatusConflict",
            PaymentError::PaymentRefConflict { .. } => "PaymentRefConflict",
            PaymentError::ConcurrentModification(..) => "ConcurrentModification",
            PaymentError::Timeout => "Timeout",
            PaymentError::RemoteUnavailable(_) => "RemoteUnavailable",
            PaymentError::InvalidReference(_) => "InvalidReference",
            PaymentError::ValidationError(_) => "ValidationError",
            PaymentError::DuplicateOrder(_) => "DuplicateOrder",
            PaymentError::MalformedPayload(_) => "MalformedPayload",
            PaymentError::CsvError(_) => "CsvError",
            PaymentError::IoError(_) => "IoError",
            PaymentError::InternalError(_) => "InternalError",
        }
    }

    /// Unrecoverable I/O or storage failures, as opposed to a rejected request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PaymentError::IoError(_) | PaymentError::InternalError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
