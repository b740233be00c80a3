//! HMAC-SHA256 signing and constant-time verification of processor payloads.

use crate::config::Secret;
use crate::error::{PaymentError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Separates the payment and order references in a confirmation message.
pub const REF_DELIMITER: char = '|';

/// Hex-encoded HMAC-SHA256 of `message` under `secret`.
pub fn sign(message: &[u8], secret: &[u8]) -> String {
    // HMAC pads or hashes the key to the block size, so no key length is rejected.
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks `provided_mac` against the MAC of `message`.
///
/// The comparison runs in constant time. Anything that is not valid hex of the
/// right length is simply a mismatch.
pub fn verify(message: &[u8], secret: &[u8], provided_mac: &str) -> bool {
    let Ok(provided) = hex::decode(provided_mac.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&provided).is_ok()
}

/// Canonical confirmation message: `payment_ref|order_ref`.
///
/// Either reference containing the delimiter would make the message ambiguous, so
/// such references are refused outright.
pub fn payment_message(payment_ref: &str, order_ref: &str) -> Result<String> {
    validate_reference(payment_ref)?;
    validate_reference(order_ref)?;
    Ok(format!("{payment_ref}{REF_DELIMITER}{order_ref}"))
}

/// A processor reference must be non-empty and free of the delimiter.
pub fn validate_reference(reference: &str) -> Result<()> {
    if reference.is_empty() || reference.contains(REF_DELIMITER) {
        return Err(PaymentError::InvalidReference(reference.to_string()));
    }
    Ok(())
}

/// A verifier bound to one shared secret.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: Secret<String>,
}

impl SignatureVerifier {
    pub fn new(secret: Secret<String>) -> Self {
        Self { secret }
    }

    pub fn sign(&self, message: &[u8]) -> String {
        sign(message, self.secret.reveal().as_bytes())
    }

    pub fn verify(&self, message: &[u8], provided_mac: &str) -> bool {
        verify(message, self.secret.reveal().as_bytes(), provided_mac)
    }

    pub fn sign_payment(&self, payment_ref: &str, order_ref: &str) -> Result<String> {
        let message = payment_message(payment_ref, order_ref)?;
        Ok(self.sign(message.as_bytes()))
    }

    pub fn verify_payment(&self, payment_ref: &str, order_ref: &str, provided_mac: &str) -> Result<bool> {
        let message = payment_message(payment_ref, order_ref)?;
        Ok(self.verify(message.as_bytes(), provided_mac))
    }
}
