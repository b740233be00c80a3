use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

/// Lifecycle status of an order.
///
/// The transition table in [`PaymentStatus::can_transition_to`] is the only place
/// that decides which status changes are legal.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Captured,
    Success,
    PartiallyRefunded,
    Refunded,
    Failed,
    Cancelled,
    Expired,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 9] = [
        PaymentStatus::Pending,
        PaymentStatus::Authorized,
        PaymentStatus::Captured,
        PaymentStatus::Success,
        PaymentStatus::PartiallyRefunded,
        PaymentStatus::Refunded,
        PaymentStatus::Failed,
        PaymentStatus::Cancelled,
        PaymentStatus::Expired,
    ];

    /// Statuses reachable in one step from `self`.
    pub fn allowed_targets(self) -> &'static [PaymentStatus] {
        use PaymentStatus::*;
        match self {
            Pending => &[Authorized, Success, Captured, Failed, Cancelled, Expired],
            Authorized => &[Success, Captured, Failed, Cancelled, Expired],
            Success | Captured => &[Refunded, PartiallyRefunded],
            PartiallyRefunded | Refunded | Failed | Cancelled | Expired => &[],
        }
    }

    pub fn can_transition_to(self, target: PaymentStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Payment confirmed. `Success` and `Captured` are synonyms.
    pub fn is_confirmed(self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Captured)
    }

    pub fn is_refunded(self) -> bool {
        matches!(
            self,
            PaymentStatus::Refunded | PaymentStatus::PartiallyRefunded
        )
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    /// True when asking for `other` while in `self` changes nothing.
    pub fn is_equivalent(self, other: PaymentStatus) -> bool {
        self == other || (self.is_confirmed() && other.is_confirmed())
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Captured => "CAPTURED",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown payment status: {s}"))
    }
}
