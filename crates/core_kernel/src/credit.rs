//! Credit type definitions
//!
//! A credit type names one prepaid allowance pool a member can hold. Each
//! (user, credit type) pair maps to exactly one ledger account.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The credit domains tracked by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditType {
    /// Free practice-space hours, measured in blocks of time
    FreeHours,
    /// Equipment-use credits, capped and rolled over month to month
    EquipmentCredits,
}

impl CreditType {
    /// Returns the stable storage tag for this credit type
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditType::FreeHours => "free_hours",
            CreditType::EquipmentCredits => "equipment_credits",
        }
    }

    /// All known credit types
    pub fn all() -> [CreditType; 2] {
        [CreditType::FreeHours, CreditType::EquipmentCredits]
    }
}

impl fmt::Display for CreditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CreditType {
    type Err = UnknownCreditType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free_hours" => Ok(CreditType::FreeHours),
            "equipment_credits" => Ok(CreditType::EquipmentCredits),
            other => Err(UnknownCreditType(other.to_string())),
        }
    }
}

/// Error for an unrecognized credit type tag
#[derive(Debug, thiserror::Error)]
#[error("unknown credit type: {0}")]
pub struct UnknownCreditType(pub String);
