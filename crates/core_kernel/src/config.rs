//! Ledger configuration
//!
//! All tunables the original application kept in global configuration are
//! carried in an explicit struct handed to the ledger and allocation
//! constructors at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::credit::CreditType;
use crate::units::Blocks;

/// Per-credit-type account defaults applied when an account is created
/// lazily on its first movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTypeDefaults {
    /// Balance cap, if the type is capped
    pub max_balance: Option<Blocks>,
    /// Whether unspent balance carries over at allocation time
    pub rollover_enabled: bool,
}

/// Configuration for the credit ledger and allocation scheduler
///
/// # Example
///
/// ```rust
/// use core_kernel::{Blocks, CreditType, CreditTypeDefaults, LedgerConfig};
///
/// let config = LedgerConfig::default().with_defaults(
///     CreditType::EquipmentCredits,
///     CreditTypeDefaults { max_balance: Some(Blocks::new(500)), rollover_enabled: true },
/// );
/// assert_eq!(config.minutes_per_block, 30);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Length of one time block in minutes
    pub minutes_per_block: u32,
    /// Account defaults keyed by credit type
    defaults: BTreeMap<CreditType, CreditTypeDefaults>,
}

impl LedgerConfig {
    /// Overrides the defaults for one credit type
    pub fn with_defaults(mut self, credit_type: CreditType, defaults: CreditTypeDefaults) -> Self {
        self.defaults.insert(credit_type, defaults);
        self
    }

    /// Returns the account defaults for a credit type
    ///
    /// Types without an explicit entry get an uncapped, non-rollover account.
    pub fn defaults_for(&self, credit_type: CreditType) -> CreditTypeDefaults {
        self.defaults.get(&credit_type).copied().unwrap_or(CreditTypeDefaults {
            max_balance: None,
            rollover_enabled: false,
        })
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let mut defaults = BTreeMap::new();
        defaults.insert(
            CreditType::FreeHours,
            CreditTypeDefaults { max_balance: None, rollover_enabled: false },
        );
        defaults.insert(
            CreditType::EquipmentCredits,
            CreditTypeDefaults { max_balance: Some(Blocks::new(250)), rollover_enabled: true },
        );

        Self { minutes_per_block: 30, defaults }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_free_hours() {
        let config = LedgerConfig::default();
        let defaults = config.defaults_for(CreditType::FreeHours);
        assert_eq!(defaults.max_balance, None);
        assert!(!defaults.rollover_enabled);
    }

    #[test]
    fn test_default_equipment_credits() {
        let config = LedgerConfig::default();
        let defaults = config.defaults_for(CreditType::EquipmentCredits);
        assert_eq!(defaults.max_balance, Some(Blocks::new(250)));
        assert!(defaults.rollover_enabled);
    }

    #[test]
    fn test_with_defaults_override() {
        let config = LedgerConfig::default().with_defaults(
            CreditType::FreeHours,
            CreditTypeDefaults { max_balance: Some(Blocks::new(10)), rollover_enabled: true },
        );
        assert_eq!(
            config.defaults_for(CreditType::FreeHours).max_balance,
            Some(Blocks::new(10))
        );
    }
}
