//! Notification dispatch port
//!
//! Notifications are fired after the billing unit of work commits and are
//! best-effort: a delivery failure is logged and swallowed, never rolled
//! back into the financial operation.

use async_trait::async_trait;
use thiserror::Error;

use crate::charge::Charge;

/// Delivery failure from the notification collaborator
#[derive(Debug, Error)]
#[error("notification dispatch failed: {0}")]
pub struct NotificationError(pub String);

/// Post-commit notification hooks
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn charge_created(&self, charge: &Charge) -> Result<(), NotificationError>;

    async fn charge_updated(&self, charge: &Charge) -> Result<(), NotificationError>;

    async fn charge_cancelled(&self, charge: &Charge) -> Result<(), NotificationError>;
}

/// Dispatcher that drops every notification; useful for batch jobs and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopDispatcher {
    async fn charge_created(&self, _charge: &Charge) -> Result<(), NotificationError> {
        Ok(())
    }

    async fn charge_updated(&self, _charge: &Charge) -> Result<(), NotificationError> {
        Ok(())
    }

    async fn charge_cancelled(&self, _charge: &Charge) -> Result<(), NotificationError> {
        Ok(())
    }
}
