//! Deferred payment records: bills marked "pay later".

mod aggregate;
mod events;

pub use aggregate::{DeferredPayment, DeferredState};
pub use events::{
    DeferredEvent, DeferredPaymentExpiredData, DeferredPaymentOpenedData,
    DeferredPaymentResolvedData, PendingAmountAdjustedData,
};

use thiserror::Error;

use crate::money::Money;

/// Errors that can occur on a deferred payment record.
#[derive(Debug, Error)]
pub enum DeferredError {
    #[error("Deferred payment record already opened")]
    AlreadyOpened,

    #[error("Deferred payment record has not been opened")]
    NotOpened,

    #[error("Pending amount must be greater than zero, got {0}")]
    NonPositiveAmount(Money),

    #[error("Deferred payment record already resolved")]
    AlreadyResolved,
}
