//! Order aggregate: the Order Ledger's unit of state.

mod aggregate;
mod events;
mod line_item;
mod state;

pub use aggregate::Order;
pub use events::{
    ItemsAppendedData, OrderCancelledData, OrderEvent, OrderOpenedData, OrderPaidData,
    PaymentDeferredData, StatusAdvancedData,
};
pub use line_item::{LineItem, NewLineItem, ProductId};
pub use state::OrderState;

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order already opened")]
    AlreadyOpened,

    #[error("Order has not been opened")]
    NotOpened,

    /// Order is not in the expected state.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: OrderState,
        action: &'static str,
    },

    #[error("{0} is not a kitchen state")]
    NotKitchenState(OrderState),

    #[error("Submission has no items")]
    NoItems,

    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: String, quantity: u32 },

    #[error("Invalid price for {product_id}: {price} (must not be negative)")]
    InvalidPrice { product_id: String, price: i64 },

    #[error("Order total overflows")]
    TotalOverflow,

    #[error("Cannot defer payment of a zero total")]
    ZeroTotal,
}
