//! Auction items and contended bidding.
//!
//! A bid is a read-modify-write on one item key. [`AuctionService::place_bid`]
//! runs it under the [`LockKind`](crate::lock::LockKind) chosen by the caller,
//! so the same flow can be observed racing (`None`) or serialized (`Spin`,
//! `Quorum`).

mod model;
mod service;

use gavel_storage::StoreError;

use crate::lock::LockError;

pub use model::{AuctionItem, NewBid, NewItem, item_key};
pub use service::AuctionService;

#[derive(Debug, thiserror::Error)]
pub enum BidError {
    #[error("Item does not exist")]
    ItemNotFound { item_id: String },

    #[error("Bid = {price} too low (less than {current})")]
    BidTooLow { price: f64, current: f64 },

    #[error("Item closed to bidding")]
    AuctionClosed { item_id: String },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BidError {
    /// Validation failures of the bid itself, as opposed to infrastructure
    /// errors.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            BidError::ItemNotFound { .. } | BidError::BidTooLow { .. } | BidError::AuctionClosed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let low = BidError::BidTooLow {
            price: 10.0,
            current: 14.0,
        };
        assert_eq!(low.to_string(), "Bid = 10 too low (less than 14)");
        assert!(low.is_rejection());

        let lock = BidError::from(LockError::NotAcquired {
            resource: "#items666".into(),
            attempts: 26,
        });
        assert!(!lock.is_rejection());
    }
}
