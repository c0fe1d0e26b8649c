use std::sync::Arc;
use std::time::Duration;

use gavel_storage::{DynStore, KvStoreExt, SetOptions};
use time::OffsetDateTime;
use uuid::Uuid;

use super::BidError;
use super::model::{AuctionItem, NewBid, NewItem, item_key};
use crate::config::LockConfig;
use crate::lock::{LockKind, LockService};
use crate::metrics;

/// Items and bids over the shared store.
///
/// Item state is never kept in memory: every bid re-reads the item inside
/// its critical section.
pub struct AuctionService {
    store: DynStore,
    locks: Arc<LockService>,
    spin_ttl: Duration,
    quorum_ttl: Duration,
}

impl AuctionService {
    /// Every strategy holds the item lock for `lock_ttl`.
    pub fn new(store: DynStore, locks: Arc<LockService>, lock_ttl: Duration) -> Self {
        Self {
            store,
            locks,
            spin_ttl: lock_ttl,
            quorum_ttl: lock_ttl,
        }
    }

    pub fn from_config(store: DynStore, locks: Arc<LockService>, config: &LockConfig) -> Self {
        Self {
            store,
            locks,
            spin_ttl: Duration::from_millis(config.spin.ttl_ms),
            quorum_ttl: Duration::from_millis(config.quorum.ttl_ms),
        }
    }

    fn lock_ttl(&self, kind: LockKind) -> Duration {
        match kind {
            LockKind::Quorum => self.quorum_ttl,
            LockKind::None | LockKind::Spin => self.spin_ttl,
        }
    }

    pub async fn get_item(&self, item_id: &str) -> Result<Option<AuctionItem>, BidError> {
        Ok(self.store.get(&item_key(item_id)).await?)
    }

    /// Stores a fresh item with no bids. Items live for the store's default
    /// TTL.
    pub async fn create_item(&self, new_item: NewItem) -> Result<AuctionItem, BidError> {
        let item = AuctionItem {
            id: new_item
                .id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: new_item.name,
            description: new_item.description,
            created_at: OffsetDateTime::now_utc(),
            ending_at: new_item.ending_at,
            price: new_item.price,
            bids: 0,
            highest_bid_user_id: None,
        };
        self.store
            .set(&item_key(&item.id), &item, SetOptions::new())
            .await?;
        tracing::debug!(item_id = %item.id, "item created");
        Ok(item)
    }

    /// Places `bid` with the item key guarded by `kind`.
    ///
    /// Rejections ([`BidError::is_rejection`]) are final and never retried
    /// here; lock errors are retryable by the caller.
    pub async fn place_bid(&self, bid: &NewBid, kind: LockKind) -> Result<AuctionItem, BidError> {
        let key = item_key(&bid.item_id);
        let result = self
            .locks
            .run_exclusive(kind, &key, self.lock_ttl(kind), self.apply_bid(bid))
            .await;

        match &result {
            Ok(item) => {
                tracing::debug!(item_id = %item.id, price = item.price, strategy = %kind, "bid accepted");
                metrics::record_bid(kind.as_str(), "accepted");
            }
            Err(e) if e.is_rejection() => {
                tracing::debug!(item_id = %bid.item_id, price = bid.price, strategy = %kind, reason = %e, "bid rejected");
                metrics::record_bid(kind.as_str(), "rejected");
            }
            Err(e) => {
                tracing::warn!(item_id = %bid.item_id, strategy = %kind, error = %e, "bid failed");
                metrics::record_bid(kind.as_str(), "error");
            }
        }
        result
    }

    async fn apply_bid(&self, bid: &NewBid) -> Result<AuctionItem, BidError> {
        let key = item_key(&bid.item_id);
        let item: AuctionItem =
            self.store
                .get(&key)
                .await?
                .ok_or_else(|| BidError::ItemNotFound {
                    item_id: bid.item_id.clone(),
                })?;

        if bid.price <= item.price {
            return Err(BidError::BidTooLow {
                price: bid.price,
                current: item.price,
            });
        }
        if item.is_closed_at(OffsetDateTime::now_utc()) {
            return Err(BidError::AuctionClosed {
                item_id: bid.item_id.clone(),
            });
        }

        let updated = item.with_bid(bid);
        self.store.set(&key, &updated, SetOptions::new()).await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{QuorumLock, QuorumLockOptions, SpinLock, SpinLockOptions};
    use gavel_db_memory::MemoryStore;
    use time::Duration as TimeDuration;

    fn service() -> AuctionService {
        let store: DynStore = Arc::new(MemoryStore::new());
        let locks = LockService::new(
            SpinLock::new(store.clone(), SpinLockOptions::default()),
            QuorumLock::new(vec![store.clone()], QuorumLockOptions::default()),
        );
        AuctionService::new(store, Arc::new(locks), Duration::from_millis(500))
    }

    fn new_item(ending_in: TimeDuration) -> NewItem {
        NewItem {
            id: Some("666".into()),
            name: "Item 1".into(),
            description: String::new(),
            ending_at: OffsetDateTime::now_utc() + ending_in,
            price: 0.0,
        }
    }

    #[tokio::test]
    async fn test_bid_updates_item() {
        let service = service();
        service.create_item(new_item(TimeDuration::days(1))).await.unwrap();

        let updated = service
            .place_bid(&NewBid::new("666", "1", 10.0), LockKind::Spin)
            .await
            .unwrap();
        assert_eq!(updated.price, 10.0);
        assert_eq!(updated.bids, 1);

        let stored = service.get_item("666").await.unwrap().unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn test_rejections() {
        let service = service();
        service.create_item(new_item(TimeDuration::days(1))).await.unwrap();
        service
            .place_bid(&NewBid::new("666", "1", 10.0), LockKind::None)
            .await
            .unwrap();

        let equal = service
            .place_bid(&NewBid::new("666", "2", 10.0), LockKind::Quorum)
            .await
            .unwrap_err();
        assert!(matches!(equal, BidError::BidTooLow { current, .. } if current == 10.0));

        let missing = service
            .place_bid(&NewBid::new("404", "1", 10.0), LockKind::Spin)
            .await
            .unwrap_err();
        assert!(matches!(missing, BidError::ItemNotFound { .. }));
    }

    #[tokio::test]
    async fn test_closed_auction_rejects() {
        let service = service();
        service
            .create_item(new_item(TimeDuration::seconds(-1)))
            .await
            .unwrap();

        let err = service
            .place_bid(&NewBid::new("666", "1", 10.0), LockKind::Spin)
            .await
            .unwrap_err();
        assert!(matches!(err, BidError::AuctionClosed { .. }));
        assert_eq!(service.get_item("666").await.unwrap().unwrap().bids, 0);
    }

    #[tokio::test]
    async fn test_create_item_generates_id() {
        let service = service();
        let mut input = new_item(TimeDuration::days(1));
        input.id = None;
        let item = service.create_item(input).await.unwrap();
        assert!(Uuid::parse_str(&item.id).is_ok());
        assert!(service.get_item(&item.id).await.unwrap().is_some());
    }
}
