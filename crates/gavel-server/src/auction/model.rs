use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Store key of an item.
pub fn item_key(item_id: &str) -> String {
    format!("#items{item_id}")
}

/// An item up for auction, stored as JSON under [`item_key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionItem {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ending_at: OffsetDateTime,
    pub price: f64,
    pub bids: u64,
    pub highest_bid_user_id: Option<String>,
}

impl AuctionItem {
    /// Whether bidding has ended at `now`.
    pub fn is_closed_at(&self, now: OffsetDateTime) -> bool {
        now >= self.ending_at
    }

    /// The item after `bid` won.
    pub fn with_bid(self, bid: &NewBid) -> Self {
        Self {
            price: bid.price,
            bids: self.bids + 1,
            highest_bid_user_id: Some(bid.user_id.clone()),
            ..self
        }
    }
}

/// Body of `POST /items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub ending_at: OffsetDateTime,
    /// Starting price.
    #[serde(default)]
    pub price: f64,
}

/// A bid on an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBid {
    pub item_id: String,
    pub user_id: String,
    pub price: f64,
}

impl NewBid {
    pub fn new(item_id: impl Into<String>, user_id: impl Into<String>, price: f64) -> Self {
        Self {
            item_id: item_id.into(),
            user_id: user_id.into(),
            price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn item() -> AuctionItem {
        AuctionItem {
            id: "666".into(),
            name: "Item 1".into(),
            description: "A test item".into(),
            created_at: datetime!(2024-01-01 00:00 UTC),
            ending_at: datetime!(2024-01-02 00:00 UTC),
            price: 0.0,
            bids: 0,
            highest_bid_user_id: None,
        }
    }

    #[test]
    fn test_item_json_uses_camel_case() {
        let value = serde_json::to_value(item()).unwrap();
        assert_eq!(value["endingAt"], json!("2024-01-02T00:00:00Z"));
        assert_eq!(value["highestBidUserId"], json!(null));

        let back: AuctionItem = serde_json::from_value(value).unwrap();
        assert_eq!(back, item());
    }

    #[test]
    fn test_with_bid() {
        let updated = item().with_bid(&NewBid::new("666", "1", 10.0));
        assert_eq!(updated.price, 10.0);
        assert_eq!(updated.bids, 1);
        assert_eq!(updated.highest_bid_user_id.as_deref(), Some("1"));
        assert_eq!(updated.name, "Item 1");
    }

    #[test]
    fn test_closed_at_ending() {
        let item = item();
        assert!(!item.is_closed_at(datetime!(2024-01-01 23:59 UTC)));
        assert!(item.is_closed_at(datetime!(2024-01-02 00:00 UTC)));
    }

    #[test]
    fn test_item_key() {
        assert_eq!(item_key("666"), "#items666");
    }
}
