use async_trait::async_trait;
use uuid::Uuid;

use super::model::Bid;
use crate::error::StoreError;

/// 입찰 원장 (추가 전용)
#[async_trait]
pub trait BidStore: Send + Sync {
    /// Accepted / AcceptedBelowReserve 중 금액이 가장 높은 입찰
    async fn highest_bid(&self, auction_id: Uuid) -> Result<Option<Bid>, StoreError>;

    /// 경매의 입찰 이력 (최신순)
    async fn bids_for_auction(&self, auction_id: Uuid) -> Result<Vec<Bid>, StoreError>;
}
