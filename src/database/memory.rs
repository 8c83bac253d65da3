/// 메모리 저장소
/// 경매, 입찰 원장, 아웃박스를 하나의 락 아래 둬서 커밋을 원자적으로 처리한다.
/// 단일 프로세스 실행과 테스트에 쓴다.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::auction::model::{Auction, AuctionStatus, AuctionSummary, FinalizationState};
use crate::auction::store::{AuctionDirectory, AuctionStore};
use crate::bidding::model::Bid;
use crate::bidding::store::BidStore;
use crate::error::StoreError;
use crate::outbox::{Mutation, Outbox, OutboxEntry};
use crate::read_model::search::{search_items, SearchIndex, SearchItem, SearchPage, SearchParams};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

// endregion: --- Imports

// region:    --- Memory Store
#[derive(Default)]
struct Tables {
    auctions: HashMap<Uuid, Auction>,
    bids: Vec<Bid>,
    outbox: Vec<OutboxEntry>,
}

impl Tables {
    fn highest_bid(&self, auction_id: Uuid) -> Option<&Bid> {
        self.bids
            .iter()
            .filter(|bid| bid.auction_id == auction_id && bid.status.is_accepted())
            .max_by_key(|bid| bid.amount)
    }

    fn auction_mut(&mut self, id: Uuid) -> Result<&mut Auction, StoreError> {
        self.auctions.get_mut(&id).ok_or(StoreError::NotFound(id))
    }

    /// 변경 적용. 실패하면 아무것도 바뀌지 않는다.
    fn apply(&mut self, mutation: Mutation) -> Result<(), StoreError> {
        match mutation {
            Mutation::CreateAuction(auction) => {
                if self.auctions.contains_key(&auction.id) {
                    return Err(StoreError::Conflict(format!(
                        "auction {} already exists",
                        auction.id
                    )));
                }
                self.auctions.insert(auction.id, auction);
            }
            Mutation::UpdateAuction(updated) => {
                let auction = self.auction_mut(updated.id)?;
                if !auction.is_open() {
                    return Err(StoreError::Conflict(format!(
                        "auction {} is no longer open",
                        updated.id
                    )));
                }
                auction.item = updated.item;
                auction.updated_at = updated.updated_at;
            }
            Mutation::DeleteAuction { id } => {
                let auction = self.auctions.get(&id).ok_or(StoreError::NotFound(id))?;
                if !auction.is_open() {
                    return Err(StoreError::Conflict(format!("auction {id} is no longer open")));
                }
                self.auctions.remove(&id);
            }
            Mutation::AppendBid {
                bid,
                expected_highest,
            } => {
                let auction = self
                    .auctions
                    .get(&bid.auction_id)
                    .ok_or(StoreError::NotFound(bid.auction_id))?;
                // 종료 처리가 시작되면 유효 입찰은 더 받지 않는다
                if bid.status.is_accepted() && !auction.is_open() {
                    return Err(StoreError::AuctionClosed(bid.auction_id));
                }
                let current = self.highest_bid(bid.auction_id).map(|b| b.id);
                if current != expected_highest {
                    return Err(StoreError::Conflict(format!(
                        "highest bid of {} changed",
                        bid.auction_id
                    )));
                }

                let auction = self.auction_mut(bid.auction_id)?;
                if bid.status.is_accepted()
                    && auction.current_high_bid.map_or(true, |high| bid.amount > high)
                {
                    auction.current_high_bid = Some(bid.amount);
                }
                self.bids.push(bid);
            }
            Mutation::FinalizeAuction {
                claimed_at,
                outcome,
            } => {
                let auction = self.auction_mut(outcome.auction_id)?;
                if auction.finalization != FinalizationState::Finalizing
                    || auction.finalizing_since != Some(claimed_at)
                {
                    return Err(StoreError::Conflict(format!(
                        "finalization claim of {} lost",
                        outcome.auction_id
                    )));
                }

                auction.finalization = FinalizationState::Finalized;
                auction.finalizing_since = None;
                auction.current_high_bid = outcome.amount.or(auction.current_high_bid);
                if outcome.item_sold {
                    auction.status = AuctionStatus::Finished;
                    auction.winner = outcome.winner;
                    auction.sold_amount = outcome.amount;
                } else {
                    auction.status = AuctionStatus::ReserveNotMet;
                }
            }
        }

        Ok(())
    }
}

/// 메모리 기반 경매/입찰/아웃박스 저장소
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 아웃박스 레코드 전체 (생성 순)
    pub async fn outbox_entries(&self) -> Vec<OutboxEntry> {
        self.tables.lock().await.outbox.clone()
    }

    pub async fn auction(&self, id: Uuid) -> Option<Auction> {
        self.tables.lock().await.auctions.get(&id).cloned()
    }
}

#[async_trait]
impl AuctionStore for MemoryStore {
    async fn get_auction(&self, id: Uuid) -> Result<Option<Auction>, StoreError> {
        Ok(self.tables.lock().await.auctions.get(&id).cloned())
    }

    async fn auctions_due(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.tables.lock().await;
        let mut due: Vec<&Auction> = tables
            .auctions
            .values()
            .filter(|auction| auction.auction_end < now && is_claimable(auction, stale_before))
            .collect();
        due.sort_by_key(|auction| auction.auction_end);

        Ok(due
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|auction| auction.id)
            .collect())
    }

    async fn try_begin_finalizing(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Auction>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(auction) = tables.auctions.get_mut(&id) else {
            return Ok(None);
        };
        if auction.auction_end >= now || !is_claimable(auction, stale_before) {
            return Ok(None);
        }

        auction.finalization = FinalizationState::Finalizing;
        auction.finalizing_since = Some(now);
        Ok(Some(auction.clone()))
    }
}

/// Open 이거나 stale_before 이전부터 Finalizing 에 멈춰 있는지
fn is_claimable(auction: &Auction, stale_before: DateTime<Utc>) -> bool {
    match auction.finalization {
        FinalizationState::Open => true,
        FinalizationState::Finalizing => auction
            .finalizing_since
            .map_or(true, |since| since < stale_before),
        FinalizationState::Finalized => false,
    }
}

#[async_trait]
impl AuctionDirectory for MemoryStore {
    async fn auction_summary(&self, id: Uuid) -> Result<Option<AuctionSummary>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .auctions
            .get(&id)
            .map(Auction::summary))
    }
}

#[async_trait]
impl BidStore for MemoryStore {
    async fn highest_bid(&self, auction_id: Uuid) -> Result<Option<Bid>, StoreError> {
        Ok(self.tables.lock().await.highest_bid(auction_id).cloned())
    }

    async fn bids_for_auction(&self, auction_id: Uuid) -> Result<Vec<Bid>, StoreError> {
        let tables = self.tables.lock().await;
        let mut bids: Vec<Bid> = tables
            .bids
            .iter()
            .filter(|bid| bid.auction_id == auction_id)
            .cloned()
            .collect();
        bids.sort_by(|a, b| b.bid_time.cmp(&a.bid_time));
        Ok(bids)
    }
}

#[async_trait]
impl Outbox for MemoryStore {
    async fn commit(
        &self,
        mutation: Mutation,
        event: AuctionEvent,
    ) -> Result<OutboxEntry, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.apply(mutation)?;

        let entry = OutboxEntry::new(event, Utc::now());
        tables.outbox.push(entry.clone());
        Ok(entry)
    }

    async fn pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .outbox
            .iter()
            .filter(|entry| !entry.is_dispatched() && entry.next_attempt_at <= now)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_dispatched(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let entry = tables
            .outbox
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(StoreError::NotFound(id))?;
        entry.dispatched_at = Some(at);
        Ok(())
    }

    async fn record_failure(
        &self,
        id: Uuid,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let entry = tables
            .outbox
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(StoreError::NotFound(id))?;
        entry.attempts += 1;
        entry.next_attempt_at = next_attempt_at;
        entry.last_error = Some(error.to_string());
        Ok(())
    }
}
// endregion: --- Memory Store

// region:    --- Memory Search Index
/// 메모리 기반 검색 인덱스
#[derive(Default)]
pub struct MemorySearchIndex {
    items: Mutex<HashMap<Uuid, SearchItem>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn load(&self, id: Uuid) -> Result<Option<SearchItem>, StoreError> {
        Ok(self.items.lock().await.get(&id).cloned())
    }

    async fn save(&self, item: &SearchItem) -> Result<(), StoreError> {
        self.items.lock().await.insert(item.id, item.clone());
        Ok(())
    }

    async fn search(
        &self,
        params: &SearchParams,
        now: DateTime<Utc>,
    ) -> Result<SearchPage, StoreError> {
        let items = self.items.lock().await;
        Ok(search_items(items.values(), params, now))
    }
}
// endregion: --- Memory Search Index
