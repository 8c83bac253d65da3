/// Postgres 저장소
/// 커밋은 DatabaseManager::transaction 안에서 변경과 아웃박스 레코드를 함께 기록한다.
/// 같은 경매의 입찰과 종료 선점은 경매 행 락(FOR UPDATE)으로 직렬화하고,
/// 락 대기는 lock_timeout 으로 제한한다.
// region:    --- Imports
use super::DatabaseManager;
use crate::auction::events::AuctionEvent;
use crate::auction::model::{Auction, AuctionStatus, AuctionSummary, FinalizationState, Item};
use crate::auction::store::{AuctionDirectory, AuctionStore};
use crate::bidding::model::Bid;
use crate::bidding::store::BidStore;
use crate::error::StoreError;
use crate::outbox::{Mutation, Outbox, OutboxEntry};
use crate::query::queries;
use crate::read_model::search::{
    SearchIndex, SearchItem, SearchPage, SearchParams, ENDING_SOON_HOURS,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::debug;
use uuid::Uuid;

// endregion: --- Imports

// region:    --- Rows
#[derive(Debug, FromRow)]
struct AuctionRow {
    id: Uuid,
    seller: String,
    winner: Option<String>,
    reserve_price: i64,
    sold_amount: Option<i64>,
    current_high_bid: Option<i64>,
    auction_end: DateTime<Utc>,
    status: String,
    finalization: String,
    finalizing_since: Option<DateTime<Utc>>,
    make: String,
    model: String,
    year: i32,
    color: String,
    mileage: i32,
    image_url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AuctionRow> for Auction {
    type Error = StoreError;

    fn try_from(row: AuctionRow) -> Result<Self, Self::Error> {
        Ok(Auction {
            id: row.id,
            seller: row.seller,
            winner: row.winner,
            reserve_price: row.reserve_price,
            sold_amount: row.sold_amount,
            current_high_bid: row.current_high_bid,
            auction_end: row.auction_end,
            status: row.status.parse()?,
            finalization: row.finalization.parse()?,
            finalizing_since: row.finalizing_since,
            item: Item {
                make: row.make,
                model: row.model,
                year: row.year,
                color: row.color,
                mileage: row.mileage,
                image_url: row.image_url,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    id: Uuid,
    seller: String,
    reserve_price: i64,
    auction_end: DateTime<Utc>,
}

impl From<SummaryRow> for AuctionSummary {
    fn from(row: SummaryRow) -> Self {
        AuctionSummary {
            auction_id: row.id,
            seller: row.seller,
            reserve_price: row.reserve_price,
            auction_end: row.auction_end,
        }
    }
}

#[derive(Debug, FromRow)]
struct BidRow {
    id: Uuid,
    auction_id: Uuid,
    bidder: String,
    amount: i64,
    bid_time: DateTime<Utc>,
    status: String,
}

impl TryFrom<BidRow> for Bid {
    type Error = StoreError;

    fn try_from(row: BidRow) -> Result<Self, Self::Error> {
        Ok(Bid {
            id: row.id,
            auction_id: row.auction_id,
            bidder: row.bidder,
            amount: row.amount,
            bid_time: row.bid_time,
            status: row.status.parse()?,
        })
    }
}

#[derive(Debug, FromRow)]
struct OutboxRow {
    id: Uuid,
    aggregate_id: Uuid,
    topic: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    attempts: i32,
    next_attempt_at: DateTime<Utc>,
    last_error: Option<String>,
    dispatched_at: Option<DateTime<Utc>>,
}

impl TryFrom<OutboxRow> for OutboxEntry {
    type Error = StoreError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        Ok(OutboxEntry {
            id: row.id,
            aggregate_id: row.aggregate_id,
            topic: row.topic,
            event: serde_json::from_value(row.payload)?,
            created_at: row.created_at,
            attempts: row.attempts,
            next_attempt_at: row.next_attempt_at,
            last_error: row.last_error,
            dispatched_at: row.dispatched_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SearchRow {
    id: Uuid,
    seller: String,
    winner: Option<String>,
    reserve_price: i64,
    sold_amount: Option<i64>,
    current_high_bid: Option<i64>,
    auction_end: Option<DateTime<Utc>>,
    status: String,
    make: String,
    model: String,
    year: i32,
    color: String,
    mileage: i32,
    image_url: String,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<SearchRow> for SearchItem {
    type Error = StoreError;

    fn try_from(row: SearchRow) -> Result<Self, Self::Error> {
        Ok(SearchItem {
            id: row.id,
            seller: row.seller,
            winner: row.winner,
            reserve_price: row.reserve_price,
            sold_amount: row.sold_amount,
            current_high_bid: row.current_high_bid,
            auction_end: row.auction_end,
            status: row.status.parse()?,
            make: row.make,
            model: row.model,
            year: row.year,
            color: row.color,
            mileage: row.mileage,
            image_url: row.image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}
// endregion: --- Rows

// region:    --- Pg Store
/// Postgres 기반 경매/입찰/아웃박스 저장소
pub struct PgStore {
    db: Arc<DatabaseManager>,
    lock_timeout: StdDuration,
}

impl PgStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self {
            db,
            lock_timeout: StdDuration::from_millis(500),
        }
    }

    /// 경매 행 락 대기 시간 설정
    pub fn with_lock_timeout(mut self, lock_timeout: StdDuration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

// lock_not_available
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// 락 대기 시간 초과는 LockTimeout 으로 구분
fn lock_error(e: sqlx::Error, id: Uuid) -> StoreError {
    let timed_out = e
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == LOCK_NOT_AVAILABLE);
    if timed_out {
        StoreError::LockTimeout(id)
    } else {
        StoreError::Database(e)
    }
}

/// 조건부 UPDATE/DELETE 가 아무 행도 바꾸지 못했을 때의 원인 구분
async fn missing_or_conflict(conn: &mut PgConnection, id: Uuid, reason: &str) -> StoreError {
    match sqlx::query_scalar::<_, bool>(queries::AUCTION_EXISTS)
        .bind(id)
        .fetch_one(conn)
        .await
    {
        Ok(true) => StoreError::Conflict(format!("{reason}: {id}")),
        Ok(false) => StoreError::NotFound(id),
        Err(e) => StoreError::Database(e),
    }
}

/// 트랜잭션 안에서 변경 적용
async fn apply_mutation(
    conn: &mut PgConnection,
    mutation: Mutation,
    lock_timeout: StdDuration,
) -> Result<(), StoreError> {
    match mutation {
        Mutation::CreateAuction(auction) => {
            sqlx::query(queries::INSERT_AUCTION)
                .bind(auction.id)
                .bind(&auction.seller)
                .bind(&auction.winner)
                .bind(auction.reserve_price)
                .bind(auction.sold_amount)
                .bind(auction.current_high_bid)
                .bind(auction.auction_end)
                .bind(auction.status.as_str())
                .bind(auction.finalization.as_str())
                .bind(auction.finalizing_since)
                .bind(&auction.item.make)
                .bind(&auction.item.model)
                .bind(auction.item.year)
                .bind(&auction.item.color)
                .bind(auction.item.mileage)
                .bind(&auction.item.image_url)
                .bind(auction.created_at)
                .bind(auction.updated_at)
                .execute(&mut *conn)
                .await?;
        }
        Mutation::UpdateAuction(auction) => {
            let result = sqlx::query(queries::UPDATE_AUCTION_ITEM)
                .bind(auction.id)
                .bind(&auction.item.make)
                .bind(&auction.item.model)
                .bind(auction.item.year)
                .bind(&auction.item.color)
                .bind(auction.item.mileage)
                .bind(auction.updated_at)
                .execute(&mut *conn)
                .await?;
            if result.rows_affected() == 0 {
                return Err(missing_or_conflict(conn, auction.id, "auction is no longer open").await);
            }
        }
        Mutation::DeleteAuction { id } => {
            let result = sqlx::query(queries::DELETE_AUCTION)
                .bind(id)
                .execute(&mut *conn)
                .await?;
            if result.rows_affected() == 0 {
                return Err(missing_or_conflict(conn, id, "auction is no longer open").await);
            }
        }
        Mutation::AppendBid {
            bid,
            expected_highest,
        } => {
            sqlx::query(queries::SET_LOCAL_LOCK_TIMEOUT)
                .bind(format!("{}ms", lock_timeout.as_millis()))
                .execute(&mut *conn)
                .await?;

            // 종료 선점(UPDATE)과 같은 행 락을 잡으므로 둘은 순서대로만 일어난다
            let finalization = sqlx::query_scalar::<_, String>(queries::LOCK_AUCTION_FOR_BID)
                .bind(bid.auction_id)
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| lock_error(e, bid.auction_id))?
                .ok_or(StoreError::NotFound(bid.auction_id))?;
            let finalization: FinalizationState = finalization.parse()?;
            if bid.status.is_accepted() && finalization != FinalizationState::Open {
                return Err(StoreError::AuctionClosed(bid.auction_id));
            }

            let current = sqlx::query_as::<_, BidRow>(queries::SELECT_HIGHEST_BID)
                .bind(bid.auction_id)
                .fetch_optional(&mut *conn)
                .await?
                .map(|row| row.id);
            if current != expected_highest {
                return Err(StoreError::Conflict(format!(
                    "highest bid of {} changed",
                    bid.auction_id
                )));
            }

            sqlx::query(queries::INSERT_BID)
                .bind(bid.id)
                .bind(bid.auction_id)
                .bind(&bid.bidder)
                .bind(bid.amount)
                .bind(bid.bid_time)
                .bind(bid.status.as_str())
                .execute(&mut *conn)
                .await?;

            if bid.status.is_accepted() {
                sqlx::query(queries::RAISE_CURRENT_HIGH_BID)
                    .bind(bid.auction_id)
                    .bind(bid.amount)
                    .execute(&mut *conn)
                    .await?;
            }
        }
        Mutation::FinalizeAuction {
            claimed_at,
            outcome,
        } => {
            let (status, winner, sold_amount) = if outcome.item_sold {
                (AuctionStatus::Finished, outcome.winner.clone(), outcome.amount)
            } else {
                (AuctionStatus::ReserveNotMet, None, None)
            };

            let result = sqlx::query(queries::FINALIZE_AUCTION)
                .bind(outcome.auction_id)
                .bind(claimed_at)
                .bind(status.as_str())
                .bind(winner)
                .bind(sold_amount)
                .bind(outcome.amount)
                .execute(&mut *conn)
                .await?;
            if result.rows_affected() == 0 {
                return Err(
                    missing_or_conflict(conn, outcome.auction_id, "finalization claim lost")
                        .await,
                );
            }
        }
    }

    Ok(())
}

async fn insert_outbox(conn: &mut PgConnection, entry: &OutboxEntry) -> Result<(), StoreError> {
    sqlx::query(queries::INSERT_OUTBOX)
        .bind(entry.id)
        .bind(entry.aggregate_id)
        .bind(&entry.topic)
        .bind(serde_json::to_value(&entry.event)?)
        .bind(entry.created_at)
        .bind(entry.attempts)
        .bind(entry.next_attempt_at)
        .execute(conn)
        .await?;
    Ok(())
}

#[async_trait]
impl AuctionStore for PgStore {
    async fn get_auction(&self, id: Uuid) -> Result<Option<Auction>, StoreError> {
        sqlx::query_as::<_, AuctionRow>(&queries::select_auction())
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .map(Auction::try_from)
            .transpose()
    }

    async fn auctions_due(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        Ok(sqlx::query_scalar::<_, Uuid>(queries::SELECT_AUCTIONS_DUE)
            .bind(now)
            .bind(stale_before)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?)
    }

    async fn try_begin_finalizing(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<Auction>, StoreError> {
        sqlx::query_as::<_, AuctionRow>(&queries::claim_auction())
            .bind(id)
            .bind(now)
            .bind(stale_before)
            .fetch_optional(self.db.pool())
            .await?
            .map(Auction::try_from)
            .transpose()
    }
}

#[async_trait]
impl AuctionDirectory for PgStore {
    async fn auction_summary(&self, id: Uuid) -> Result<Option<AuctionSummary>, StoreError> {
        Ok(sqlx::query_as::<_, SummaryRow>(queries::SELECT_AUCTION_SUMMARY)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .map(AuctionSummary::from))
    }
}

#[async_trait]
impl BidStore for PgStore {
    async fn highest_bid(&self, auction_id: Uuid) -> Result<Option<Bid>, StoreError> {
        sqlx::query_as::<_, BidRow>(queries::SELECT_HIGHEST_BID)
            .bind(auction_id)
            .fetch_optional(self.db.pool())
            .await?
            .map(Bid::try_from)
            .transpose()
    }

    async fn bids_for_auction(&self, auction_id: Uuid) -> Result<Vec<Bid>, StoreError> {
        sqlx::query_as::<_, BidRow>(queries::SELECT_BIDS_FOR_AUCTION)
            .bind(auction_id)
            .fetch_all(self.db.pool())
            .await?
            .into_iter()
            .map(Bid::try_from)
            .collect()
    }
}

#[async_trait]
impl Outbox for PgStore {
    async fn commit(
        &self,
        mutation: Mutation,
        event: AuctionEvent,
    ) -> Result<OutboxEntry, StoreError> {
        let entry = OutboxEntry::new(event, Utc::now());
        let record = entry.clone();
        let lock_timeout = self.lock_timeout;

        self.db
            .transaction(move |tx| {
                Box::pin(async move {
                    apply_mutation(&mut **tx, mutation, lock_timeout).await?;
                    insert_outbox(&mut **tx, &record).await?;
                    Ok::<_, StoreError>(())
                })
            })
            .await?;

        debug!(
            "{:<12} --> 아웃박스 커밋: id={}, topic={}",
            "Outbox", entry.id, entry.topic
        );
        Ok(entry)
    }

    async fn pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        sqlx::query_as::<_, OutboxRow>(queries::SELECT_PENDING_OUTBOX)
            .bind(now)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?
            .into_iter()
            .map(OutboxEntry::try_from)
            .collect()
    }

    async fn mark_dispatched(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(queries::MARK_OUTBOX_DISPATCHED)
            .bind(id)
            .bind(at)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        id: Uuid,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(queries::RECORD_OUTBOX_FAILURE)
            .bind(id)
            .bind(next_attempt_at)
            .bind(error)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}
// endregion: --- Pg Store

// region:    --- Pg Search Index
/// Postgres 기반 검색 인덱스
pub struct PgSearchIndex {
    db: Arc<DatabaseManager>,
}

impl PgSearchIndex {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

/// 검색 조건을 WHERE 절로 추가
fn push_search_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    params: &SearchParams,
    now: DateTime<Utc>,
) {
    builder.push(" WHERE created_at IS NOT NULL AND deleted_at IS NULL");

    if let Some(term) = params
        .search_term
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        let pattern = format!("%{term}%");
        builder
            .push(" AND (make ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR model ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR color ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    match params.filter_by.as_deref() {
        Some("finished") => {
            builder.push(" AND auction_end < ").push_bind(now);
        }
        Some("endingSoon") => {
            builder
                .push(" AND auction_end > ")
                .push_bind(now)
                .push(" AND auction_end < ")
                .push_bind(now + Duration::hours(ENDING_SOON_HOURS));
        }
        _ => {
            builder.push(" AND auction_end > ").push_bind(now);
        }
    }

    if let Some(seller) = &params.seller {
        builder.push(" AND seller = ").push_bind(seller.clone());
    }
    if let Some(winner) = &params.winner {
        builder.push(" AND winner = ").push_bind(winner.clone());
    }
}

#[async_trait]
impl SearchIndex for PgSearchIndex {
    async fn load(&self, id: Uuid) -> Result<Option<SearchItem>, StoreError> {
        sqlx::query_as::<_, SearchRow>(&queries::select_search_item())
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .map(SearchItem::try_from)
            .transpose()
    }

    async fn save(&self, item: &SearchItem) -> Result<(), StoreError> {
        sqlx::query(queries::UPSERT_SEARCH_ITEM)
            .bind(item.id)
            .bind(&item.seller)
            .bind(&item.winner)
            .bind(item.reserve_price)
            .bind(item.sold_amount)
            .bind(item.current_high_bid)
            .bind(item.auction_end)
            .bind(item.status.as_str())
            .bind(&item.make)
            .bind(&item.model)
            .bind(item.year)
            .bind(&item.color)
            .bind(item.mileage)
            .bind(&item.image_url)
            .bind(item.created_at)
            .bind(item.updated_at)
            .bind(item.deleted_at)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn search(
        &self,
        params: &SearchParams,
        now: DateTime<Utc>,
    ) -> Result<SearchPage, StoreError> {
        let page_size = i64::from(params.page_size.max(1));
        let offset = (i64::from(params.page_number.max(1)) - 1) * page_size;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM search_items");
        push_search_filters(&mut count, params, now);
        let total_count: i64 = count
            .build_query_scalar()
            .fetch_one(self.db.pool())
            .await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM search_items",
            queries::SEARCH_ITEM_COLUMNS
        ));
        push_search_filters(&mut select, params, now);
        select.push(match params.order_by.as_deref() {
            Some("make") => " ORDER BY make ASC, id",
            Some("model") => " ORDER BY model ASC, id",
            Some("new") => " ORDER BY created_at DESC, id",
            _ => " ORDER BY auction_end ASC, id",
        });
        select
            .push(" LIMIT ")
            .push_bind(page_size)
            .push(" OFFSET ")
            .push_bind(offset);

        let results = select
            .build_query_as::<SearchRow>()
            .fetch_all(self.db.pool())
            .await?
            .into_iter()
            .map(SearchItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let total_count = total_count.max(0) as u64;
        Ok(SearchPage {
            results,
            page_count: total_count.div_ceil(page_size as u64),
            total_count,
        })
    }
}
// endregion: --- Pg Search Index
