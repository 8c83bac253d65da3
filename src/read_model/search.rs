/// 검색 인덱스 컨슈머
/// 경매/입찰 이벤트를 검색용 프로젝션에 반영한다.
///
/// 멱등성 규칙
/// - 차량 정보(model, color, mileage)는 보유한 updated_at 보다 오래되지 않은 이벤트만 반영
/// - 생성 시점 정보(seller, make, year, 최저가, 종료 시각)는 처음 한 번만 채운다
/// - 최고 입찰가는 더 큰 금액일 때만 갱신 (순서와 무관)
/// - 종료 결과는 한 번 반영되면 이후 생성/수정 이벤트가 되돌리지 않는다
/// - 삭제는 툼스톤으로 남겨서 늦게 도착한 이벤트가 되살리지 못한다
// region:    --- Imports
use super::EventHandler;
use crate::auction::events::{
    AuctionCreated, AuctionDeleted, AuctionEvent, AuctionFinished, AuctionUpdated, BidPlaced,
    EventEnvelope, TOPIC_AUCTION_CREATED, TOPIC_AUCTION_DELETED, TOPIC_AUCTION_FINISHED,
    TOPIC_AUCTION_UPDATED, TOPIC_BID_PLACED,
};
use crate::auction::model::AuctionStatus;
use crate::error::{ConsumerError, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

// endregion: --- Imports

// region:    --- Search Item
/// 검색용 경매 프로젝션
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SearchItem {
    pub id: Uuid,
    pub seller: String,
    pub winner: Option<String>,
    pub reserve_price: i64,
    pub sold_amount: Option<i64>,
    pub current_high_bid: Option<i64>,
    pub auction_end: Option<DateTime<Utc>>,
    pub status: AuctionStatus,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub mileage: i32,
    pub image_url: String,
    /// None 이면 아직 AuctionCreated 를 받지 못한 임시 프로젝션
    pub created_at: Option<DateTime<Utc>>,
    /// 마지막으로 반영한 차량 정보의 원천 수정 시각
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SearchItem {
    /// 생성 이벤트보다 다른 이벤트가 먼저 도착했을 때 쓰는 임시 프로젝션
    pub fn placeholder(id: Uuid) -> Self {
        Self {
            id,
            seller: String::new(),
            winner: None,
            reserve_price: 0,
            sold_amount: None,
            current_high_bid: None,
            auction_end: None,
            status: AuctionStatus::Live,
            make: String::new(),
            model: String::new(),
            year: 0,
            color: String::new(),
            mileage: 0,
            image_url: String::new(),
            created_at: None,
            updated_at: None,
            deleted_at: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.created_at.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// 이벤트 반영. 값이 바뀌었으면 true
    pub fn apply(&mut self, event: &AuctionEvent) -> bool {
        let before = self.clone();

        match event {
            AuctionEvent::AuctionDeleted(e) => self.apply_deleted(e),
            _ if self.is_deleted() => {}
            AuctionEvent::AuctionCreated(e) => self.apply_created(e),
            AuctionEvent::AuctionUpdated(e) => self.apply_updated(e),
            AuctionEvent::BidPlaced(e) => self.apply_bid(e),
            AuctionEvent::AuctionFinished(e) => self.apply_finished(e),
        }

        *self != before
    }

    /// 보유 시각보다 오래되지 않았는지
    fn is_fresh(&self, at: DateTime<Utc>) -> bool {
        self.updated_at.map_or(true, |held| at >= held)
    }

    fn apply_created(&mut self, e: &AuctionCreated) {
        if self.is_placeholder() {
            self.seller = e.seller.clone();
            self.reserve_price = e.reserve_price;
            self.auction_end = Some(e.auction_end);
            self.make = e.make.clone();
            self.year = e.year;
            self.image_url = e.image_url.clone();
            self.created_at = Some(e.created_at);
        }

        if self.is_fresh(e.updated_at) {
            self.model = e.model.clone();
            self.color = e.color.clone();
            self.mileage = e.mileage;
            self.updated_at = Some(e.updated_at);
        }
    }

    fn apply_updated(&mut self, e: &AuctionUpdated) {
        if self.is_fresh(e.updated_at) {
            self.model = e.model.clone();
            self.color = e.color.clone();
            self.mileage = e.mileage;
            self.updated_at = Some(e.updated_at);
        }
    }

    fn apply_deleted(&mut self, e: &AuctionDeleted) {
        if self.deleted_at.map_or(true, |held| e.deleted_at > held) {
            self.deleted_at = Some(e.deleted_at);
        }
    }

    fn apply_bid(&mut self, e: &BidPlaced) {
        if e.bid_status.is_accepted() && self.current_high_bid.map_or(true, |high| e.amount > high)
        {
            self.current_high_bid = Some(e.amount);
        }
    }

    fn apply_finished(&mut self, e: &AuctionFinished) {
        if e.item_sold {
            self.status = AuctionStatus::Finished;
            self.winner = e.winner.clone();
            self.sold_amount = e.amount;
        } else {
            self.status = AuctionStatus::ReserveNotMet;
        }

        if let Some(amount) = e.amount {
            if self.current_high_bid.map_or(true, |high| amount > high) {
                self.current_high_bid = Some(amount);
            }
        }
    }
}
// endregion: --- Search Item

// region:    --- Search Params
/// 검색 조건
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchParams {
    pub search_term: Option<String>,
    /// make | model | new (기본: 종료 임박순)
    pub order_by: Option<String>,
    /// finished | endingSoon (기본: 진행 중)
    pub filter_by: Option<String>,
    pub seller: Option<String>,
    pub winner: Option<String>,
    pub page_number: u32,
    pub page_size: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            search_term: None,
            order_by: None,
            filter_by: None,
            seller: None,
            winner: None,
            page_number: 1,
            page_size: 4,
        }
    }
}

/// 검색 결과 페이지
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SearchPage {
    pub results: Vec<SearchItem>,
    pub page_count: u64,
    pub total_count: u64,
}

/// 종료 임박 기준
pub const ENDING_SOON_HOURS: i64 = 6;

/// 메모리 상의 프로젝션 목록 검색
pub fn search_items<'a>(
    items: impl IntoIterator<Item = &'a SearchItem>,
    params: &SearchParams,
    now: DateTime<Utc>,
) -> SearchPage {
    let term = params
        .search_term
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase);
    let ending_soon = now + Duration::hours(ENDING_SOON_HOURS);

    let mut matched: Vec<&SearchItem> = items
        .into_iter()
        .filter(|item| !item.is_placeholder() && !item.is_deleted())
        .filter(|item| match &term {
            Some(term) => [&item.make, &item.model, &item.color]
                .iter()
                .any(|field| field.to_lowercase().contains(term.as_str())),
            None => true,
        })
        .filter(|item| {
            let end = item.auction_end.unwrap_or(now);
            match params.filter_by.as_deref() {
                Some("finished") => end < now,
                Some("endingSoon") => end > now && end < ending_soon,
                _ => end > now,
            }
        })
        .filter(|item| params.seller.as_ref().map_or(true, |s| &item.seller == s))
        .filter(|item| {
            params
                .winner
                .as_ref()
                .map_or(true, |w| item.winner.as_ref() == Some(w))
        })
        .collect();

    matched.sort_by(|a, b| compare(a, b, params.order_by.as_deref()));

    let total_count = matched.len() as u64;
    let page_size = params.page_size.max(1) as u64;
    let page_number = params.page_number.max(1) as u64;
    let page_count = total_count.div_ceil(page_size);

    let results = matched
        .into_iter()
        .skip(((page_number - 1) * page_size) as usize)
        .take(page_size as usize)
        .cloned()
        .collect();

    SearchPage {
        results,
        page_count,
        total_count,
    }
}

fn compare(a: &SearchItem, b: &SearchItem, order_by: Option<&str>) -> Ordering {
    let primary = match order_by {
        Some("make") => a.make.cmp(&b.make),
        Some("model") => a.model.cmp(&b.model),
        Some("new") => b.created_at.cmp(&a.created_at),
        _ => a.auction_end.cmp(&b.auction_end),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}
// endregion: --- Search Params

// region:    --- Search Index
/// 검색 프로젝션 저장소
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<SearchItem>, StoreError>;

    async fn save(&self, item: &SearchItem) -> Result<(), StoreError>;

    async fn search(
        &self,
        params: &SearchParams,
        now: DateTime<Utc>,
    ) -> Result<SearchPage, StoreError>;
}

/// 검색 인덱스 갱신 컨슈머
pub struct SearchIndexer {
    index: Arc<dyn SearchIndex>,
}

impl SearchIndexer {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl EventHandler for SearchIndexer {
    fn name(&self) -> &'static str {
        "search"
    }

    fn topics(&self) -> &'static [&'static str] {
        &[
            TOPIC_AUCTION_CREATED,
            TOPIC_AUCTION_UPDATED,
            TOPIC_AUCTION_DELETED,
            TOPIC_BID_PLACED,
            TOPIC_AUCTION_FINISHED,
        ]
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ConsumerError> {
        let auction_id = envelope.event.auction_id();
        let mut item = match self.index.load(auction_id).await? {
            Some(item) => item,
            None => {
                debug!(
                    "{:<12} --> 프로젝션 없음, 임시 프로젝션 생성: id={}",
                    "Search", auction_id
                );
                SearchItem::placeholder(auction_id)
            }
        };

        if item.apply(&envelope.event) {
            self.index.save(&item).await?;
            info!(
                "{:<12} --> {} 반영: id={}",
                "Search",
                envelope.event.event_type(),
                auction_id
            );
        } else {
            debug!(
                "{:<12} --> 변경 없음(중복 또는 오래된 이벤트): {} id={}",
                "Search",
                envelope.event.event_type(),
                auction_id
            );
        }

        Ok(())
    }
}
// endregion: --- Search Index
