use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::{Auction, AuctionStatus};
use crate::bidding::model::{Bid, BidStatus};

// region:    --- Topics
pub const TOPIC_AUCTION_CREATED: &str = "auction-created";
pub const TOPIC_AUCTION_UPDATED: &str = "auction-updated";
pub const TOPIC_AUCTION_DELETED: &str = "auction-deleted";
pub const TOPIC_BID_PLACED: &str = "bid-placed";
pub const TOPIC_AUCTION_FINISHED: &str = "auction-finished";

/// 모든 이벤트 토픽
pub const ALL_TOPICS: [&str; 5] = [
    TOPIC_AUCTION_CREATED,
    TOPIC_AUCTION_UPDATED,
    TOPIC_AUCTION_DELETED,
    TOPIC_BID_PLACED,
    TOPIC_AUCTION_FINISHED,
];
// endregion: --- Topics

// region:    --- Event Payloads
/// 경매 생성 이벤트
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuctionCreated {
    pub id: Uuid,
    pub seller: String,
    pub reserve_price: i64,
    pub auction_end: DateTime<Utc>,
    pub status: AuctionStatus,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub mileage: i32,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Auction> for AuctionCreated {
    fn from(auction: &Auction) -> Self {
        Self {
            id: auction.id,
            seller: auction.seller.clone(),
            reserve_price: auction.reserve_price,
            auction_end: auction.auction_end,
            status: auction.status,
            make: auction.item.make.clone(),
            model: auction.item.model.clone(),
            year: auction.item.year,
            color: auction.item.color.clone(),
            mileage: auction.item.mileage,
            image_url: auction.item.image_url.clone(),
            created_at: auction.created_at,
            updated_at: auction.updated_at,
        }
    }
}

/// 경매 수정 이벤트
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuctionUpdated {
    pub id: Uuid,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub mileage: i32,
    pub updated_at: DateTime<Utc>,
}

impl From<&Auction> for AuctionUpdated {
    fn from(auction: &Auction) -> Self {
        Self {
            id: auction.id,
            make: auction.item.make.clone(),
            model: auction.item.model.clone(),
            year: auction.item.year,
            color: auction.item.color.clone(),
            mileage: auction.item.mileage,
            updated_at: auction.updated_at,
        }
    }
}

/// 경매 삭제 이벤트
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuctionDeleted {
    pub id: Uuid,
    pub deleted_at: DateTime<Utc>,
}

/// 입찰 이벤트
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BidPlaced {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub bidder: String,
    pub amount: i64,
    pub bid_status: BidStatus,
    pub bid_time: DateTime<Utc>,
}

impl From<&Bid> for BidPlaced {
    fn from(bid: &Bid) -> Self {
        Self {
            id: bid.id,
            auction_id: bid.auction_id,
            bidder: bid.bidder.clone(),
            amount: bid.amount,
            bid_status: bid.status,
            bid_time: bid.bid_time,
        }
    }
}

/// 경매 종료 이벤트
/// amount 는 낙찰 여부와 관계없이 최고 입찰가 (입찰이 없으면 None)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuctionFinished {
    pub item_sold: bool,
    pub auction_id: Uuid,
    pub winner: Option<String>,
    pub seller: String,
    pub amount: Option<i64>,
    pub finished_at: DateTime<Utc>,
}
// endregion: --- Event Payloads

// region:    --- Auction Event
/// 도메인 이벤트
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event_type", content = "data")]
pub enum AuctionEvent {
    AuctionCreated(AuctionCreated),
    AuctionUpdated(AuctionUpdated),
    AuctionDeleted(AuctionDeleted),
    BidPlaced(BidPlaced),
    AuctionFinished(AuctionFinished),
}

impl AuctionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AuctionEvent::AuctionCreated(_) => "AuctionCreated",
            AuctionEvent::AuctionUpdated(_) => "AuctionUpdated",
            AuctionEvent::AuctionDeleted(_) => "AuctionDeleted",
            AuctionEvent::BidPlaced(_) => "BidPlaced",
            AuctionEvent::AuctionFinished(_) => "AuctionFinished",
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            AuctionEvent::AuctionCreated(_) => TOPIC_AUCTION_CREATED,
            AuctionEvent::AuctionUpdated(_) => TOPIC_AUCTION_UPDATED,
            AuctionEvent::AuctionDeleted(_) => TOPIC_AUCTION_DELETED,
            AuctionEvent::BidPlaced(_) => TOPIC_BID_PLACED,
            AuctionEvent::AuctionFinished(_) => TOPIC_AUCTION_FINISHED,
        }
    }

    pub fn auction_id(&self) -> Uuid {
        match self {
            AuctionEvent::AuctionCreated(e) => e.id,
            AuctionEvent::AuctionUpdated(e) => e.id,
            AuctionEvent::AuctionDeleted(e) => e.id,
            AuctionEvent::BidPlaced(e) => e.auction_id,
            AuctionEvent::AuctionFinished(e) => e.auction_id,
        }
    }
}
// endregion: --- Auction Event

// region:    --- Envelope
/// 버스로 전달되는 이벤트 봉투
/// id 는 아웃박스 레코드 id 와 같아서 재전송되어도 변하지 않는다.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: AuctionEvent,
}

impl EventEnvelope {
    pub fn topic(&self) -> &'static str {
        self.event.topic()
    }
}
// endregion: --- Envelope
