#![allow(dead_code)]

use auction_marketplace::auction::events::{AuctionCreated, AuctionEvent};
use auction_marketplace::auction::model::{Auction, AuctionStatus, FinalizationState, Item};
use auction_marketplace::database::MemoryStore;
use auction_marketplace::outbox::{Mutation, Outbox};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// 트레이싱 초기화 (여러 테스트에서 불려도 한 번만 설치)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .without_time()
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// 테스트용 경매
pub fn sample_auction(seller: &str, reserve_price: i64, auction_end: DateTime<Utc>) -> Auction {
    let created_at = Utc::now() - Duration::days(1);
    Auction {
        id: Uuid::new_v4(),
        seller: seller.to_string(),
        winner: None,
        reserve_price,
        sold_amount: None,
        current_high_bid: None,
        auction_end,
        status: AuctionStatus::Live,
        finalization: FinalizationState::Open,
        finalizing_since: None,
        item: Item {
            make: "Ford".to_string(),
            model: "GT".to_string(),
            year: 2020,
            color: "White".to_string(),
            mileage: 50_000,
            image_url: "https://cdn.example.com/ford-gt.jpg".to_string(),
        },
        created_at,
        updated_at: created_at,
    }
}

/// 경매를 저장소에 바로 기록 (종료 시각 검증 없이)
pub async fn seed_auction(store: &MemoryStore, auction: Auction) -> Auction {
    let event = AuctionEvent::AuctionCreated(AuctionCreated::from(&auction));
    store
        .commit(Mutation::CreateAuction(auction.clone()), event)
        .await
        .expect("경매 생성 실패");
    auction
}
