mod common;

use auction_marketplace::auction::events::{AuctionEvent, BidPlaced};
use auction_marketplace::auction::model::{AuctionStatus, FinalizationState};
use auction_marketplace::auction::store::AuctionStore;
use auction_marketplace::bidding::commands::{BiddingConfig, BiddingService, PlaceBidCommand};
use auction_marketplace::bidding::evaluator::evaluate;
use auction_marketplace::bidding::model::BidStatus;
use auction_marketplace::bidding::store::BidStore;
use auction_marketplace::database::MemoryStore;
use auction_marketplace::error::StoreError;
use auction_marketplace::outbox::{Mutation, Outbox};
use auction_marketplace::scheduler::{
    compute_outcome, AuctionScheduler, FinalizeReport, FinalizerConfig,
};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use common::{init_tracing, sample_auction, seed_auction};
use std::sync::Arc;
use uuid::Uuid;

fn scheduler(store: &Arc<MemoryStore>) -> AuctionScheduler {
    AuctionScheduler::new(
        store.clone(),
        store.clone(),
        store.clone(),
        FinalizerConfig::default(),
    )
}

async fn place_bids(store: &Arc<MemoryStore>, auction_id: Uuid, bids: &[(&str, i64)]) {
    let bidding = BiddingService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        BiddingConfig::default(),
    );
    for (bidder, amount) in bids {
        bidding
            .place_bid(
                bidder,
                PlaceBidCommand {
                    auction_id,
                    amount: *amount,
                },
            )
            .await
            .unwrap();
    }
}

async fn finished_events(store: &MemoryStore, auction_id: Uuid) -> Vec<AuctionEvent> {
    store
        .outbox_entries()
        .await
        .into_iter()
        .map(|entry| entry.event)
        .filter(|event| {
            matches!(event, AuctionEvent::AuctionFinished(e) if e.auction_id == auction_id)
        })
        .collect()
}

/// 진행 중인 경매를 만들고 입찰한 뒤 종료 시각 이후 시점을 돌려준다
async fn auction_with_bids(
    store: &Arc<MemoryStore>,
    reserve_price: i64,
    bids: &[(&str, i64)],
) -> (Uuid, DateTime<Utc>) {
    let end = Utc::now() + Duration::minutes(10);
    let auction = seed_auction(store, sample_auction("seller", reserve_price, end)).await;
    place_bids(store, auction.id, bids).await;
    (auction.id, end + Duration::seconds(1))
}

#[tokio::test]
async fn test_sold_auction_is_finalized_with_winner() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let (id, after_end) =
        auction_with_bids(&store, 5000, &[("alice", 4000), ("bob", 6000), ("carol", 5500)]).await;

    let report = scheduler(&store).run_cycle(after_end).await.unwrap();
    assert_eq!(
        report,
        FinalizeReport {
            finalized: 1,
            skipped: 0
        }
    );

    let auction = store.auction(id).await.unwrap();
    assert_eq!(auction.finalization, FinalizationState::Finalized);
    assert_eq!(auction.status, AuctionStatus::Finished);
    assert_eq!(auction.winner.as_deref(), Some("bob"));
    assert_eq!(auction.sold_amount, Some(6000));
    assert_eq!(auction.current_high_bid, Some(6000));
    assert!(auction.finalizing_since.is_none());

    let events = finished_events(&store, id).await;
    assert_eq!(events.len(), 1);
    let AuctionEvent::AuctionFinished(finished) = &events[0] else {
        panic!("AuctionFinished 가 아님");
    };
    assert!(finished.item_sold);
    assert_eq!(finished.winner.as_deref(), Some("bob"));
    assert_eq!(finished.seller, "seller");
    assert_eq!(finished.amount, Some(6000));
}

#[tokio::test]
async fn test_auction_without_bids_is_unsold() {
    let store = Arc::new(MemoryStore::new());
    let (id, after_end) = auction_with_bids(&store, 0, &[]).await;

    scheduler(&store).run_cycle(after_end).await.unwrap();

    let auction = store.auction(id).await.unwrap();
    assert_eq!(auction.status, AuctionStatus::ReserveNotMet);
    assert_eq!(auction.winner, None);
    assert_eq!(auction.sold_amount, None);

    let events = finished_events(&store, id).await;
    let AuctionEvent::AuctionFinished(finished) = &events[0] else {
        panic!("AuctionFinished 가 아님");
    };
    assert!(!finished.item_sold);
    assert_eq!(finished.winner, None);
    assert_eq!(finished.amount, None);
}

/// 최저가 미달이면 유찰이지만 최고 입찰가는 보고된다
#[tokio::test]
async fn test_below_reserve_is_unsold_but_reports_amount() {
    let store = Arc::new(MemoryStore::new());
    let (id, after_end) = auction_with_bids(&store, 5000, &[("alice", 4000)]).await;

    scheduler(&store).run_cycle(after_end).await.unwrap();

    let auction = store.auction(id).await.unwrap();
    assert_eq!(auction.status, AuctionStatus::ReserveNotMet);
    assert_eq!(auction.winner, None);
    assert_eq!(auction.sold_amount, None);
    assert_eq!(auction.current_high_bid, Some(4000));

    let events = finished_events(&store, id).await;
    let AuctionEvent::AuctionFinished(finished) = &events[0] else {
        panic!("AuctionFinished 가 아님");
    };
    assert!(!finished.item_sold);
    assert_eq!(finished.winner, None);
    assert_eq!(finished.amount, Some(4000));
}

/// 종료 시각 전이나 정확히 종료 시각에는 처리하지 않는다
#[tokio::test]
async fn test_auction_not_due_before_end() {
    let store = Arc::new(MemoryStore::new());
    let end = (Utc::now() + Duration::minutes(10)).trunc_subsecs(6);
    let auction = seed_auction(&store, sample_auction("seller", 0, end)).await;
    let scheduler = scheduler(&store);

    let before = scheduler.run_cycle(end - Duration::seconds(1)).await.unwrap();
    let exactly = scheduler.run_cycle(end).await.unwrap();

    assert_eq!(before, FinalizeReport::default());
    assert_eq!(exactly, FinalizeReport::default());
    assert_eq!(
        store.auction(auction.id).await.unwrap().finalization,
        FinalizationState::Open
    );
}

/// 이미 종료된 경매는 다시 처리되지 않는다
#[tokio::test]
async fn test_finalization_happens_once() {
    let store = Arc::new(MemoryStore::new());
    let (id, after_end) = auction_with_bids(&store, 0, &[("alice", 100)]).await;
    let scheduler = scheduler(&store);

    scheduler.run_cycle(after_end).await.unwrap();
    let second = scheduler
        .run_cycle(after_end + Duration::minutes(5))
        .await
        .unwrap();

    assert_eq!(second, FinalizeReport::default());
    assert_eq!(finished_events(&store, id).await.len(), 1);
}

/// 여러 인스턴스가 동시에 돌아도 종료 이벤트는 하나
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_competing_schedulers_finalize_once() {
    let store = Arc::new(MemoryStore::new());
    let (id, after_end) = auction_with_bids(&store, 0, &[("alice", 100)]).await;
    let first = scheduler(&store);
    let second = scheduler(&store);

    let (a, b) = tokio::join!(first.run_cycle(after_end), second.run_cycle(after_end));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.finalized + b.finalized, 1);
    assert_eq!(finished_events(&store, id).await.len(), 1);
}

/// 처리 도중 멈춘 경매는 유예 시간이 지나면 다시 처리된다
#[tokio::test]
async fn test_stale_claim_is_reclaimed_after_grace() {
    let store = Arc::new(MemoryStore::new());
    let auction = seed_auction(
        &store,
        sample_auction("seller", 0, Utc::now() - Duration::minutes(1)),
    )
    .await;
    let crashed_at = Utc::now().trunc_subsecs(6);

    // 다른 인스턴스가 선점한 뒤 멈춘 상황
    let claimed = store
        .try_begin_finalizing(auction.id, crashed_at, crashed_at - Duration::seconds(30))
        .await
        .unwrap();
    assert!(claimed.is_some());

    let scheduler = scheduler(&store);
    let within_grace = scheduler
        .run_cycle(crashed_at + Duration::seconds(5))
        .await
        .unwrap();
    assert_eq!(within_grace, FinalizeReport::default());
    assert_eq!(
        store.auction(auction.id).await.unwrap().finalization,
        FinalizationState::Finalizing
    );

    let after_grace = scheduler
        .run_cycle(crashed_at + Duration::seconds(31))
        .await
        .unwrap();
    assert_eq!(after_grace.finalized, 1);
    assert_eq!(
        store.auction(auction.id).await.unwrap().finalization,
        FinalizationState::Finalized
    );
    assert_eq!(finished_events(&store, auction.id).await.len(), 1);
}

/// 선점 시각이 바뀌었으면 종료 커밋은 거절된다
#[tokio::test]
async fn test_finalize_commit_requires_current_claim() {
    let store = Arc::new(MemoryStore::new());
    let auction = seed_auction(
        &store,
        sample_auction("seller", 0, Utc::now() - Duration::minutes(1)),
    )
    .await;
    let claimed_at = Utc::now().trunc_subsecs(6);
    let claimed = store
        .try_begin_finalizing(auction.id, claimed_at, claimed_at - Duration::seconds(30))
        .await
        .unwrap()
        .unwrap();
    let outcome = compute_outcome(&claimed, None);

    let stale = store
        .commit(
            Mutation::FinalizeAuction {
                claimed_at: claimed_at - Duration::seconds(1),
                outcome: outcome.clone(),
            },
            AuctionEvent::AuctionFinished(outcome.clone()),
        )
        .await;
    assert!(matches!(stale, Err(StoreError::Conflict(_))));
    assert!(finished_events(&store, auction.id).await.is_empty());

    store
        .commit(
            Mutation::FinalizeAuction {
                claimed_at,
                outcome: outcome.clone(),
            },
            AuctionEvent::AuctionFinished(outcome),
        )
        .await
        .unwrap();
    assert_eq!(finished_events(&store, auction.id).await.len(), 1);
}

/// 같은 입력이면 같은 결과
#[test]
fn test_compute_outcome_is_deterministic() {
    let end = Utc::now() - Duration::minutes(1);
    let auction = sample_auction("seller", 5000, end);
    let summary = auction.summary();
    let accepted = evaluate(&summary, None, "bob", 6000, end - Duration::minutes(5));
    let below = evaluate(&summary, None, "alice", 4000, end - Duration::minutes(5));

    assert_eq!(accepted.status, BidStatus::Accepted);
    assert_eq!(below.status, BidStatus::AcceptedBelowReserve);

    let first = compute_outcome(&auction, Some(&accepted));
    let second = compute_outcome(&auction, Some(&accepted));
    assert_eq!(first, second);
    assert!(first.item_sold);
    assert_eq!(first.finished_at, end);

    let unsold = compute_outcome(&auction, Some(&below));
    assert!(!unsold.item_sold);
    assert_eq!(unsold.winner, None);
    assert_eq!(unsold.amount, Some(4000));
}

/// 종료 후 들어온 입찰은 결과를 바꾸지 않는다
#[tokio::test]
async fn test_late_bid_does_not_change_outcome() {
    let store = Arc::new(MemoryStore::new());
    let auction = seed_auction(
        &store,
        sample_auction("seller", 0, Utc::now() - Duration::minutes(1)),
    )
    .await;
    scheduler(&store).run_cycle(Utc::now()).await.unwrap();

    place_bids(&store, auction.id, &[("alice", 9999)]).await;

    let stored = store.auction(auction.id).await.unwrap();
    assert_eq!(stored.status, AuctionStatus::ReserveNotMet);
    assert_eq!(stored.current_high_bid, None);
    assert_eq!(finished_events(&store, auction.id).await.len(), 1);
}

/// 선점 -> 유효 입찰 추가 -> 종료 커밋 순서로 끼어들어도 결과와 원장이 어긋나지 않는다
#[tokio::test]
async fn test_accepted_bid_cannot_slip_in_after_claim() {
    let store = Arc::new(MemoryStore::new());
    let end = Utc::now() - Duration::minutes(1);
    let auction = seed_auction(&store, sample_auction("seller", 0, end)).await;

    let claimed_at = Utc::now().trunc_subsecs(6);
    let claimed = store
        .try_begin_finalizing(auction.id, claimed_at, claimed_at - Duration::seconds(30))
        .await
        .unwrap()
        .unwrap();
    let highest = store.highest_bid(auction.id).await.unwrap();
    let outcome = compute_outcome(&claimed, highest.as_ref());

    // 종료 직전에 판정된 유효 입찰
    let late = evaluate(&claimed.summary(), None, "alice", 500, end - Duration::seconds(1));
    assert_eq!(late.status, BidStatus::Accepted);
    let appended = store
        .commit(
            Mutation::AppendBid {
                bid: late.clone(),
                expected_highest: None,
            },
            AuctionEvent::BidPlaced(BidPlaced::from(&late)),
        )
        .await;
    assert!(matches!(appended, Err(StoreError::AuctionClosed(id)) if id == auction.id));

    // 종료 처리 중이라도 Finished 입찰은 기록된다
    let mut finished = late.clone();
    finished.status = BidStatus::Finished;
    store
        .commit(
            Mutation::AppendBid {
                bid: finished.clone(),
                expected_highest: None,
            },
            AuctionEvent::BidPlaced(BidPlaced::from(&finished)),
        )
        .await
        .unwrap();

    store
        .commit(
            Mutation::FinalizeAuction {
                claimed_at,
                outcome: outcome.clone(),
            },
            AuctionEvent::AuctionFinished(outcome.clone()),
        )
        .await
        .unwrap();

    assert!(!outcome.item_sold);
    assert_eq!(store.highest_bid(auction.id).await.unwrap(), None);
    let stored = store.auction(auction.id).await.unwrap();
    assert_eq!(stored.status, AuctionStatus::ReserveNotMet);
    assert_eq!(stored.winner, None);
    assert_eq!(stored.current_high_bid, None);
}

/// 판정 후 커밋 전에 종료 처리가 시작되면 입찰은 Finished 로 기록된다
#[tokio::test]
async fn test_bid_racing_the_claim_is_recorded_finished() {
    let store = Arc::new(MemoryStore::new());
    let end = Utc::now() + Duration::hours(1);
    let auction = seed_auction(&store, sample_auction("seller", 0, end)).await;

    // 다른 인스턴스의 시계가 앞서서 이미 선점한 상황
    let claimed_at = (end + Duration::seconds(1)).trunc_subsecs(6);
    store
        .try_begin_finalizing(auction.id, claimed_at, claimed_at - Duration::seconds(30))
        .await
        .unwrap()
        .unwrap();

    place_bids(&store, auction.id, &[("alice", 500)]).await;

    let bids = store.bids_for_auction(auction.id).await.unwrap();
    assert_eq!(bids.len(), 1);
    assert_eq!(bids[0].status, BidStatus::Finished);
    assert_eq!(store.highest_bid(auction.id).await.unwrap(), None);
    assert_eq!(store.auction(auction.id).await.unwrap().current_high_bid, None);

    let placed: Vec<BidStatus> = store
        .outbox_entries()
        .await
        .iter()
        .filter_map(|entry| match &entry.event {
            AuctionEvent::BidPlaced(e) => Some(e.bid_status),
            _ => None,
        })
        .collect();
    assert_eq!(placed, vec![BidStatus::Finished]);
}

#[test]
fn test_has_reserve_price() {
    let end = Utc::now() + Duration::hours(1);
    assert!(sample_auction("seller", 5000, end).has_reserve_price());
    assert!(!sample_auction("seller", 0, end).has_reserve_price());
}
