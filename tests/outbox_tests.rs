mod common;

use async_trait::async_trait;
use auction_marketplace::auction::events::{
    AuctionEvent, AuctionUpdated, EventEnvelope, TOPIC_AUCTION_CREATED,
};
use auction_marketplace::bidding::evaluator::evaluate;
use auction_marketplace::bidding::store::BidStore;
use auction_marketplace::database::MemoryStore;
use auction_marketplace::error::{PublishError, StoreError};
use auction_marketplace::message_broker::{EventBus, InMemoryBus};
use auction_marketplace::outbox::dispatcher::{DispatchReport, DispatcherConfig, OutboxDispatcher};
use auction_marketplace::outbox::{retry_backoff, Mutation, Outbox};
use chrono::{Duration, Utc};
use common::{init_tracing, sample_auction, seed_auction};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn dispatcher(store: &Arc<MemoryStore>, bus: Arc<dyn EventBus>) -> OutboxDispatcher {
    OutboxDispatcher::new(
        store.clone(),
        bus,
        DispatcherConfig {
            interval: StdDuration::from_millis(20),
            batch_size: 100,
            publish_timeout: StdDuration::from_millis(200),
            max_backoff: StdDuration::from_secs(60),
        },
    )
}

/// 특정 경매의 이벤트만 전송에 실패하는 버스
struct PartitionedBus {
    failing: Uuid,
    inner: InMemoryBus,
}

#[async_trait]
impl EventBus for PartitionedBus {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError> {
        if envelope.aggregate_id == self.failing {
            return Err(PublishError::Transport {
                topic: envelope.topic().to_string(),
                reason: "partition offline".to_string(),
            });
        }
        self.inner.publish(envelope).await
    }
}

/// 응답하지 않는 버스
struct HangingBus;

#[async_trait]
impl EventBus for HangingBus {
    async fn publish(&self, _envelope: &EventEnvelope) -> Result<(), PublishError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// 변경이 실패하면 아웃박스 레코드도 남지 않는다
#[tokio::test]
async fn test_failed_mutation_leaves_no_record() {
    let store = MemoryStore::new();
    let missing = Uuid::new_v4();
    let now = Utc::now();

    let result = store
        .commit(
            Mutation::DeleteAuction { id: missing },
            AuctionEvent::AuctionDeleted(auction_marketplace::auction::events::AuctionDeleted {
                id: missing,
                deleted_at: now,
            }),
        )
        .await;

    assert!(matches!(result, Err(StoreError::NotFound(id)) if id == missing));
    assert!(store.outbox_entries().await.is_empty());
}

/// 최고 입찰이 바뀌었으면 입찰도 레코드도 기록되지 않는다
#[tokio::test]
async fn test_stale_bid_commit_is_rejected() {
    let store = MemoryStore::new();
    let auction = seed_auction(
        &store,
        sample_auction("seller", 0, Utc::now() + Duration::hours(1)),
    )
    .await;
    let now = Utc::now();

    let first = evaluate(&auction.summary(), None, "alice", 1000, now);
    store
        .commit(
            Mutation::AppendBid {
                bid: first.clone(),
                expected_highest: None,
            },
            AuctionEvent::BidPlaced((&first).into()),
        )
        .await
        .unwrap();

    // 첫 입찰을 보지 못한 채 판정한 입찰
    let stale = evaluate(&auction.summary(), None, "bob", 900, now);
    let result = store
        .commit(
            Mutation::AppendBid {
                bid: stale.clone(),
                expected_highest: None,
            },
            AuctionEvent::BidPlaced((&stale).into()),
        )
        .await;

    assert!(matches!(result, Err(StoreError::Conflict(_))));
    assert_eq!(store.bids_for_auction(auction.id).await.unwrap().len(), 1);
    assert_eq!(store.outbox_entries().await.len(), 2);
}

/// 전송이 확인된 레코드만 발행 완료로 표시된다
#[tokio::test]
async fn test_dispatch_marks_entries_dispatched() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(InMemoryBus::new());
    let auction = seed_auction(
        &store,
        sample_auction("seller", 0, Utc::now() + Duration::hours(1)),
    )
    .await;
    let dispatcher = dispatcher(&store, bus.clone());

    let report = dispatcher.dispatch_pending(Utc::now()).await.unwrap();
    assert_eq!(
        report,
        DispatchReport {
            published: 1,
            failed: 0,
            held_back: 0
        }
    );

    let entries = store.outbox_entries().await;
    assert!(entries[0].is_dispatched());

    let published = bus.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].id, entries[0].id);
    assert_eq!(published[0].aggregate_id, auction.id);
    assert_eq!(published[0].topic(), TOPIC_AUCTION_CREATED);

    // 이미 발행된 레코드는 다시 보내지 않는다
    let again = dispatcher.dispatch_pending(Utc::now()).await.unwrap();
    assert!(again.is_empty());
    assert_eq!(bus.published().await.len(), 1);
}

/// 버스가 끊겨 있으면 레코드는 남고, 복구 후 같은 id 로 발행된다
#[tokio::test]
async fn test_unreachable_bus_keeps_entry_pending() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(InMemoryBus::new());
    seed_auction(
        &store,
        sample_auction("seller", 0, Utc::now() + Duration::hours(1)),
    )
    .await;
    let dispatcher = dispatcher(&store, bus.clone());

    bus.set_reachable(false);
    let now = Utc::now();
    let report = dispatcher.dispatch_pending(now).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.published, 0);

    let entry = store.outbox_entries().await.remove(0);
    assert!(!entry.is_dispatched());
    assert_eq!(entry.attempts, 1);
    assert!(entry.last_error.is_some());
    assert!(entry.next_attempt_at > now);

    // 백오프 동안은 다시 시도하지 않는다
    assert!(dispatcher.dispatch_pending(now).await.unwrap().is_empty());

    bus.set_reachable(true);
    let report = dispatcher
        .dispatch_pending(now + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(report.published, 1);

    let published = bus.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].id, entry.id);
    assert!(store.outbox_entries().await[0].is_dispatched());
}

/// 한 경매의 레코드가 실패하면 그 경매의 뒤 레코드는 보류되고 다른 경매는 발행된다
#[tokio::test]
async fn test_failure_holds_back_same_auction_only() {
    let store = Arc::new(MemoryStore::new());
    let blocked = seed_auction(
        &store,
        sample_auction("seller", 0, Utc::now() + Duration::hours(1)),
    )
    .await;

    let mut updated = blocked.clone();
    updated.item.color = "Black".to_string();
    updated.updated_at = Utc::now();
    store
        .commit(
            Mutation::UpdateAuction(updated.clone()),
            AuctionEvent::AuctionUpdated(AuctionUpdated::from(&updated)),
        )
        .await
        .unwrap();

    let healthy = seed_auction(
        &store,
        sample_auction("other", 0, Utc::now() + Duration::hours(1)),
    )
    .await;

    let bus = Arc::new(PartitionedBus {
        failing: blocked.id,
        inner: InMemoryBus::new(),
    });
    let dispatcher = dispatcher(&store, bus.clone());

    let report = dispatcher.dispatch_pending(Utc::now()).await.unwrap();
    assert_eq!(
        report,
        DispatchReport {
            published: 1,
            failed: 1,
            held_back: 1
        }
    );

    let published = bus.inner.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].aggregate_id, healthy.id);

    let entries = store.outbox_entries().await;
    // 보류된 레코드는 시도 횟수가 늘지 않는다
    assert_eq!(entries[1].attempts, 0);
    assert!(!entries[1].is_dispatched());
}

/// 전송 시간 초과도 실패로 기록된다
#[tokio::test]
async fn test_publish_timeout_counts_as_failure() {
    let store = Arc::new(MemoryStore::new());
    seed_auction(
        &store,
        sample_auction("seller", 0, Utc::now() + Duration::hours(1)),
    )
    .await;
    let dispatcher = dispatcher(&store, Arc::new(HangingBus));

    let report = dispatcher.dispatch_pending(Utc::now()).await.unwrap();

    assert_eq!(report.failed, 1);
    let entry = store.outbox_entries().await.remove(0);
    assert_eq!(entry.attempts, 1);
    assert!(!entry.is_dispatched());
}

#[test]
fn test_retry_backoff_doubles_until_cap() {
    let base = StdDuration::from_secs(10);
    let max = StdDuration::from_secs(60);

    assert_eq!(retry_backoff(0, base, max), base);
    assert_eq!(retry_backoff(1, base, max), StdDuration::from_secs(10));
    assert_eq!(retry_backoff(2, base, max), StdDuration::from_secs(20));
    assert_eq!(retry_backoff(3, base, max), StdDuration::from_secs(40));
    assert_eq!(retry_backoff(4, base, max), max);
    assert_eq!(retry_backoff(1000, base, max), max);
}

/// 백그라운드 디스패처는 주기적으로 발행하고 취소되면 멈춘다
#[tokio::test]
async fn test_dispatcher_loop_publishes_and_stops() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(InMemoryBus::new());
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(dispatcher(&store, bus.clone()).run(shutdown.clone()));

    seed_auction(
        &store,
        sample_auction("seller", 0, Utc::now() + Duration::hours(1)),
    )
    .await;

    let mut published = 0;
    for _ in 0..50 {
        published = bus.published().await.len();
        if published == 1 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
    assert_eq!(published, 1);

    shutdown.cancel();
    tokio::time::timeout(StdDuration::from_secs(1), handle)
        .await
        .expect("디스패처가 종료되지 않음")
        .unwrap();
}
