use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;
use uuid::Uuid;

// 이 이상 쌓이면 쓰이지 않는 락을 정리
const PRUNE_THRESHOLD: usize = 1024;

/// 경매별 상호 배제
/// 같은 경매의 입찰만 직렬화하고 다른 경매는 병렬로 처리된다.
#[derive(Clone, Default)]
pub struct AuctionLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl AuctionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// wait 안에 락을 얻지 못하면 None
    pub async fn acquire(&self, auction_id: Uuid, wait: Duration) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.inner.lock().await;
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(auction_id).or_default())
        };

        timeout(wait, lock.lock_owned()).await.ok()
    }
}
