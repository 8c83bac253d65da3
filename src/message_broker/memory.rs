/// 단일 프로세스용 메모리 버스
/// 발행된 봉투를 기록하고 구독자에게 브로드캐스트한다. 연결 끊김을 흉내낼 수 있다.
use super::EventBus;
use crate::auction::events::EventEnvelope;
use crate::error::PublishError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, Mutex};

pub struct InMemoryBus {
    sender: broadcast::Sender<EventEnvelope>,
    published: Mutex<Vec<EventEnvelope>>,
    reachable: AtomicBool,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            sender,
            published: Mutex::new(Vec::new()),
            reachable: AtomicBool::new(true),
        }
    }

    /// false 면 모든 발행이 전송 오류로 실패한다.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// 지금까지 발행된 봉투 (발행 순)
    pub async fn published(&self) -> Vec<EventEnvelope> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(PublishError::Transport {
                topic: envelope.topic().to_string(),
                reason: "broker unreachable".to_string(),
            });
        }

        self.published.lock().await.push(envelope.clone());
        // 구독자가 없어도 발행은 성공
        let _ = self.sender.send(envelope.clone());
        Ok(())
    }
}
