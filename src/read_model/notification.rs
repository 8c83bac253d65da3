/// 실시간 알림 릴레이
/// 경매 생성, 입찰, 종료 이벤트를 접속 중인 클라이언트에게 그대로 전달한다.
/// 지나간 이벤트는 다시 보내지 않는다. (늦게 접속한 클라이언트는 받지 못함)
// region:    --- Imports
use super::EventHandler;
use crate::auction::events::{
    AuctionEvent, EventEnvelope, TOPIC_AUCTION_CREATED, TOPIC_AUCTION_FINISHED, TOPIC_BID_PLACED,
};
use crate::error::ConsumerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

// endregion: --- Imports

// region:    --- Live Message
/// 클라이언트로 보내는 메시지
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LiveMessage {
    pub event: String,
    pub payload: serde_json::Value,
}
// endregion: --- Live Message

// region:    --- Notification Hub
/// 접속 중인 클라이언트들에게 메시지를 나눠주는 허브
#[derive(Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<LiveMessage>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveMessage> {
        self.sender.subscribe()
    }

    /// 받은 클라이언트 수 반환 (접속자가 없으면 0)
    pub fn publish(&self, message: LiveMessage) -> usize {
        self.sender.send(message).unwrap_or(0)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(256)
    }
}
// endregion: --- Notification Hub

// region:    --- Notification Relay
pub struct NotificationRelay {
    hub: NotificationHub,
}

impl NotificationRelay {
    pub fn new(hub: NotificationHub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl EventHandler for NotificationRelay {
    fn name(&self) -> &'static str {
        "notifications"
    }

    fn topics(&self) -> &'static [&'static str] {
        &[TOPIC_AUCTION_CREATED, TOPIC_BID_PLACED, TOPIC_AUCTION_FINISHED]
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ConsumerError> {
        let payload = match &envelope.event {
            AuctionEvent::AuctionCreated(e) => serde_json::to_value(e)?,
            AuctionEvent::BidPlaced(e) => serde_json::to_value(e)?,
            AuctionEvent::AuctionFinished(e) => serde_json::to_value(e)?,
            AuctionEvent::AuctionUpdated(_) | AuctionEvent::AuctionDeleted(_) => return Ok(()),
        };

        let delivered = self.hub.publish(LiveMessage {
            event: envelope.event.event_type().to_string(),
            payload,
        });
        debug!(
            "{:<12} --> {} 전달: 수신자 {}명",
            "Notify",
            envelope.event.event_type(),
            delivered
        );

        Ok(())
    }
}
// endregion: --- Notification Relay
