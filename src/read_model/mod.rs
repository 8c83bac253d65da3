/// 읽기 모델 컨슈머
/// 이벤트를 받아 각자의 저장소/채널에 멱등하게 반영한다.
/// 같은 이벤트가 여러 번 오거나 이벤트 종류 간 순서가 뒤바뀌어도 결과가 같아야 한다.
// region:    --- Imports
use crate::auction::events::EventEnvelope;
use crate::error::ConsumerError;
use crate::message_broker::{handle_until_success, HandlerBackoff, KafkaConsumer};
use async_trait::async_trait;
use rdkafka::error::KafkaError;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod notification;
pub mod search;

// endregion: --- Imports

// region:    --- Event Handler
/// 컨슈머 트레이트
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 컨슈머 그룹 이름에 쓰인다.
    fn name(&self) -> &'static str;

    /// 구독할 토픽
    fn topics(&self) -> &'static [&'static str];

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ConsumerError>;
}
// endregion: --- Event Handler

// region:    --- Runners
/// Kafka 컨슈머로 핸들러 구동
pub async fn run_kafka_consumer(
    handler: Arc<dyn EventHandler>,
    consumer: KafkaConsumer,
    shutdown: CancellationToken,
) -> Result<(), KafkaError> {
    let topics = handler.topics();
    consumer
        .consume_events(
            topics,
            |envelope| {
                let handler = Arc::clone(&handler);
                async move { handler.handle(&envelope).await }
            },
            shutdown,
        )
        .await
}

/// 메모리 버스 구독으로 핸들러 구동
/// 구독하지 않은 토픽의 이벤트는 건너뛰고, 실패한 이벤트는 성공할 때까지 다시 처리한다.
pub async fn run_local_consumer(
    handler: Arc<dyn EventHandler>,
    receiver: broadcast::Receiver<EventEnvelope>,
    shutdown: CancellationToken,
) {
    run_local_consumer_with(handler, receiver, HandlerBackoff::default(), shutdown).await
}

/// 재시도 간격을 지정해 로컬 컨슈머 구동
pub async fn run_local_consumer_with(
    handler: Arc<dyn EventHandler>,
    mut receiver: broadcast::Receiver<EventEnvelope>,
    backoff: HandlerBackoff,
    shutdown: CancellationToken,
) {
    info!("{:<12} --> 로컬 컨슈머 시작: {}", "Consumer", handler.name());
    let handle = |envelope: EventEnvelope| {
        let handler = Arc::clone(&handler);
        async move { handler.handle(&envelope).await }
    };

    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            received = receiver.recv() => received,
        };

        match received {
            Ok(envelope) => {
                if !handler.topics().contains(&envelope.topic()) {
                    continue;
                }
                if !handle_until_success(&handle, &envelope, backoff, &shutdown).await {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(
                    "{:<12} --> 처리 지연으로 {}건 누락: {}",
                    "Consumer",
                    skipped,
                    handler.name()
                );
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    info!("{:<12} --> 로컬 컨슈머 종료: {}", "Consumer", handler.name());
}
// endregion: --- Runners
