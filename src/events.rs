//! 외부(UI 등)로 보내는 알림
//!
//! 용량이 제한된 채널로 불변 스냅샷을 전달한다. 상태/통계 알림은 채널이 가득 차면
//! 버려지고(전송을 막지 않음), 완료 알림은 수신자가 있는 한 항상 전달된다.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time;
use tracing::{info, trace, warn};

use crate::session::Role;
use crate::stats::TransferStats;

/// 알림 종류
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// 사람이 읽는 진행 메시지
    Status(String),

    /// 통계 스냅샷
    StatsUpdated(TransferStats),

    /// 세션 태스크 종료
    OperationCompleted { role: Role, success: bool },
}

/// 알림 수신기 타입
pub type EventReceiver = mpsc::Receiver<TransferEvent>;

/// 알림 송신기
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<TransferEvent>,
}

impl EventSink {
    pub fn channel(capacity: usize) -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn status(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.offer(TransferEvent::Status(message));
    }

    pub fn stats(&self, snapshot: TransferStats) {
        self.offer(TransferEvent::StatsUpdated(snapshot));
    }

    /// 완료 알림. 수신기가 읽지 않고 채널이 찬 채로 `limit`이 지나면 포기한다.
    pub async fn completed(&self, role: Role, success: bool, limit: Duration) {
        let event = TransferEvent::OperationCompleted { role, success };
        if time::timeout(limit, self.tx.send(event)).await.is_err() {
            warn!("완료 알림 전달 실패: 알림 채널이 {:?} 동안 가득 참", limit);
        }
    }

    fn offer(&self, event: TransferEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => trace!("알림 채널 가득 참, 버림: {:?}", event),
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_channel_drops_but_completion_arrives() {
        let (sink, mut rx) = EventSink::channel(1);

        sink.status("first");
        sink.status("dropped");

        let waiter = tokio::spawn({
            let sink = sink.clone();
            async move { sink.completed(Role::Sender, true, Duration::from_secs(5)).await }
        });

        assert_eq!(rx.recv().await, Some(TransferEvent::Status("first".into())));
        assert_eq!(
            rx.recv().await,
            Some(TransferEvent::OperationCompleted {
                role: Role::Sender,
                success: true
            })
        );
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_channel_is_ignored() {
        let (sink, rx) = EventSink::channel(4);
        drop(rx);

        sink.status("nobody listening");
        sink.stats(TransferStats::default());
        sink.completed(Role::Receiver, false, Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_completion_gives_up_on_undrained_channel() {
        let (sink, mut rx) = EventSink::channel(2);
        sink.status("one");
        sink.status("two");

        let finished = time::timeout(
            Duration::from_secs(5),
            sink.completed(Role::Receiver, true, Duration::from_millis(100)),
        )
        .await;
        assert!(finished.is_ok(), "완료 알림이 멈추면 안 됨");

        assert_eq!(rx.recv().await, Some(TransferEvent::Status("one".into())));
        assert_eq!(rx.recv().await, Some(TransferEvent::Status("two".into())));
        assert!(rx.try_recv().is_err());
    }
}
