//! 알림 전송
//!
//! [`NotificationSink`]는 "알림 발생" 한 가지 동작만 가지는 fire-and-forget 인터페이스입니다.
//! 전달 방식은 구현체가 결정하며, 실패해도 호출자에게 에러를 돌려주지 않습니다.

use tokio::sync::mpsc;
use tracing::warn;

use deployscan_core::event::{AlertEvent, Event};

/// 알림 전송 인터페이스
pub trait NotificationSink: Send + Sync + 'static {
    /// 알림을 발생시킵니다. 블로킹하지 않습니다.
    fn raise(&self, alert: AlertEvent);
}

/// 경고 로그로 알림을 남기는 기본 sink
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn raise(&self, alert: AlertEvent) {
        warn!(
            alert_id = %alert.event_id(),
            event_type = alert.event_type(),
            trace_id = %alert.metadata().trace_id,
            image = %alert.image,
            scan_id = %alert.scan_id,
            severity = %alert.severity,
            result_location = %alert.result_location,
            "SECURITY ALERT: {}",
            alert.summary
        );
    }
}

/// mpsc 채널로 알림을 전달하는 sink
///
/// 채널이 가득 찼거나 닫혔으면 알림을 버리고 경고를 남깁니다.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<AlertEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<AlertEvent>) -> Self {
        Self { tx }
    }

    /// 지정한 용량의 채널과 함께 sink를 생성합니다.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AlertEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn raise(&self, alert: AlertEvent) {
        if let Err(e) = self.tx.try_send(alert) {
            let (reason, alert) = match e {
                mpsc::error::TrySendError::Full(a) => ("channel full", a),
                mpsc::error::TrySendError::Closed(a) => ("channel closed", a),
            };
            warn!(
                alert_id = %alert.id,
                image = %alert.image,
                reason,
                "alert dropped"
            );
        }
    }
}
