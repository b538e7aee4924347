//! 시계 추상화 — 캐시 윈도우 판정을 시뮬레이션된 시간으로 테스트하기 위한 trait

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// 벽시계 시각 제공자
pub trait Clock: Send + Sync + 'static {
    /// 현재 시각
    fn now(&self) -> SystemTime;
}

/// 운영 환경용 시스템 시계
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// 수동으로 조작하는 시계
///
/// 캐시 윈도우 만료처럼 시간 흐름에 의존하는 동작을 테스트할 때 사용합니다.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// 시계를 `by`만큼 앞으로 이동합니다.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }

    /// 시계를 특정 시각으로 설정합니다.
    pub fn set(&self, to: SystemTime) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `SystemTime`을 유닉스 epoch 기준 밀리초로 변환합니다. epoch 이전은 0입니다.
pub fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// 유닉스 epoch 밀리초를 `SystemTime`으로 변환합니다.
pub fn from_unix_millis(millis: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_millis(millis)
}
