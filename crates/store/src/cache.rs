//! 스캔 캐시 — 정규 이미지 식별자별 마지막 스캔 기록
//!
//! [`ScanCache`]는 중복 스캔 억제에 사용됩니다. 최근 `window_hours` 안에
//! 스캔 기록이 있으면 상태(성공/실패/시간 초과)와 관계없이 재스캔하지 않습니다.
//!
//! `should_scan`과 `record`는 원자적인 쌍이 아닙니다. 같은 이미지에 대한 이벤트가
//! 거의 동시에 도착하면 둘 다 스캔할 수 있으며, 기록은 마지막 쓰기가 이깁니다.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use deployscan_core::clock::Clock;
use deployscan_core::metrics as m;
use deployscan_core::types::{ComplianceCounts, ScanResult, ScanStatus, VulnerabilityCounts};

use crate::backend::KeyValueStore;
use crate::error::StoreError;
use crate::partition::partition_key;

const CACHE_KEY_PREFIX: &str = "scan-cache";

/// 캐시 엔트리
///
/// 재스캔 시 덮어쓰며 시스템이 삭제하지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCacheEntry {
    /// 정규 이미지 식별자
    pub canonical_id: String,
    pub last_scan_timestamp: SystemTime,
    pub last_scan_status: ScanStatus,
    /// 결과 저장소 위치 (성공/실패 결과 또는 에러 레코드)
    pub result_location: Option<String>,
    pub vulnerability_counts: VulnerabilityCounts,
    pub compliance_counts: ComplianceCounts,
    pub scan_id: Option<String>,
    /// 스캔을 유발한 이벤트 ID
    pub event_id: String,
}

impl ScanCacheEntry {
    /// 저장된 스캔 결과로부터 엔트리를 생성합니다.
    pub fn from_result(result: &ScanResult, location: impl Into<String>, at: SystemTime) -> Self {
        Self {
            canonical_id: result.source_image.canonical(),
            last_scan_timestamp: at,
            last_scan_status: result.status,
            result_location: Some(location.into()),
            vulnerability_counts: result.vulnerability_counts,
            compliance_counts: result.compliance_counts,
            scan_id: Some(result.scan_id.clone()),
            event_id: result.event_id.clone(),
        }
    }

    /// 결과 없이 끝난 스캔 시도(프로비저닝 실패, 시간 초과, 파싱 불가)의 엔트리를 생성합니다.
    pub fn failure(
        canonical_id: impl Into<String>,
        status: ScanStatus,
        scan_id: Option<String>,
        error_location: Option<String>,
        event_id: impl Into<String>,
        at: SystemTime,
    ) -> Self {
        Self {
            canonical_id: canonical_id.into(),
            last_scan_timestamp: at,
            last_scan_status: status,
            result_location: error_location,
            vulnerability_counts: VulnerabilityCounts::default(),
            compliance_counts: ComplianceCounts::default(),
            scan_id,
            event_id: event_id.into(),
        }
    }
}

/// 스캔 캐시
pub struct ScanCache<K: KeyValueStore> {
    store: Arc<K>,
    clock: Arc<dyn Clock>,
}

impl<K: KeyValueStore> Clone for ScanCache<K> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<K: KeyValueStore> ScanCache<K> {
    pub fn new(store: Arc<K>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// 캐시가 사용하는 현재 시각
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    fn key(canonical_id: &str) -> String {
        format!("{CACHE_KEY_PREFIX}/{}", partition_key(canonical_id))
    }

    /// 엔트리를 조회합니다.
    pub async fn lookup(&self, canonical_id: &str) -> Result<Option<ScanCacheEntry>, StoreError> {
        let Some(bytes) = self.store.get(&Self::key(canonical_id)).await? else {
            return Ok(None);
        };
        let entry: ScanCacheEntry = serde_json::from_slice(&bytes)?;
        Ok(Some(entry))
    }

    /// 스캔이 필요한지 판정합니다.
    ///
    /// `window_hours` 안에 기록이 있으면 `false`입니다. 조회에 실패하면
    /// 경고를 남기고 `true`를 반환합니다.
    pub async fn should_scan(&self, canonical_id: &str, window_hours: u64) -> bool {
        let entry = match self.lookup(canonical_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                metrics::counter!(m::CACHE_MISSES_TOTAL).increment(1);
                return true;
            }
            Err(e) => {
                warn!(image = canonical_id, error = %e, "scan cache lookup failed, scanning anyway");
                metrics::counter!(m::CACHE_LOOKUP_ERRORS_TOTAL).increment(1);
                return true;
            }
        };

        let window = Duration::from_secs(window_hours.saturating_mul(3600));
        // 미래 시각(시계 차이)은 경과 0으로 취급
        let elapsed = self
            .clock
            .now()
            .duration_since(entry.last_scan_timestamp)
            .unwrap_or(Duration::ZERO);

        if elapsed < window {
            debug!(
                image = canonical_id,
                status = %entry.last_scan_status,
                elapsed_secs = elapsed.as_secs(),
                window_hours,
                "recent scan found, skipping"
            );
            metrics::counter!(m::CACHE_HITS_TOTAL).increment(1);
            false
        } else {
            metrics::counter!(m::CACHE_MISSES_TOTAL).increment(1);
            true
        }
    }

    /// 엔트리를 무조건 덮어씁니다.
    pub async fn record(&self, entry: &ScanCacheEntry) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(entry)?;
        self.store.put(&Self::key(&entry.canonical_id), bytes).await?;
        debug!(
            image = %entry.canonical_id,
            status = %entry.last_scan_status,
            "scan cache updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use deployscan_core::clock::ManualClock;

    use super::*;
    use crate::memory::MemoryStorage;

    const NGINX: &str = "docker.io/library/nginx:latest";

    fn cache() -> (ScanCache<MemoryStorage>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = ScanCache::new(Arc::new(MemoryStorage::new()), clock.clone());
        (cache, clock)
    }

    fn entry(status: ScanStatus, at: SystemTime) -> ScanCacheEntry {
        ScanCacheEntry::failure(NGINX, status, Some("dscan-1".to_owned()), None, "evt-1", at)
    }

    #[tokio::test]
    async fn missing_entry_requires_scan() {
        let (cache, _) = cache();
        assert!(cache.lookup(NGINX).await.unwrap().is_none());
        assert!(cache.should_scan(NGINX, 24).await);
    }

    #[tokio::test]
    async fn recent_record_suppresses_until_window_elapses() {
        let (cache, clock) = cache();
        cache
            .record(&entry(ScanStatus::Succeeded, clock.now()))
            .await
            .unwrap();
        assert!(!cache.should_scan(NGINX, 24).await);

        clock.advance(Duration::from_secs(23 * 3600));
        assert!(!cache.should_scan(NGINX, 24).await);

        clock.advance(Duration::from_secs(3600));
        assert!(cache.should_scan(NGINX, 24).await);
    }

    #[tokio::test]
    async fn failed_scans_also_suppress() {
        let (cache, clock) = cache();
        cache
            .record(&entry(ScanStatus::TimedOut, clock.now()))
            .await
            .unwrap();
        assert!(!cache.should_scan(NGINX, 1).await);
    }

    #[tokio::test]
    async fn record_overwrites() {
        let (cache, clock) = cache();
        cache
            .record(&entry(ScanStatus::Failed, clock.now()))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(60));
        cache
            .record(&entry(ScanStatus::Succeeded, clock.now()))
            .await
            .unwrap();
        let stored = cache.lookup(NGINX).await.unwrap().unwrap();
        assert_eq!(stored.last_scan_status, ScanStatus::Succeeded);
        assert_eq!(stored.last_scan_timestamp, clock.now());
    }

    #[tokio::test]
    async fn future_timestamp_counts_as_recent() {
        let (cache, clock) = cache();
        let future = clock.now() + Duration::from_secs(600);
        cache
            .record(&entry(ScanStatus::Succeeded, future))
            .await
            .unwrap();
        assert!(!cache.should_scan(NGINX, 1).await);
    }

    #[tokio::test]
    async fn corrupt_entry_falls_back_to_scanning() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .put(&ScanCache::<MemoryStorage>::key(NGINX), b"not json".to_vec())
            .await
            .unwrap();
        let cache = ScanCache::new(storage, Arc::new(ManualClock::default()));
        assert!(cache.lookup(NGINX).await.is_err());
        assert!(cache.should_scan(NGINX, 24).await);
    }
}
