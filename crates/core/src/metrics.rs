//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수로 `metrics::counter!()`, `metrics::histogram!()`을 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `deployscan_`
//! - 모듈명: `intake_`, `scan_job_`, `cache_`, `store_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 심각도 레이블 키 (info, low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 스캔 상태 레이블 키 (succeeded, failed, timed_out)
pub const LABEL_STATUS: &str = "status";

/// 건너뛴 사유 레이블 키
pub const LABEL_REASON: &str = "reason";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Intake 메트릭 ─────────────────────────────────────────────────

/// Intake: 수신한 이벤트 수 (counter)
pub const INTAKE_EVENTS_TOTAL: &str = "deployscan_intake_events_total";

/// Intake: 무시한 이벤트 수 (counter, label: reason)
pub const INTAKE_EVENTS_IGNORED_TOTAL: &str = "deployscan_intake_events_ignored_total";

/// Intake: 파싱 실패한 이미지 참조 수 (counter)
pub const INTAKE_IMAGE_PARSE_ERRORS_TOTAL: &str = "deployscan_intake_image_parse_errors_total";

/// Intake: 전송된 알림 수 (counter, label: severity)
pub const INTAKE_ALERTS_SENT_TOTAL: &str = "deployscan_intake_alerts_sent_total";

// ─── Scan Job 메트릭 ───────────────────────────────────────────────

/// Scan Job: 시작된 잡 수 (counter)
pub const SCAN_JOB_STARTED_TOTAL: &str = "deployscan_scan_job_started_total";

/// Scan Job: 종료된 잡 수 (counter, label: status)
pub const SCAN_JOB_FINISHED_TOTAL: &str = "deployscan_scan_job_finished_total";

/// Scan Job: 실행 단위 삭제 실패 수 (counter)
pub const SCAN_JOB_CLEANUP_FAILURES_TOTAL: &str = "deployscan_scan_job_cleanup_failures_total";

/// Scan Job: 잡 소요 시간 (histogram, 초)
pub const SCAN_JOB_DURATION_SECONDS: &str = "deployscan_scan_job_duration_seconds";

// ─── Cache 메트릭 ──────────────────────────────────────────────────

/// Cache: 캐시 히트로 건너뛴 스캔 수 (counter)
pub const CACHE_HITS_TOTAL: &str = "deployscan_cache_hits_total";

/// Cache: 캐시 미스 수 (counter)
pub const CACHE_MISSES_TOTAL: &str = "deployscan_cache_misses_total";

/// Cache: 조회 실패 수 (counter)
pub const CACHE_LOOKUP_ERRORS_TOTAL: &str = "deployscan_cache_lookup_errors_total";

// ─── Store 메트릭 ──────────────────────────────────────────────────

/// Store: 저장된 결과 수 (counter, label: result)
pub const STORE_WRITES_TOTAL: &str = "deployscan_store_writes_total";

/// Store: 저장된 에러 레코드 수 (counter)
pub const STORE_ERRORS_RECORDED_TOTAL: &str = "deployscan_store_errors_recorded_total";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 스캔 잡 소요 시간 히스토그램 버킷 (초)
///
/// 5s ~ 30min 범위 (이미지 풀 + 스캔 포함)
pub const SCAN_JOB_DURATION_BUCKETS: [f64; 9] =
    [5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0];

/// 모든 메트릭의 설명을 등록합니다.
///
/// 전역 레코더 설치 후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    // Intake
    describe_counter!(
        INTAKE_EVENTS_TOTAL,
        "Total number of deployment events received"
    );
    describe_counter!(
        INTAKE_EVENTS_IGNORED_TOTAL,
        "Deployment events ignored by reason (operation, kind, self_trigger, no_images)"
    );
    describe_counter!(
        INTAKE_IMAGE_PARSE_ERRORS_TOTAL,
        "Image references that failed to normalize"
    );
    describe_counter!(
        INTAKE_ALERTS_SENT_TOTAL,
        "Alerts raised for scans at or above the severity threshold"
    );

    // Scan Job
    describe_counter!(SCAN_JOB_STARTED_TOTAL, "Total number of scan jobs started");
    describe_counter!(
        SCAN_JOB_FINISHED_TOTAL,
        "Scan jobs finished by terminal status"
    );
    describe_counter!(
        SCAN_JOB_CLEANUP_FAILURES_TOTAL,
        "Execution units whose deletion failed"
    );
    describe_histogram!(
        SCAN_JOB_DURATION_SECONDS,
        "Wall time of a scan job from provisioning to cleanup in seconds"
    );

    // Cache
    describe_counter!(CACHE_HITS_TOTAL, "Scans skipped because of a recent scan");
    describe_counter!(CACHE_MISSES_TOTAL, "Cache lookups that required a scan");
    describe_counter!(
        CACHE_LOOKUP_ERRORS_TOTAL,
        "Cache lookups that failed and fell back to scanning"
    );

    // Store
    describe_counter!(STORE_WRITES_TOTAL, "Scan result writes by outcome");
    describe_counter!(
        STORE_ERRORS_RECORDED_TOTAL,
        "Scan infrastructure errors persisted for operators"
    );
}
