//! 결과 저장소 — 스캔 결과 원문과 조회 가능한 요약 행
//!
//! - 원문: `results/{partition}/{scan_id}.json` 객체 (스캔 시도당 하나, 덮어쓰지 않음)
//! - 요약: `scans` 테이블, 파티션 = 이미지, 정렬 키 = `{scanned_at_millis:013}-{scan_id}`
//! - 에러: `errors/{partition}/...` 객체 + `scan_errors` 테이블
//!
//! 에러 기록을 따로 두어 "깨끗하게 스캔됨"과 "스캔 인프라 실패"를 구분할 수 있습니다.

use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use deployscan_core::clock::{Clock, from_unix_millis, unix_millis};
use deployscan_core::metrics as m;
use deployscan_core::types::{
    ComplianceCounts, ScanResult, ScanStatus, Severity, VulnerabilityCounts,
};

use crate::backend::{BlobStore, Row, RowFilter, RowStore, SortRange};
use crate::error::StoreError;
use crate::partition::partition_key;

/// 요약 행 테이블
pub const SCANS_TABLE: &str = "scans";
/// 에러 행 테이블
pub const ERRORS_TABLE: &str = "scan_errors";

/// 스캔 요약 행
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub scan_id: String,
    pub canonical_id: String,
    pub event_id: String,
    pub status: ScanStatus,
    pub exit_code: Option<i64>,
    pub vulnerability_counts: VulnerabilityCounts,
    pub compliance_counts: ComplianceCounts,
    pub highest_severity: Option<Severity>,
    pub tool_scan_id: Option<String>,
    /// 원문 객체 위치
    pub blob_path: String,
    pub scanned_at_millis: u64,
}

impl ScanSummary {
    pub fn scanned_at(&self) -> SystemTime {
        from_unix_millis(self.scanned_at_millis)
    }
}

/// 스캔 인프라 에러 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanErrorKind {
    /// 이미지 참조 파싱 실패
    ImageParse,
    /// 실행 단위 생성 실패
    Provisioning,
    /// 제한 시간 초과
    Timeout,
    /// 스캐너 출력 파싱 불가
    Unparseable,
    /// 실행 플랫폼 호출 실패
    Platform,
}

impl std::fmt::Display for ScanErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ImageParse => "image_parse",
            Self::Provisioning => "provisioning",
            Self::Timeout => "timeout",
            Self::Unparseable => "unparseable",
            Self::Platform => "platform",
        };
        f.write_str(s)
    }
}

/// 스캔 에러 기록
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanErrorRecord {
    /// 이벤트에 있던 원시 이미지 문자열
    pub raw_image: String,
    /// 정규 식별자 (파싱에 성공한 경우)
    pub canonical_id: Option<String>,
    pub scan_id: Option<String>,
    pub event_id: String,
    pub kind: ScanErrorKind,
    pub message: String,
    /// 스캐너 로그 원문 (파싱 불가 출력 감사용)
    pub raw_output: Option<String>,
}

/// 저장된 에러 행
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredScanError {
    #[serde(flatten)]
    pub record: ScanErrorRecord,
    pub blob_path: String,
    pub occurred_at_millis: u64,
}

/// 요약 행 조회 조건
#[derive(Debug, Clone, Default)]
pub struct ScanQuery {
    /// 정규 이미지 식별자
    pub canonical_id: String,
    /// 포함 하한
    pub since: Option<SystemTime>,
    /// 제외 상한
    pub until: Option<SystemTime>,
    /// 이 심각도 이상 취약점이 있는 행만
    pub min_severity: Option<Severity>,
}

impl ScanQuery {
    pub fn for_image(canonical_id: impl Into<String>) -> Self {
        Self {
            canonical_id: canonical_id.into(),
            ..Self::default()
        }
    }

    pub fn since(mut self, since: SystemTime) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: SystemTime) -> Self {
        self.until = Some(until);
        self
    }

    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    fn row_filter(&self) -> RowFilter {
        let filter = RowFilter::range(self.sort_range());
        match self.min_severity {
            Some(severity) => filter.min_rank(severity.level()),
            None => filter,
        }
    }

    fn sort_range(&self) -> SortRange {
        SortRange {
            start: self.since.map(|t| time_prefix(unix_millis(t))),
            end: self.until.map(|t| time_prefix(unix_millis(t))),
        }
    }
}

fn time_prefix(millis: u64) -> String {
    format!("{millis:013}")
}

fn sort_key(millis: u64, id: &str) -> String {
    format!("{}-{id}", time_prefix(millis))
}

/// 결과 저장소
pub struct ResultStore<S: BlobStore + RowStore> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: BlobStore + RowStore> Clone for ResultStore<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: BlobStore + RowStore> ResultStore<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// 결과 원문 객체 위치
    pub fn result_location(canonical_id: &str, scan_id: &str) -> String {
        format!("results/{}/{scan_id}.json", partition_key(canonical_id))
    }

    /// 스캔 결과를 저장하고 원문 위치를 반환합니다.
    ///
    /// 같은 `scan_id`로 두 번 저장하면 `StoreError::Conflict`입니다.
    pub async fn save(&self, result: &ScanResult) -> Result<String, StoreError> {
        let canonical_id = result.source_image.canonical();
        let partition = partition_key(&canonical_id);
        let location = Self::result_location(&canonical_id, &result.scan_id);

        let body = serde_json::to_vec_pretty(result)?;
        if let Err(e) = self.storage.put_new(&location, body).await {
            metrics::counter!(m::STORE_WRITES_TOTAL, m::LABEL_RESULT => "failure").increment(1);
            return Err(e);
        }

        let scanned_at_millis = unix_millis(result.scanned_at);
        let summary = ScanSummary {
            scan_id: result.scan_id.clone(),
            canonical_id: canonical_id.clone(),
            event_id: result.event_id.clone(),
            status: result.status,
            exit_code: result.exit_code,
            vulnerability_counts: result.vulnerability_counts,
            compliance_counts: result.compliance_counts,
            highest_severity: result.vulnerability_counts.highest(),
            tool_scan_id: result.tool_scan_id.clone(),
            blob_path: location.clone(),
            scanned_at_millis,
        };
        let row = Row {
            partition_key: partition,
            sort_key: sort_key(scanned_at_millis, &result.scan_id),
            rank: summary.highest_severity.map_or(0, |s| s.level()),
            data: serde_json::to_value(&summary)?,
        };
        if let Err(e) = self.storage.upsert_row(SCANS_TABLE, row).await {
            metrics::counter!(m::STORE_WRITES_TOTAL, m::LABEL_RESULT => "failure").increment(1);
            return Err(e);
        }

        metrics::counter!(m::STORE_WRITES_TOTAL, m::LABEL_RESULT => "success").increment(1);
        info!(
            image = %canonical_id,
            scan_id = %result.scan_id,
            location = %location,
            "scan result stored"
        );
        Ok(location)
    }

    /// 스캔 인프라 에러를 저장하고 위치를 반환합니다.
    pub async fn save_error(&self, record: &ScanErrorRecord) -> Result<String, StoreError> {
        let partition_source = record
            .canonical_id
            .as_deref()
            .unwrap_or(record.raw_image.as_str());
        let partition = partition_key(partition_source);
        let occurred_at_millis = unix_millis(self.clock.now());
        let id = record
            .scan_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let key = sort_key(occurred_at_millis, &id);
        let location = format!("errors/{partition}/{key}.json");

        let stored = StoredScanError {
            record: record.clone(),
            blob_path: location.clone(),
            occurred_at_millis,
        };
        self.storage
            .put_new(&location, serde_json::to_vec_pretty(&stored)?)
            .await?;
        self.storage
            .upsert_row(
                ERRORS_TABLE,
                Row {
                    partition_key: partition,
                    sort_key: key,
                    rank: 0,
                    data: serde_json::to_value(&stored)?,
                },
            )
            .await?;

        metrics::counter!(m::STORE_ERRORS_RECORDED_TOTAL).increment(1);
        debug!(
            image = partition_source,
            kind = %record.kind,
            location = %location,
            "scan error recorded"
        );
        Ok(location)
    }

    /// 요약 행을 조회합니다. 결과는 스캔 시각 오름차순입니다.
    ///
    /// 시간 범위와 최소 심각도는 백엔드 질의 조건으로 전달됩니다.
    /// 행의 순위는 최고 심각도 단계이므로 `rank >= min.level()`은
    /// `min` 이상 취약점이 하나 이상 있다는 뜻입니다.
    pub async fn query(&self, query: &ScanQuery) -> Result<Vec<ScanSummary>, StoreError> {
        let rows = self
            .storage
            .query_rows(
                SCANS_TABLE,
                &partition_key(&query.canonical_id),
                &query.row_filter(),
            )
            .await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row.data).map_err(StoreError::from))
            .collect()
    }

    /// 이미지(정규 식별자 또는 파싱 실패한 원시 문자열)의 에러 기록을 조회합니다.
    pub async fn errors_for(&self, image: &str) -> Result<Vec<StoredScanError>, StoreError> {
        let rows = self
            .storage
            .query_rows(ERRORS_TABLE, &partition_key(image), &RowFilter::all())
            .await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row.data).map_err(StoreError::from))
            .collect()
    }

    /// 저장된 결과 원문을 읽습니다.
    pub async fn load(&self, location: &str) -> Result<Option<ScanResult>, StoreError> {
        match self.storage.get_blob(location).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}
