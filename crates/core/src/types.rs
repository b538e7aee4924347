//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 스캔 잡, 결과 저장소, 캐시, 이벤트 처리 모듈이 공유하는 데이터 구조를 정의합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::image::ImageReference;

/// 심각도 레벨
///
/// 취약점의 심각도를 나타냅니다.
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    /// 정보성
    #[default]
    Info,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적, 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 높은 심각도부터 나열한 전체 목록
    pub const ALL_DESCENDING: [Severity; 5] = [
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Info,
    ];

    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" | "informational" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// 스캐너가 보고한 심각도 문자열을 정규화합니다.
    ///
    /// 숫자 레벨(`"5"` ~ `"1"`)과 `CRIT`, `HIGH`/`URGENT`, `MED`/`MODERATE`,
    /// `LOW`/`MINOR`, `INFO`를 포함하는 문자열을 인식하며, 그 외는 `Medium`입니다.
    pub fn from_tool_text(s: &str) -> Self {
        let upper = s.trim().to_uppercase();
        if let Ok(level) = upper.parse::<i64>() {
            return Self::from_tool_level(level);
        }
        if upper.contains("CRIT") {
            Self::Critical
        } else if upper.contains("HIGH") || upper.contains("URGENT") {
            Self::High
        } else if upper.contains("MED") || upper.contains("MODERATE") {
            Self::Medium
        } else if upper.contains("LOW") || upper.contains("MINOR") {
            Self::Low
        } else if upper.contains("INFO") {
            Self::Info
        } else {
            Self::Medium
        }
    }

    /// 숫자 심각도 레벨 (5 = Critical ... 1 = Info)
    pub fn from_tool_level(level: i64) -> Self {
        match level {
            l if l >= 5 => Self::Critical,
            4 => Self::High,
            3 => Self::Medium,
            2 => Self::Low,
            1 => Self::Info,
            _ => Self::Medium,
        }
    }

    /// 숫자 레벨. [`Severity::from_tool_level`]의 역입니다.
    pub fn level(&self) -> i64 {
        match self {
            Self::Info => 1,
            Self::Low => 2,
            Self::Medium => 3,
            Self::High => 4,
            Self::Critical => 5,
        }
    }

    /// 소문자 이름 (설정 파일, 태그 값에 사용)
    pub fn as_lower_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "Info"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

/// 스캔 시도의 최종 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanStatus {
    /// 종료 코드 0
    Succeeded,
    /// 0이 아닌 종료 코드, 프로비저닝 실패, 파싱 불가 출력
    Failed,
    /// 제한 시간 초과
    TimedOut,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::TimedOut => write!(f, "TimedOut"),
        }
    }
}

/// 심각도별 취약점 개수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulnerabilityCounts {
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub info: u64,
}

impl VulnerabilityCounts {
    /// 해당 심각도의 개수
    pub fn count(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }

    /// 해당 심각도의 개수를 1 증가시킵니다.
    pub fn increment(&mut self, severity: Severity) {
        let slot = match severity {
            Severity::Critical => &mut self.critical,
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
            Severity::Info => &mut self.info,
        };
        *slot = slot.saturating_add(1);
    }

    /// 전체 개수
    pub fn total(&self) -> u64 {
        [self.critical, self.high, self.medium, self.low, self.info]
            .into_iter()
            .fold(0u64, u64::saturating_add)
    }

    /// `threshold` 이상 심각도의 개수 합
    pub fn at_or_above(&self, threshold: Severity) -> u64 {
        Severity::ALL_DESCENDING
            .iter()
            .filter(|s| **s >= threshold)
            .map(|s| self.count(*s))
            .fold(0u64, u64::saturating_add)
    }

    /// 개수가 1 이상인 가장 높은 심각도
    pub fn highest(&self) -> Option<Severity> {
        Severity::ALL_DESCENDING
            .into_iter()
            .find(|s| self.count(*s) > 0)
    }
}

impl fmt::Display for VulnerabilityCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "critical={} high={} medium={} low={}",
            self.critical, self.high, self.medium, self.low
        )
    }
}

/// 컴플라이언스 검사 결과 개수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceCounts {
    pub passed: u64,
    pub failed: u64,
}

/// 개별 취약점 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// 스캐너 내부 ID (QID 등)
    pub id: String,
    /// CVE ID (있을 경우)
    pub cve: Option<String>,
    pub title: String,
    pub severity: Severity,
    pub package: Option<String>,
    pub installed_version: Option<String>,
    pub fixed_version: Option<String>,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} (fixed: {})",
            self.cve.as_deref().unwrap_or(&self.id),
            self.severity,
            self.title,
            self.fixed_version.as_deref().unwrap_or("N/A"),
        )
    }
}

/// 개별 컴플라이언스 검사
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceCheck {
    pub id: String,
    pub title: String,
    pub passed: bool,
}

/// 완료된 스캔 잡 하나의 결과
///
/// 스캔 잡 하나당 한 번 생성되며 변경되지 않습니다.
/// 결과 저장소에 한 번만 기록됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// 스캔 시도 ID (스캔 잡 ID와 동일)
    pub scan_id: String,
    /// 스캐너가 자체적으로 보고한 스캔 ID
    pub tool_scan_id: Option<String>,
    /// 스캔 대상 이미지
    pub source_image: ImageReference,
    /// 스캔을 유발한 이벤트 ID
    pub event_id: String,
    pub status: ScanStatus,
    pub exit_code: Option<i64>,
    pub findings: Vec<Finding>,
    pub vulnerability_counts: VulnerabilityCounts,
    pub compliance_checks: Vec<ComplianceCheck>,
    pub compliance_counts: ComplianceCounts,
    /// 스캐너가 출력한 JSON 원문 (감사용)
    pub raw_payload: String,
    pub scanned_at: SystemTime,
}

impl ScanResult {
    /// 심각도별로 그룹화한 취약점 (높은 심각도 우선)
    pub fn findings_by_severity(&self) -> BTreeMap<std::cmp::Reverse<Severity>, Vec<&Finding>> {
        let mut grouped: BTreeMap<std::cmp::Reverse<Severity>, Vec<&Finding>> = BTreeMap::new();
        for finding in &self.findings {
            grouped
                .entry(std::cmp::Reverse(finding.severity))
                .or_default()
                .push(finding);
        }
        grouped
    }

    /// 통과/실패로 나눈 컴플라이언스 검사
    pub fn compliance_by_outcome(&self) -> (Vec<&ComplianceCheck>, Vec<&ComplianceCheck>) {
        self.compliance_checks.iter().partition(|c| c.passed)
    }

    /// `threshold` 이상 심각도의 취약점이 하나라도 있는지 확인합니다.
    pub fn exceeds(&self, threshold: Severity) -> bool {
        self.vulnerability_counts.at_or_above(threshold) > 0
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] {}",
            self.scan_id, self.source_image, self.status, self.vulnerability_counts
        )
    }
}
