#![doc = include_str!("../README.md")]

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod image;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{ConfigError, DeployscanError, ImageParseError, ScanJobFailure, StorageError};

// 설정
pub use config::DeployscanConfig;

// 이벤트
pub use event::{AlertEvent, Event, EventMetadata};

// 이미지 참조
pub use image::ImageReference;

// 시계
pub use clock::{Clock, ManualClock, SystemClock};

// 도메인 타입
pub use types::{
    ComplianceCheck, ComplianceCounts, Finding, ScanResult, ScanStatus, Severity,
    VulnerabilityCounts,
};
