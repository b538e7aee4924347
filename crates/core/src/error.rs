//! 에러 타입 — 도메인별 에러 정의
//!
//! 각 컴포넌트 크레이트는 자체 에러 타입을 정의하고
//! `From<...> for DeployscanError` 변환을 구현하여 `?`로 전파합니다.

/// Deployscan 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum DeployscanError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 이미지 참조 파싱 에러
    #[error("image parse error: {0}")]
    ImageParse(#[from] ImageParseError),

    /// 스캔 잡 실행 에러
    #[error("scan job error: {0}")]
    ScanJob(#[from] ScanJobFailure),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 이벤트 처리 에러
    #[error("intake error: {0}")]
    Intake(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 이미지 참조 파싱 에러
///
/// 잘못된 이미지 참조는 해당 이미지만 건너뛰고 같은 이벤트의
/// 나머지 이미지는 계속 처리합니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageParseError {
    /// 빈 문자열
    #[error("image reference is empty")]
    Empty,

    /// 공백 문자 포함
    #[error("image reference '{0}' contains whitespace")]
    Whitespace(String),

    /// `@`가 두 번 이상 등장
    #[error("image reference '{0}' contains more than one '@'")]
    MultipleDigests(String),

    /// 그 밖의 형식 오류
    #[error("malformed image reference '{input}': {reason}")]
    Malformed { input: String, reason: String },

    /// 컨테이너 스펙 조각에서 이미지 필드를 찾을 수 없음
    #[error("container spec fragment has no image field")]
    MissingImage,
}

/// 스캔 잡 실패 요약 (컴포넌트 크레이트 에러의 상위 표현)
#[derive(Debug, thiserror::Error)]
pub enum ScanJobFailure {
    /// 실행 단위 생성 실패
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    /// 제한 시간 초과
    #[error("scan timed out: {0}")]
    Timeout(String),

    /// 스캐너 출력 파싱 실패
    #[error("scanner output unparseable: {0}")]
    OutputParse(String),

    /// 실행 플랫폼 에러
    #[error("execution platform error: {0}")]
    Platform(String),
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 쓰기 실패
    #[error("write failed: {0}")]
    Write(String),

    /// 질의 실패
    #[error("query failed: {0}")]
    Query(String),
}
