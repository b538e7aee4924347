//! 실행 단위 명세
//!
//! 스캐너 도구 호출을 타입이 있는 [`UnitSpec`]으로 구성하고, 플랫폼 경계에서만
//! 플랫폼 고유 형식으로 변환합니다. 자격 증명 값은 `UnitSpec`의 어떤 로그 출력에도 나타나지 않습니다.

use std::collections::BTreeMap;
use std::time::SystemTime;

use deployscan_core::clock::unix_millis;
use deployscan_core::image::ImageReference;

use crate::config::{IMAGE_PLACEHOLDER, ScanJobConfig};
use crate::credentials::Credentials;

/// 실행 단위 레이블 키
pub const LABEL_IMAGE: &str = "deployscan.image";
pub const LABEL_CONTAINER_TYPE: &str = "deployscan.container-type";
pub const LABEL_EVENT_ID: &str = "deployscan.event-id";
pub const LABEL_TIMESTAMP: &str = "deployscan.timestamp";
pub const LABEL_SUBSCRIPTION: &str = "deployscan.subscription";
pub const LABEL_RESOURCE_GROUP: &str = "deployscan.resource-group";
pub const LABEL_MANAGED_BY: &str = "deployscan.managed-by";

/// `managed-by` 레이블 값
pub const MANAGED_BY: &str = "deployscan";

/// 잡을 유발한 이벤트 정보
///
/// 실행 단위 레이블로 기록되어 하위 시스템에서 상관관계 분석에 사용됩니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    /// 트리거 이벤트 ID
    pub event_id: String,
    /// 배포 리소스 종류 (`container-group`, `container-app`)
    pub container_type: String,
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub triggered_at: SystemTime,
}

impl JobContext {
    pub fn new(event_id: impl Into<String>, container_type: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            container_type: container_type.into(),
            subscription_id: None,
            resource_group: None,
            triggered_at: SystemTime::now(),
        }
    }
}

/// 실행 단위 하나의 생성 명세
#[derive(Debug, Clone)]
pub struct UnitSpec {
    /// 실행 단위 이름 (잡 ID)
    pub name: String,
    /// 스캐너 도구 이미지
    pub image: String,
    /// 스캐너 인자
    pub args: Vec<String>,
    /// 주입할 자격 증명
    pub env: Credentials,
    pub labels: BTreeMap<String, String>,
    pub memory_mib: u64,
    pub cpus: f64,
}

impl UnitSpec {
    /// 설정과 대상 이미지로 명세를 구성합니다.
    ///
    /// 인자 템플릿의 `{image}`는 대상의 정규 식별자로 치환됩니다.
    pub fn build(
        config: &ScanJobConfig,
        name: impl Into<String>,
        target: &ImageReference,
        credentials: &Credentials,
        context: &JobContext,
    ) -> Self {
        let canonical = target.canonical();
        let args = config
            .args
            .iter()
            .map(|a| a.replace(IMAGE_PLACEHOLDER, &canonical))
            .collect();

        let mut labels = BTreeMap::new();
        labels.insert(LABEL_IMAGE.to_owned(), canonical);
        labels.insert(
            LABEL_CONTAINER_TYPE.to_owned(),
            context.container_type.clone(),
        );
        labels.insert(LABEL_EVENT_ID.to_owned(), context.event_id.clone());
        labels.insert(
            LABEL_TIMESTAMP.to_owned(),
            unix_millis(context.triggered_at).to_string(),
        );
        if let Some(sub) = &context.subscription_id {
            labels.insert(LABEL_SUBSCRIPTION.to_owned(), sub.clone());
        }
        if let Some(rg) = &context.resource_group {
            labels.insert(LABEL_RESOURCE_GROUP.to_owned(), rg.clone());
        }
        labels.insert(LABEL_MANAGED_BY.to_owned(), MANAGED_BY.to_owned());

        Self {
            name: name.into(),
            image: config.scanner_image.clone(),
            args,
            env: credentials.clone(),
            labels,
            memory_mib: config.memory_mib,
            cpus: config.cpus,
        }
    }

    /// 로그에 남겨도 안전한 요약 (환경 변수는 이름만 포함)
    pub fn describe(&self) -> String {
        format!(
            "{} image={} args=[{}] env=[{}] memory={}MiB cpus={}",
            self.name,
            self.image,
            self.args.join(" "),
            self.env.names().join(","),
            self.memory_mib,
            self.cpus
        )
    }

    /// `KEY=value` 형식의 환경 변수 목록 (플랫폼 경계 전용)
    pub fn env_pairs(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(k, v)| format!("{k}={}", v.expose()))
            .collect()
    }
}
