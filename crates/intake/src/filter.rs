//! 이벤트 선별
//!
//! 스캔 파이프라인에 들어가기 전에 이벤트를 걸러냅니다. 검사 순서:
//!
//! 1. 이벤트 타입이 허용 목록에 있는지
//! 2. `operationName`이 있으면 `/write`로 끝나는지
//! 3. 주제가 지원하는 컨테이너 리소스인지, 해당 종류가 활성화되어 있는지
//! 4. 리소스 이름이 스캐너 자신의 실행 단위 접두어로 시작하지 않는지 (자체 트리거 억제)

use std::fmt;

use crate::config::IntakeConfig;
use crate::event::{ContainerKind, DeploymentEvent};

const WRITE_SUFFIX: &str = "/write";

/// 이벤트를 처리하지 않는 사유
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// 이벤트 본문을 해석할 수 없음
    Malformed(String),
    /// 허용되지 않은 이벤트 타입
    EventType(String),
    /// 쓰기 작업이 아님
    Operation(String),
    /// 컨테이너 리소스가 아님
    UnsupportedResource,
    /// 비활성화된 컨테이너 종류
    KindDisabled(ContainerKind),
    /// 스캐너 자신의 실행 단위
    SelfTrigger { resource: String, prefix: String },
    /// 이미지가 없는 이벤트
    NoImages,
}

impl IgnoreReason {
    /// 메트릭 레이블 값
    pub fn label(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::EventType(_) => "event_type",
            Self::Operation(_) => "operation",
            Self::UnsupportedResource => "unsupported_resource",
            Self::KindDisabled(_) => "kind_disabled",
            Self::SelfTrigger { .. } => "self_trigger",
            Self::NoImages => "no_images",
        }
    }
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(reason) => write!(f, "malformed event: {reason}"),
            Self::EventType(t) => write!(f, "event type '{t}' not accepted"),
            Self::Operation(op) => write!(f, "operation '{op}' is not a write"),
            Self::UnsupportedResource => write!(f, "subject is not a container resource"),
            Self::KindDisabled(kind) => write!(f, "{kind} events are disabled"),
            Self::SelfTrigger { resource, prefix } => {
                write!(f, "resource '{resource}' matches scanner prefix '{prefix}'")
            }
            Self::NoImages => write!(f, "no container images in event"),
        }
    }
}

/// 이벤트를 선별하고, 처리 대상이면 컨테이너 종류를 반환합니다.
pub fn screen(event: &DeploymentEvent, config: &IntakeConfig) -> Result<ContainerKind, IgnoreReason> {
    if !config.accepts_event_type(&event.event_type) {
        return Err(IgnoreReason::EventType(event.event_type.clone()));
    }

    if let Some(op) = event.operation_name() {
        if !op.to_lowercase().ends_with(WRITE_SUFFIX) {
            return Err(IgnoreReason::Operation(op.to_owned()));
        }
    }

    let kind = event.kind().ok_or(IgnoreReason::UnsupportedResource)?;
    let enabled = match kind {
        ContainerKind::ContainerGroup => config.container_groups,
        ContainerKind::ContainerApp => config.container_apps,
    };
    if !enabled {
        return Err(IgnoreReason::KindDisabled(kind));
    }

    let resource = event.resource_name();
    if let Some(prefix) = config.ignored_prefix(resource) {
        return Err(IgnoreReason::SelfTrigger {
            resource: resource.to_owned(),
            prefix: prefix.to_owned(),
        });
    }

    Ok(kind)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::IntakeConfigBuilder;

    fn event(event_type: &str, name: &str, operation: Option<&str>) -> DeploymentEvent {
        let mut data = json!({});
        if let Some(op) = operation {
            data["operationName"] = json!(op);
        }
        DeploymentEvent::from_value(json!({
            "id": "evt-1",
            "eventType": event_type,
            "subject": format!(
                "/subscriptions/s/resourceGroups/rg/providers/Microsoft.ContainerInstance/containerGroups/{name}"
            ),
            "data": data,
        }))
        .unwrap()
    }

    const WRITE: &str = "Microsoft.Resources.ResourceWriteSuccess";

    #[test]
    fn accepts_container_write() {
        let config = IntakeConfig::default();
        let ev = event(WRITE, "web", Some("Microsoft.ContainerInstance/containerGroups/write"));
        assert_eq!(screen(&ev, &config), Ok(ContainerKind::ContainerGroup));
        let ev = event(WRITE, "web", None);
        assert_eq!(screen(&ev, &config), Ok(ContainerKind::ContainerGroup));
    }

    #[test]
    fn rejects_other_event_types() {
        let config = IntakeConfig::default();
        let ev = event("Microsoft.Resources.ResourceDeleteSuccess", "web", None);
        assert!(matches!(screen(&ev, &config), Err(IgnoreReason::EventType(_))));
    }

    #[test]
    fn rejects_non_write_operations() {
        let config = IntakeConfig::default();
        let ev = event(WRITE, "web", Some("Microsoft.ContainerInstance/containerGroups/restart/action"));
        let reason = screen(&ev, &config).unwrap_err();
        assert_eq!(reason.label(), "operation");
    }

    #[test]
    fn suppresses_self_triggered_events() {
        let config = IntakeConfig::default();
        let ev = event(WRITE, "dscan-nginx-1700000000000-abc123", None);
        let reason = screen(&ev, &config).unwrap_err();
        assert!(matches!(reason, IgnoreReason::SelfTrigger { ref prefix, .. } if prefix == "dscan-"));
        assert!(reason.to_string().contains("dscan-nginx"));
    }

    #[test]
    fn respects_disabled_kinds() {
        let config = IntakeConfigBuilder::new()
            .container_groups(false)
            .build()
            .unwrap();
        let ev = event(WRITE, "web", None);
        assert_eq!(
            screen(&ev, &config),
            Err(IgnoreReason::KindDisabled(ContainerKind::ContainerGroup))
        );
    }

    #[test]
    fn rejects_unsupported_resources() {
        let config = IntakeConfig::default();
        let ev = DeploymentEvent::from_value(json!({
            "id": "e",
            "eventType": WRITE,
            "subject": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Web/sites/app",
        }))
        .unwrap();
        assert_eq!(screen(&ev, &config), Err(IgnoreReason::UnsupportedResource));
    }
}
