//! 배포 이벤트 모델
//!
//! 클라우드 이벤트 전달 플랫폼이 보내는 리소스 쓰기 알림을 [`DeploymentEvent`]로 표현합니다.
//!
//! ```text
//! {
//!   "id": "...",
//!   "eventType": "Microsoft.Resources.ResourceWriteSuccess",
//!   "subject": "/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.App/containerApps/{name}",
//!   "data": { "subscriptionId": "...", "operationName": ".../write", "properties": { ... } }
//! }
//! ```
//!
//! 컨테이너 명세는 `data` 또는 감싼 형태의 `data.data` 아래에서 찾습니다.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::error::IntakeError;

/// 컨테이너 그룹 리소스 공급자 경로
pub const CONTAINER_GROUPS_PROVIDER: &str = "Microsoft.ContainerInstance/containerGroups";
/// 컨테이너 앱 리소스 공급자 경로
pub const CONTAINER_APPS_PROVIDER: &str = "Microsoft.App/containerApps";

const UNKNOWN: &str = "unknown";

/// 배포 리소스 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// 컨테이너 그룹 (`properties.containers[].properties.image`)
    ContainerGroup,
    /// 컨테이너 앱 (`properties.template.containers[].image`)
    ContainerApp,
}

impl ContainerKind {
    /// 실행 단위 레이블에 쓰는 이름
    pub fn label(&self) -> &'static str {
        match self {
            Self::ContainerGroup => "container-group",
            Self::ContainerApp => "container-app",
        }
    }

    /// 컨테이너 목록 경로 (`properties` 기준)
    fn containers_path(&self) -> &'static [&'static str] {
        match self {
            Self::ContainerGroup => &["properties", "containers"],
            Self::ContainerApp => &["properties", "template", "containers"],
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 이벤트에서 추출한 이미지 명세
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSpec {
    /// 원시 이미지 문자열 (에러 기록용)
    pub raw: String,
    /// 컨테이너 명세 조각
    pub fragment: Value,
}

impl ImageSpec {
    /// 이미지 문자열만으로 명세를 만듭니다.
    pub fn from_image(image: impl Into<String>) -> Self {
        let raw = image.into();
        Self {
            fragment: Value::String(raw.clone()),
            raw,
        }
    }
}

/// 배포 이벤트
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentEvent {
    pub id: String,
    #[serde(alias = "type")]
    pub event_type: String,
    pub subject: String,
    #[serde(default)]
    pub event_time: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl DeploymentEvent {
    /// JSON 문자열에서 이벤트 하나를 파싱합니다.
    ///
    /// 배열로 감싼 단일 이벤트(`[{...}]`)도 허용합니다.
    /// 요소가 여럿인 배열은 [`DeploymentEvent::parse_batch`]로 처리해야 합니다.
    pub fn parse(raw: &str) -> Result<Self, IntakeError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| IntakeError::MalformedEvent(format!("invalid json: {e}")))?;
        Self::from_value(value)
    }

    /// JSON 본문의 모든 이벤트를 파싱합니다.
    ///
    /// 배열이면 요소마다 결과를 하나씩 돌려주고, 객체면 결과 하나를 돌려줍니다.
    /// 본문 자체가 JSON이 아니거나 빈 배열이면 에러 하나를 돌려줍니다.
    pub fn parse_batch(raw: &str) -> Vec<Result<Self, IntakeError>> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => return vec![Err(IntakeError::MalformedEvent(format!("invalid json: {e}")))],
        };
        match value {
            Value::Array(items) if items.is_empty() => {
                vec![Err(IntakeError::MalformedEvent("empty event batch".to_owned()))]
            }
            Value::Array(items) => items.into_iter().map(Self::from_value).collect(),
            other => vec![Self::from_value(other)],
        }
    }

    pub fn from_value(value: Value) -> Result<Self, IntakeError> {
        let value = match value {
            Value::Array(mut items) if items.len() == 1 => items.remove(0),
            Value::Array(items) => {
                return Err(IntakeError::MalformedEvent(format!(
                    "batch of {} events where one was expected",
                    items.len()
                )));
            }
            other => other,
        };
        let event: Self = serde_json::from_value(value)
            .map_err(|e| IntakeError::MalformedEvent(e.to_string()))?;
        if event.id.trim().is_empty() {
            return Err(IntakeError::MalformedEvent("empty event id".to_owned()));
        }
        Ok(event)
    }

    /// 주제에서 리소스 종류를 판별합니다.
    pub fn kind(&self) -> Option<ContainerKind> {
        let subject = self.subject.to_lowercase();
        if subject.contains(&CONTAINER_GROUPS_PROVIDER.to_lowercase()) {
            Some(ContainerKind::ContainerGroup)
        } else if subject.contains(&CONTAINER_APPS_PROVIDER.to_lowercase()) {
            Some(ContainerKind::ContainerApp)
        } else {
            None
        }
    }

    fn subject_segments(&self) -> impl Iterator<Item = &str> {
        self.subject.split('/').filter(|s| !s.is_empty())
    }

    /// 주제의 마지막 세그먼트 (배포된 리소스 이름)
    pub fn resource_name(&self) -> &str {
        self.subject_segments().last().unwrap_or(UNKNOWN)
    }

    /// `resourceGroups` 다음 세그먼트. 없으면 `unknown`입니다.
    pub fn resource_group(&self) -> &str {
        self.segment_after("resourceGroups").unwrap_or(UNKNOWN)
    }

    /// `data.subscriptionId`, 없으면 주제의 `subscriptions` 다음 세그먼트
    pub fn subscription_id(&self) -> Option<&str> {
        self.data_str("subscriptionId")
            .or_else(|| self.segment_after("subscriptions"))
    }

    /// `data.operationName`
    pub fn operation_name(&self) -> Option<&str> {
        self.data_str("operationName")
    }

    fn segment_after(&self, marker: &str) -> Option<&str> {
        let mut segments = self.subject_segments();
        segments.find(|s| s.eq_ignore_ascii_case(marker))?;
        segments.next()
    }

    fn data_str(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .or_else(|| self.data.get("data").and_then(|d| d.get(key)))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// 컨테이너 명세에서 이미지를 추출합니다.
    ///
    /// `image` 필드가 있는 컨테이너만 포함하며, 값이 비어 있거나 잘못되어도 그대로 반환합니다.
    /// `data`에서 찾지 못하면 `data.data`를 확인합니다.
    pub fn images(&self, kind: ContainerKind) -> Vec<ImageSpec> {
        let roots = [Some(&self.data), self.data.get("data")];
        for root in roots.into_iter().flatten() {
            let containers = kind
                .containers_path()
                .iter()
                .try_fold(root, |v, key| v.get(*key))
                .and_then(Value::as_array);
            let Some(containers) = containers else {
                continue;
            };
            return containers
                .iter()
                .filter_map(|container| image_spec(kind, container))
                .collect();
        }
        Vec::new()
    }
}

fn image_spec(kind: ContainerKind, container: &Value) -> Option<ImageSpec> {
    let image = match kind {
        ContainerKind::ContainerGroup => container.get("properties")?.get("image")?,
        ContainerKind::ContainerApp => container.get("image")?,
    };
    let raw = match image {
        Value::String(s) => s.clone(),
        Value::Null => return None,
        other => other.to_string(),
    };
    Some(ImageSpec {
        raw,
        fragment: container.clone(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const ACI_SUBJECT: &str = "/subscriptions/sub-1/resourceGroups/rg-prod/providers/Microsoft.ContainerInstance/containerGroups/web-api";
    const ACA_SUBJECT: &str =
        "/subscriptions/sub-1/resourcegroups/rg-apps/providers/Microsoft.App/containerApps/frontend";

    fn event(subject: &str, data: Value) -> DeploymentEvent {
        DeploymentEvent::from_value(json!({
            "id": "evt-1",
            "eventType": "Microsoft.Resources.ResourceWriteSuccess",
            "subject": subject,
            "data": data,
        }))
        .unwrap()
    }

    #[test]
    fn detects_kind_and_context() {
        let ev = event(ACI_SUBJECT, json!({}));
        assert_eq!(ev.kind(), Some(ContainerKind::ContainerGroup));
        assert_eq!(ev.resource_name(), "web-api");
        assert_eq!(ev.resource_group(), "rg-prod");
        assert_eq!(ev.subscription_id(), Some("sub-1"));

        let ev = event(ACA_SUBJECT, json!({"subscriptionId": "sub-from-data"}));
        assert_eq!(ev.kind(), Some(ContainerKind::ContainerApp));
        assert_eq!(ev.resource_group(), "rg-apps");
        assert_eq!(ev.subscription_id(), Some("sub-from-data"));
    }

    #[test]
    fn unknown_subject() {
        let ev = event("/subscriptions/s/providers/Microsoft.Storage/storageAccounts/x", json!({}));
        assert_eq!(ev.kind(), None);
        let ev = event("x", json!({}));
        assert_eq!(ev.resource_group(), "unknown");
    }

    #[test]
    fn extracts_container_group_images() {
        let ev = event(
            ACI_SUBJECT,
            json!({
                "properties": {
                    "containers": [
                        { "name": "app", "properties": { "image": "nginx:latest" } },
                        { "name": "sidecar", "properties": { "image": "myacr.azurecr.io/log:v1" } },
                        { "name": "broken", "properties": {} }
                    ]
                }
            }),
        );
        let images = ev.images(ContainerKind::ContainerGroup);
        let raws: Vec<&str> = images.iter().map(|i| i.raw.as_str()).collect();
        assert_eq!(raws, vec!["nginx:latest", "myacr.azurecr.io/log:v1"]);
    }

    #[test]
    fn extracts_wrapped_container_app_images() {
        let ev = event(
            ACA_SUBJECT,
            json!({
                "operationName": "Microsoft.App/containerApps/write",
                "data": {
                    "properties": {
                        "template": { "containers": [ { "name": "web", "image": "ghcr.io/org/web:2" } ] }
                    }
                }
            }),
        );
        assert_eq!(ev.operation_name(), Some("Microsoft.App/containerApps/write"));
        let images = ev.images(ContainerKind::ContainerApp);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].raw, "ghcr.io/org/web:2");
        assert_eq!(images[0].fragment["name"], "web");
    }

    #[test]
    fn parse_accepts_single_element_array() {
        let raw = format!(
            r#"[{{"id":"e","type":"Microsoft.Resources.ResourceWriteSuccess","subject":"{ACA_SUBJECT}"}}]"#
        );
        let ev = DeploymentEvent::parse(&raw).unwrap();
        assert_eq!(ev.event_type, "Microsoft.Resources.ResourceWriteSuccess");
        assert!(ev.data.is_null());
        assert!(ev.images(ContainerKind::ContainerApp).is_empty());
    }

    #[test]
    fn parse_batch_keeps_every_element() {
        let raw = format!(
            r#"[
                {{"id":"e1","eventType":"t","subject":"{ACA_SUBJECT}"}},
                {{"id":"","eventType":"t","subject":"{ACA_SUBJECT}"}},
                {{"id":"e3","eventType":"t","subject":"{ACI_SUBJECT}"}}
            ]"#
        );
        let parsed = DeploymentEvent::parse_batch(&raw);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].as_ref().unwrap().id, "e1");
        assert!(matches!(parsed[1], Err(IntakeError::MalformedEvent(_))));
        assert_eq!(parsed[2].as_ref().unwrap().kind(), Some(ContainerKind::ContainerGroup));

        let err = DeploymentEvent::parse(&raw).unwrap_err();
        assert!(err.to_string().contains("batch of 3 events"));
    }

    #[test]
    fn parse_batch_of_object_and_garbage() {
        let raw = format!(r#"{{"id":"e1","eventType":"t","subject":"{ACA_SUBJECT}"}}"#);
        let parsed = DeploymentEvent::parse_batch(&raw);
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].is_ok());

        assert_eq!(DeploymentEvent::parse_batch("[]").len(), 1);
        assert!(DeploymentEvent::parse_batch("[]")[0].is_err());
        assert!(DeploymentEvent::parse_batch("{oops")[0].is_err());
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(matches!(
            DeploymentEvent::parse("not json"),
            Err(IntakeError::MalformedEvent(_))
        ));
        assert!(matches!(
            DeploymentEvent::parse(r#"{"id":"e"}"#),
            Err(IntakeError::MalformedEvent(_))
        ));
        assert!(matches!(
            DeploymentEvent::parse(r#"{"id":" ","eventType":"t","subject":"s"}"#),
            Err(IntakeError::MalformedEvent(_))
        ));
    }
}
