//! 컨테이너 이미지 조회
//!
//! 이벤트 본문에 컨테이너 명세가 없을 때 [`EventHandler`](crate::EventHandler)는
//! [`ContainerLookup`]으로 배포된 리소스의 현재 이미지 목록을 가져옵니다.
//! 관리 API 클라이언트 같은 구현체는 이 trait만 구현하면 됩니다.

use std::collections::HashMap;
use std::future::Future;

use crate::error::IntakeError;
use crate::event::{ContainerKind, DeploymentEvent, ImageSpec};

/// 조회 대상 리소스
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerTarget {
    pub kind: ContainerKind,
    pub subscription_id: Option<String>,
    pub resource_group: String,
    pub resource_name: String,
}

impl ContainerTarget {
    /// 이벤트 주제에서 조회 대상을 만듭니다.
    pub fn from_event(event: &DeploymentEvent, kind: ContainerKind) -> Self {
        Self {
            kind,
            subscription_id: event.subscription_id().map(str::to_owned),
            resource_group: event.resource_group().to_owned(),
            resource_name: event.resource_name().to_owned(),
        }
    }
}

impl std::fmt::Display for ContainerTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}/{}",
            self.kind, self.resource_group, self.resource_name
        )
    }
}

/// 배포된 리소스의 이미지 목록 조회 인터페이스
pub trait ContainerLookup: Send + Sync + 'static {
    /// 리소스의 컨테이너 이미지를 조회합니다. 이미지가 없으면 빈 목록입니다.
    fn images(
        &self,
        target: &ContainerTarget,
    ) -> impl Future<Output = Result<Vec<ImageSpec>, IntakeError>> + Send;
}

/// 조회하지 않는 기본 구현
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl ContainerLookup for NoLookup {
    async fn images(&self, _target: &ContainerTarget) -> Result<Vec<ImageSpec>, IntakeError> {
        Ok(Vec::new())
    }
}

/// 리소스 이름별 고정 이미지 목록 (테스트, 정적 배포 목록)
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    images: HashMap<String, Vec<String>>,
}

impl StaticLookup {
    pub fn with_resource(
        mut self,
        resource_name: impl Into<String>,
        images: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.images.insert(
            resource_name.into(),
            images.into_iter().map(Into::into).collect(),
        );
        self
    }
}

impl ContainerLookup for StaticLookup {
    async fn images(&self, target: &ContainerTarget) -> Result<Vec<ImageSpec>, IntakeError> {
        Ok(self
            .images
            .get(&target.resource_name)
            .map(|images| images.iter().map(|i| ImageSpec::from_image(i.as_str())).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event() -> DeploymentEvent {
        DeploymentEvent::from_value(json!({
            "id": "evt-1",
            "eventType": "Microsoft.Resources.ResourceWriteSuccess",
            "subject": "/subscriptions/sub-1/resourceGroups/rg-prod/providers/Microsoft.ContainerInstance/containerGroups/web-api",
        }))
        .unwrap()
    }

    #[test]
    fn target_from_event_subject() {
        let target = ContainerTarget::from_event(&event(), ContainerKind::ContainerGroup);
        assert_eq!(target.resource_name, "web-api");
        assert_eq!(target.resource_group, "rg-prod");
        assert_eq!(target.subscription_id.as_deref(), Some("sub-1"));
        assert_eq!(target.to_string(), "container-group rg-prod/web-api");
    }

    #[tokio::test]
    async fn static_lookup_by_resource_name() {
        let lookup = StaticLookup::default().with_resource("web-api", ["nginx:1.25", "redis"]);
        let target = ContainerTarget::from_event(&event(), ContainerKind::ContainerGroup);
        let images = lookup.images(&target).await.unwrap();
        let raws: Vec<&str> = images.iter().map(|i| i.raw.as_str()).collect();
        assert_eq!(raws, vec!["nginx:1.25", "redis"]);

        let other = ContainerTarget {
            resource_name: "worker".to_owned(),
            ..target
        };
        assert!(lookup.images(&other).await.unwrap().is_empty());
        assert!(NoLookup.images(&other).await.unwrap().is_empty());
    }
}
