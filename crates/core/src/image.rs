//! 이미지 참조 정규화 — 원시 이미지 문자열을 `(registry, repository, tag|digest)`로 변환
//!
//! [`ImageReference`]는 한 번 파싱되면 변경되지 않으며,
//! [`ImageReference::canonical`]은 캐시/결과 저장소의 키로 사용됩니다.
//!
//! # 정규화 규칙 (우선순위 순)
//! 1. `name@sha256:...` 형식이면 digest를 분리하여 보존하고 태그는 무시합니다.
//! 2. 첫 경로 세그먼트에 `.`, `:`가 있거나 `localhost`이면 레지스트리 호스트로 간주합니다.
//! 3. 레지스트리가 없으면 `docker.io`를 사용하고, 단일 세그먼트 이름에는 `library/`를 붙입니다.
//! 4. 태그와 digest가 모두 없으면 태그는 `latest`입니다.
//!
//! # 사용 예시
//! ```
//! use deployscan_core::image::ImageReference;
//!
//! let image = ImageReference::parse("nginx").unwrap();
//! assert_eq!(image.canonical(), "docker.io/library/nginx:latest");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ImageParseError;

/// 기본 공개 레지스트리 도메인
pub const DEFAULT_REGISTRY: &str = "docker.io";
/// 단일 세그먼트 저장소에 붙는 공식 이미지 네임스페이스
pub const OFFICIAL_NAMESPACE: &str = "library";
/// 기본 태그
pub const DEFAULT_TAG: &str = "latest";

/// `docker.io`와 동일하게 취급하는 레지스트리 별칭
const DEFAULT_REGISTRY_ALIASES: &[&str] = &["index.docker.io", "registry-1.docker.io"];

/// 태그 최대 길이 (OCI distribution 규격)
const MAX_TAG_LEN: usize = 128;

/// 정규화된 컨테이너 이미지 참조
///
/// 필드는 파싱 이후 변경할 수 없습니다. 직렬화 시 정규 문자열 하나로 표현되고,
/// 역직렬화 시 다시 [`ImageReference::parse`]를 거칩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageReference {
    registry: String,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    /// 원시 이미지 문자열을 파싱하여 정규화합니다.
    ///
    /// 앞뒤 공백은 제거하지만, 내부 공백이 있거나 `@`가 여러 번 등장하면 에러입니다.
    pub fn parse(input: &str) -> Result<Self, ImageParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ImageParseError::Empty);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(ImageParseError::Whitespace(trimmed.to_owned()));
        }
        if trimmed.matches('@').count() > 1 {
            return Err(ImageParseError::MultipleDigests(trimmed.to_owned()));
        }

        // 1. digest 분리
        let (name, digest) = match trimmed.split_once('@') {
            Some((name, digest)) => (name, Some(parse_digest(trimmed, digest)?)),
            None => (trimmed, None),
        };
        if name.is_empty() {
            return Err(malformed(trimmed, "missing repository name"));
        }

        // 2. 레지스트리 호스트 분리
        let (registry, remainder) = match name.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => (first.to_ascii_lowercase(), rest),
            _ => (DEFAULT_REGISTRY.to_owned(), name),
        };
        let registry = if DEFAULT_REGISTRY_ALIASES.contains(&registry.as_str()) {
            DEFAULT_REGISTRY.to_owned()
        } else {
            registry
        };

        // 태그는 마지막 경로 세그먼트의 ':' 뒤에만 올 수 있음
        let (path, tag) = split_tag(remainder);
        validate_repository(trimmed, path)?;
        if let Some(tag) = tag {
            validate_tag(trimmed, tag)?;
        }

        // 3. 기본 레지스트리의 단일 세그먼트 이름은 library 네임스페이스
        let repository = if registry == DEFAULT_REGISTRY && !path.contains('/') {
            format!("{OFFICIAL_NAMESPACE}/{path}")
        } else {
            path.to_owned()
        };

        // 4. digest가 있으면 태그는 식별에 쓰지 않으므로 버림
        let tag = match digest {
            Some(_) => None,
            None => Some(tag.unwrap_or(DEFAULT_TAG).to_owned()),
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// 구조화된 컨테이너 스펙 조각에서 이미지 참조를 파싱합니다.
    ///
    /// 문자열 값, `{"image": ...}`, `{"properties": {"image": ...}}` 형식을 지원합니다.
    pub fn from_fragment(fragment: &serde_json::Value) -> Result<Self, ImageParseError> {
        let raw = match fragment {
            serde_json::Value::String(s) => Some(s.as_str()),
            serde_json::Value::Object(map) => map
                .get("image")
                .and_then(|v| v.as_str())
                .or_else(|| {
                    map.get("properties")
                        .and_then(|p| p.get("image"))
                        .and_then(|v| v.as_str())
                }),
            _ => None,
        };
        raw.map_or(Err(ImageParseError::MissingImage), Self::parse)
    }

    /// 레지스트리 호스트
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// 네임스페이스를 포함한 저장소 경로
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// 태그 (digest 참조이면 `None`)
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// 콘텐츠 digest (예: `sha256:...`)
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// 저장소 경로의 마지막 세그먼트 (잡 이름 생성에 사용)
    pub fn short_name(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(&self.repository)
    }

    /// 정규 식별자: `registry/repository:tag` 또는 `registry/repository@digest`
    pub fn canonical(&self) -> String {
        match (&self.digest, &self.tag) {
            (Some(digest), _) => format!("{}/{}@{}", self.registry, self.repository, digest),
            (None, Some(tag)) => format!("{}/{}:{}", self.registry, self.repository, tag),
            (None, None) => format!("{}/{}:{}", self.registry, self.repository, DEFAULT_TAG),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl TryFrom<String> for ImageReference {
    type Error = ImageParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ImageReference> for String {
    fn from(value: ImageReference) -> Self {
        value.canonical()
    }
}

impl std::str::FromStr for ImageReference {
    type Err = ImageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// --- 파싱 헬퍼 ---

fn malformed(input: &str, reason: impl Into<String>) -> ImageParseError {
    ImageParseError::Malformed {
        input: input.to_owned(),
        reason: reason.into(),
    }
}

fn is_registry_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

/// `algorithm:encoded` 형식의 digest를 검증합니다.
///
/// digest 뒤에 덧붙은 `:tag`는 무시합니다.
fn parse_digest(input: &str, raw: &str) -> Result<String, ImageParseError> {
    let mut parts = raw.splitn(3, ':');
    let algorithm = parts.next().unwrap_or_default();
    let encoded = parts.next().unwrap_or_default();

    if algorithm.is_empty()
        || !algorithm
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(malformed(input, "digest algorithm is invalid"));
    }
    if encoded.is_empty()
        || !encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '=' | '_' | '-'))
    {
        return Err(malformed(input, "digest value is invalid"));
    }
    Ok(format!("{algorithm}:{}", encoded.to_ascii_lowercase()))
}

fn split_tag(remainder: &str) -> (&str, Option<&str>) {
    let last_slash = remainder.rfind('/').map_or(0, |i| i + 1);
    match remainder[last_slash..].rfind(':') {
        Some(pos) => {
            let split = last_slash + pos;
            (&remainder[..split], Some(&remainder[split + 1..]))
        }
        None => (remainder, None),
    }
}

fn validate_repository(input: &str, path: &str) -> Result<(), ImageParseError> {
    if path.is_empty() {
        return Err(malformed(input, "missing repository name"));
    }
    for segment in path.split('/') {
        if segment.is_empty() {
            return Err(malformed(input, "empty path segment"));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
        {
            return Err(malformed(
                input,
                format!("invalid characters in path segment '{segment}'"),
            ));
        }
    }
    Ok(())
}

fn validate_tag(input: &str, tag: &str) -> Result<(), ImageParseError> {
    if tag.is_empty() {
        return Err(malformed(input, "tag is empty"));
    }
    if tag.len() > MAX_TAG_LEN {
        return Err(malformed(input, format!("tag exceeds {MAX_TAG_LEN} characters")));
    }
    if tag.starts_with('.') || tag.starts_with('-') {
        return Err(malformed(input, "tag must not start with '.' or '-'"));
    }
    if !tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(malformed(input, "invalid characters in tag"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(input: &str) -> String {
        ImageReference::parse(input).unwrap().canonical()
    }

    #[test]
    fn single_name_gets_registry_namespace_and_tag() {
        assert_eq!(canonical("nginx"), "docker.io/library/nginx:latest");
        assert_eq!(canonical("nginx:latest"), "docker.io/library/nginx:latest");
        assert_eq!(canonical("nginx:1.25"), "docker.io/library/nginx:1.25");
    }

    #[test]
    fn user_repository_on_default_registry() {
        assert_eq!(canonical("bitnami/redis:7"), "docker.io/bitnami/redis:7");
    }

    #[test]
    fn private_registry_is_unchanged() {
        assert_eq!(canonical("myacr.azurecr.io/app:v1"), "myacr.azurecr.io/app:v1");
        assert_eq!(
            canonical("mcr.microsoft.com/dotnet/runtime:6.0"),
            "mcr.microsoft.com/dotnet/runtime:6.0"
        );
    }

    #[test]
    fn registry_with_port_and_localhost() {
        let image = ImageReference::parse("localhost:5000/team/app").unwrap();
        assert_eq!(image.registry(), "localhost:5000");
        assert_eq!(image.repository(), "team/app");
        assert_eq!(image.tag(), Some("latest"));

        let image = ImageReference::parse("localhost/app:dev").unwrap();
        assert_eq!(image.registry(), "localhost");
        assert_eq!(image.canonical(), "localhost/app:dev");
    }

    #[test]
    fn default_registry_aliases_collapse() {
        assert_eq!(
            canonical("index.docker.io/library/nginx"),
            "docker.io/library/nginx:latest"
        );
        assert_eq!(canonical("docker.io/nginx"), "docker.io/library/nginx:latest");
    }

    #[test]
    fn digest_is_retained_and_tag_ignored() {
        let image = ImageReference::parse("nginx:1.25@sha256:abc123").unwrap();
        assert_eq!(image.digest(), Some("sha256:abc123"));
        assert_eq!(image.tag(), None);
        assert_eq!(image.canonical(), "docker.io/library/nginx@sha256:abc123");

        let trailing = ImageReference::parse("image@sha256:abc123:v2").unwrap();
        assert_eq!(trailing.canonical(), "docker.io/library/image@sha256:abc123");
    }

    #[test]
    fn digest_references_are_distinct_from_tags() {
        assert_ne!(canonical("nginx@sha256:abc"), canonical("nginx:latest"));
        assert_ne!(canonical("nginx@sha256:abc"), canonical("nginx@sha256:def"));
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = [
            "nginx",
            "nginx:1.25",
            "bitnami/redis:7",
            "myacr.azurecr.io/app:v1",
            "localhost:5000/team/app",
            "ghcr.io/org/tool@sha256:0123abcd",
            "index.docker.io/nginx",
            "  nginx:alpine  ",
        ];
        for input in inputs {
            let first = ImageReference::parse(input).unwrap();
            let second = ImageReference::parse(&first.canonical()).unwrap();
            assert_eq!(first, second, "not idempotent for '{input}'");
        }
    }

    #[test]
    fn rejects_malformed_inputs() {
        assert_eq!(ImageReference::parse(""), Err(ImageParseError::Empty));
        assert_eq!(ImageReference::parse("   "), Err(ImageParseError::Empty));
        assert!(matches!(
            ImageReference::parse("ngi nx"),
            Err(ImageParseError::Whitespace(_))
        ));
        assert!(matches!(
            ImageReference::parse("\"\":bad@@\""),
            Err(ImageParseError::MultipleDigests(_))
        ));
        assert!(matches!(
            ImageReference::parse("nginx:"),
            Err(ImageParseError::Malformed { .. })
        ));
        assert!(matches!(
            ImageReference::parse("nginx@"),
            Err(ImageParseError::Malformed { .. })
        ));
        assert!(matches!(
            ImageReference::parse("@sha256:abc"),
            Err(ImageParseError::Malformed { .. })
        ));
        assert!(matches!(
            ImageReference::parse("registry.io//app"),
            Err(ImageParseError::Malformed { .. })
        ));
        assert!(matches!(
            ImageReference::parse("Nginx"),
            Err(ImageParseError::Malformed { .. })
        ));
    }

    #[test]
    fn short_name_is_last_segment() {
        let image = ImageReference::parse("mcr.microsoft.com/dotnet/runtime:6.0").unwrap();
        assert_eq!(image.short_name(), "runtime");
    }

    #[test]
    fn from_fragment_accepts_string_and_objects() {
        let from_str = ImageReference::from_fragment(&serde_json::json!("nginx")).unwrap();
        let from_obj =
            ImageReference::from_fragment(&serde_json::json!({"image": "nginx"})).unwrap();
        let from_props = ImageReference::from_fragment(
            &serde_json::json!({"name": "web", "properties": {"image": "nginx:latest"}}),
        )
        .unwrap();
        assert_eq!(from_str, from_obj);
        assert_eq!(from_obj, from_props);

        assert_eq!(
            ImageReference::from_fragment(&serde_json::json!({"name": "web"})),
            Err(ImageParseError::MissingImage)
        );
    }

    #[test]
    fn serializes_as_canonical_string() {
        let image = ImageReference::parse("nginx").unwrap();
        let json = serde_json::to_string(&image).unwrap();
        assert_eq!(json, "\"docker.io/library/nginx:latest\"");
        let back: ImageReference = serde_json::from_str(&json).unwrap();
        assert_eq!(back, image);
        assert!(serde_json::from_str::<ImageReference>("\"a@@b\"").is_err());
    }

    // Property-based tests using proptest
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn registry() -> impl Strategy<Value = Option<String>> {
            prop::option::of(prop_oneof![
                "[a-z][a-z0-9]{0,8}\\.(io|com|net)(:[1-9][0-9]{1,4})?",
                "localhost(:[1-9][0-9]{3})?",
            ])
        }

        fn reference() -> impl Strategy<Value = String> {
            (
                registry(),
                prop::collection::vec("[a-z0-9][a-z0-9_-]{0,10}", 1..4),
                prop::option::of("[A-Za-z0-9_][A-Za-z0-9_.-]{0,20}"),
                prop::option::of("[a-f0-9]{8,64}"),
            )
                .prop_map(|(registry, segments, tag, digest)| {
                    let mut out = registry.map(|r| format!("{r}/")).unwrap_or_default();
                    out.push_str(&segments.join("/"));
                    if let Some(tag) = tag {
                        out.push(':');
                        out.push_str(&tag);
                    }
                    if let Some(digest) = digest {
                        out.push_str("@sha256:");
                        out.push_str(&digest);
                    }
                    out
                })
        }

        proptest! {
            #[test]
            fn normalize_is_idempotent_for_generated_references(input in reference()) {
                let first = ImageReference::parse(&input);
                prop_assert!(first.is_ok(), "rejected '{}': {:?}", input, first);
                let first = first.unwrap();
                let second = ImageReference::parse(&first.canonical()).unwrap();
                prop_assert_eq!(&first, &second);
                prop_assert_eq!(first.canonical(), second.canonical());
            }

            #[test]
            fn digest_always_drops_tag(input in reference()) {
                let image = ImageReference::parse(&input).unwrap();
                prop_assert_eq!(image.digest().is_some(), input.contains('@'));
                prop_assert_eq!(image.tag().is_some(), image.digest().is_none());
            }

            #[test]
            fn parse_arbitrary_text_does_not_panic(input in "\\PC{0,200}") {
                if let Ok(image) = ImageReference::parse(&input) {
                    prop_assert_eq!(ImageReference::parse(&image.canonical()), Ok(image));
                }
            }
        }
    }
}
