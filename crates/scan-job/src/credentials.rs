//! 자격 증명 처리
//!
//! 비밀 저장소에서 읽은 값은 [`SecretValue`]로 감싸서 보관합니다.
//! `Debug`와 `Display` 출력은 항상 `***`이며, 값은 실행 단위 생성 시에만 꺼냅니다.
//! 자격 증명은 잡을 실행하는 호출의 메모리에만 존재하며 캐시나 결과 저장소에 기록되지 않습니다.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use deployscan_core::config::CredentialMapping;

use crate::error::ScanJobError;

const REDACTED: &str = "***";

/// 로그에 노출되지 않는 비밀 값
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// 원본 값을 반환합니다. 실행 단위 환경 변수 주입에만 사용합니다.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// 읽기 전용 비밀 저장소
pub trait SecretStore: Send + Sync + 'static {
    /// 비밀의 현재 값을 조회합니다.
    fn get(&self, name: &str) -> impl Future<Output = Result<SecretValue, ScanJobError>> + Send;
}

/// 환경 변수 기반 비밀 저장소
///
/// 비밀 이름은 대문자로 바꾸고 `-`를 `_`로 치환해 환경 변수 이름으로 사용합니다.
/// (`qualys-access-token` → `{prefix}QUALYS_ACCESS_TOKEN`)
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn variable_name(&self, secret: &str) -> String {
        format!("{}{}", self.prefix, secret.to_uppercase().replace('-', "_"))
    }
}

impl SecretStore for EnvSecretStore {
    async fn get(&self, name: &str) -> Result<SecretValue, ScanJobError> {
        let var = self.variable_name(name);
        match std::env::var(&var) {
            Ok(value) if !value.is_empty() => Ok(SecretValue::new(value)),
            Ok(_) => Err(ScanJobError::Credentials {
                name: name.to_owned(),
                reason: format!("{var} is empty"),
            }),
            Err(_) => Err(ScanJobError::Credentials {
                name: name.to_owned(),
                reason: format!("{var} is not set"),
            }),
        }
    }
}

/// 메모리 기반 비밀 저장소
#[derive(Clone, Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, SecretValue>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), SecretValue::new(value));
        self
    }
}

impl fmt::Debug for StaticSecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticSecretStore")
            .field("names", &self.secrets.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SecretStore for StaticSecretStore {
    async fn get(&self, name: &str) -> Result<SecretValue, ScanJobError> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| ScanJobError::Credentials {
                name: name.to_owned(),
                reason: "not found".to_owned(),
            })
    }
}

/// 실행 단위에 주입할 환경 변수 형태의 자격 증명
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    entries: Vec<(String, SecretValue)>,
}

impl Credentials {
    /// 자격 증명이 없는 빈 집합
    pub fn none() -> Self {
        Self::default()
    }

    /// 매핑 목록에 따라 비밀 저장소에서 값을 읽습니다.
    ///
    /// 하나라도 읽지 못하면 에러를 반환합니다.
    pub async fn resolve<S: SecretStore>(
        store: &S,
        mappings: &[CredentialMapping],
    ) -> Result<Self, ScanJobError> {
        let mut entries = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            let value = store.get(&mapping.secret).await?;
            entries.push((mapping.env.clone(), value));
        }
        Ok(Self { entries })
    }

    pub fn with(mut self, env: impl Into<String>, value: SecretValue) -> Self {
        self.entries.push((env.into(), value));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SecretValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 주입될 환경 변수 이름 (값 제외)
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
