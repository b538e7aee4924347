//! 이벤트 처리 파이프라인
//!
//! [`EventHandler`]는 배포 이벤트 하나를 받아 다음 순서로 처리합니다.
//!
//! 1. 이벤트 선별 ([`screen`](crate::filter::screen))
//! 2. 이미지 추출 및 파싱 (본문에 컨테이너 명세가 없으면 [`ContainerLookup`]으로 조회)
//! 3. 이미지마다 캐시 확인 후 스캔 잡 실행
//! 4. 결과 또는 에러 레코드 저장, 캐시 갱신
//! 5. 임계값 이상 취약점이면 알림
//!
//! 한 이미지의 실패는 같은 이벤트의 다른 이미지 처리를 막지 않습니다.
//! 저장 실패가 있으면 [`HandleReport::requires_redelivery`]가 `true`이며,
//! 이 경우 캐시는 갱신하지 않으므로 재전달 시 다시 스캔합니다.

use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use deployscan_core::clock::{Clock, SystemClock};
use deployscan_core::config::CredentialMapping;
use deployscan_core::event::AlertEvent;
use deployscan_core::image::ImageReference;
use deployscan_core::metrics as m;
use deployscan_core::types::{ScanResult, ScanStatus};
use deployscan_scan_job::{
    Credentials, ExecutionPlatform, JobContext, ScanJobError, ScanJobOrchestrator, SecretStore,
};
use deployscan_store::{
    BlobStore, KeyValueStore, ResultStore, RowStore, ScanCache, ScanCacheEntry, ScanErrorKind,
    ScanErrorRecord,
};

use crate::alert::{NotificationSink, TracingSink};
use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::event::{ContainerKind, DeploymentEvent, ImageSpec};
use crate::filter::{IgnoreReason, screen};
use crate::lookup::{ContainerLookup, ContainerTarget, NoLookup};

/// 파싱할 수 없는 이벤트의 ID
pub const UNKNOWN_EVENT_ID: &str = "unknown";

/// 이미지 하나의 처리 결과
#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
    /// 최근 스캔 기록이 있어 건너뜀
    CacheHit,
    /// 스캐너가 보고서를 냈고 저장됨
    Scanned {
        scan_id: String,
        status: ScanStatus,
        location: String,
        alerted: bool,
        cleanup_warning: Option<String>,
    },
    /// 보고서 없이 끝난 스캔 시도의 에러 레코드가 저장됨
    ScanError {
        scan_id: Option<String>,
        status: ScanStatus,
        kind: ScanErrorKind,
        location: String,
        cleanup_warning: Option<String>,
    },
    /// 이미지 참조를 파싱할 수 없음
    InvalidReference {
        error: String,
        location: Option<String>,
    },
    /// 결과 저장 실패 (재전달 필요)
    StoreFailed { error: String },
}

impl ImageOutcome {
    /// 로그와 요약에 쓰는 짧은 이름
    pub fn label(&self) -> &'static str {
        match self {
            Self::CacheHit => "cache_hit",
            Self::Scanned { .. } => "scanned",
            Self::ScanError { .. } => "scan_error",
            Self::InvalidReference { .. } => "invalid_reference",
            Self::StoreFailed { .. } => "store_failed",
        }
    }
}

/// 이미지별 보고
#[derive(Debug, Clone, PartialEq)]
pub struct ImageReport {
    /// 이벤트에 있던 원시 이미지 문자열
    pub raw_image: String,
    /// 정규 식별자 (파싱 성공 시)
    pub canonical_id: Option<String>,
    pub outcome: ImageOutcome,
}

/// 이벤트 처리 보고
#[derive(Debug, Clone, PartialEq)]
pub struct HandleReport {
    pub event_id: String,
    /// 이벤트 전체를 건너뛴 사유
    pub ignored: Option<IgnoreReason>,
    pub images: Vec<ImageReport>,
}

impl HandleReport {
    fn ignored(event_id: impl Into<String>, reason: IgnoreReason) -> Self {
        Self {
            event_id: event_id.into(),
            ignored: Some(reason),
            images: Vec::new(),
        }
    }

    /// 저장 실패로 이벤트를 다시 전달받아야 하는지 여부
    pub fn requires_redelivery(&self) -> bool {
        self.images
            .iter()
            .any(|i| matches!(i.outcome, ImageOutcome::StoreFailed { .. }))
    }

    /// 주어진 결과 레이블을 가진 이미지 수
    pub fn count(&self, label: &str) -> usize {
        self.images
            .iter()
            .filter(|i| i.outcome.label() == label)
            .count()
    }
}

impl fmt::Display for HandleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(reason) = &self.ignored {
            return write!(f, "event {} ignored: {reason}", self.event_id);
        }
        write!(
            f,
            "event {}: {} images (scanned={}, cached={}, scan_errors={}, invalid={}, store_failures={})",
            self.event_id,
            self.images.len(),
            self.count("scanned"),
            self.count("cache_hit"),
            self.count("scan_error"),
            self.count("invalid_reference"),
            self.count("store_failed"),
        )
    }
}

/// 스캔 잡 에러의 저장 분류
fn error_kind(error: &ScanJobError) -> ScanErrorKind {
    match error {
        ScanJobError::Provisioning { .. } | ScanJobError::Credentials { .. } => {
            ScanErrorKind::Provisioning
        }
        ScanJobError::TimedOut { .. } => ScanErrorKind::Timeout,
        ScanJobError::Unparseable { .. } => ScanErrorKind::Unparseable,
        ScanJobError::UnitNotFound(_) | ScanJobError::Platform(_) | ScanJobError::Config { .. } => {
            ScanErrorKind::Platform
        }
    }
}

/// 보고서 없이 끝난 스캔 잡
struct JobFailure<'a> {
    job_id: &'a str,
    status: ScanStatus,
    error: ScanJobError,
    cleanup_warning: Option<String>,
}

/// 배포 이벤트 처리기
///
/// # 타입 파라미터
/// - `P`: 실행 플랫폼
/// - `S`: 결과 저장소와 캐시 백엔드
/// - `K`: 스캐너 자격 증명 저장소
/// - `L`: 이벤트에 컨테이너 명세가 없을 때 쓰는 이미지 조회 (기본값: [`NoLookup`])
pub struct EventHandler<P, S, K, L = NoLookup>
where
    P: ExecutionPlatform,
    S: BlobStore + RowStore + KeyValueStore,
    K: SecretStore,
    L: ContainerLookup,
{
    config: IntakeConfig,
    orchestrator: ScanJobOrchestrator<P>,
    cache: ScanCache<S>,
    results: ResultStore<S>,
    secrets: Arc<K>,
    lookup: Arc<L>,
    credential_mappings: Vec<CredentialMapping>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl<P, S, K, L> EventHandler<P, S, K, L>
where
    P: ExecutionPlatform,
    S: BlobStore + RowStore + KeyValueStore,
    K: SecretStore,
    L: ContainerLookup,
{
    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    /// 결과 저장소 (조회용)
    pub fn results(&self) -> &ResultStore<S> {
        &self.results
    }

    /// 스캔 캐시 (조회용)
    pub fn cache(&self) -> &ScanCache<S> {
        &self.cache
    }

    /// 원시 JSON 이벤트를 처리합니다.
    ///
    /// 파싱할 수 없는 이벤트는 `Malformed` 사유로 건너뜁니다.
    pub async fn handle_raw(&self, raw: &str) -> HandleReport {
        match DeploymentEvent::parse(raw) {
            Ok(event) => self.handle(&event).await,
            Err(e) => Self::malformed(e),
        }
    }

    /// 이벤트 배열을 포함한 원시 JSON 본문을 처리합니다.
    ///
    /// 배열의 각 요소는 독립된 이벤트로 순서대로 처리되며, 파싱할 수 없는 요소는
    /// 나머지 요소 처리를 막지 않고 `Malformed` 보고로 남습니다.
    pub async fn handle_batch(&self, raw: &str) -> Vec<HandleReport> {
        let parsed = DeploymentEvent::parse_batch(raw);
        let mut reports = Vec::with_capacity(parsed.len());
        for event in parsed {
            reports.push(match event {
                Ok(event) => self.handle(&event).await,
                Err(e) => Self::malformed(e),
            });
        }
        reports
    }

    fn malformed(error: IntakeError) -> HandleReport {
        metrics::counter!(m::INTAKE_EVENTS_TOTAL).increment(1);
        let reason = IgnoreReason::Malformed(error.to_string());
        warn!(error = %error, "dropping malformed event");
        metrics::counter!(m::INTAKE_EVENTS_IGNORED_TOTAL, m::LABEL_REASON => reason.label())
            .increment(1);
        HandleReport::ignored(UNKNOWN_EVENT_ID, reason)
    }

    /// 배포 이벤트를 처리합니다.
    pub async fn handle(&self, event: &DeploymentEvent) -> HandleReport {
        metrics::counter!(m::INTAKE_EVENTS_TOTAL).increment(1);

        let kind = match screen(event, &self.config) {
            Ok(kind) => kind,
            Err(reason) => return self.ignore(event, reason),
        };

        let mut images = event.images(kind);
        if images.is_empty() {
            images = self.lookup_images(event, kind).await;
        }
        if images.is_empty() {
            return self.ignore(event, IgnoreReason::NoImages);
        }

        info!(
            event_id = %event.id,
            kind = %kind,
            resource = event.resource_name(),
            resource_group = event.resource_group(),
            images = images.len(),
            "processing deployment event"
        );

        let context = JobContext {
            event_id: event.id.clone(),
            container_type: kind.label().to_owned(),
            subscription_id: event.subscription_id().map(str::to_owned),
            resource_group: Some(event.resource_group().to_owned()),
            triggered_at: self.clock.now(),
        };

        // 자격 증명은 스캔이 필요한 첫 이미지에서 한 번만 해석
        let credentials = OnceCell::new();
        let mut reports = Vec::with_capacity(images.len());
        for image in &images {
            reports.push(self.process_image(image, &context, &credentials).await);
        }

        let report = HandleReport {
            event_id: event.id.clone(),
            ignored: None,
            images: reports,
        };
        if report.requires_redelivery() {
            error!(event_id = %event.id, "{report}; event needs redelivery");
        } else {
            info!(event_id = %event.id, "{report}");
        }
        report
    }

    /// 이벤트 본문에 이미지가 없을 때 배포된 리소스를 조회합니다.
    ///
    /// 조회 실패는 경고만 남기고 빈 목록으로 취급합니다.
    async fn lookup_images(&self, event: &DeploymentEvent, kind: ContainerKind) -> Vec<ImageSpec> {
        let target = ContainerTarget::from_event(event, kind);
        match self.lookup.images(&target).await {
            Ok(images) => {
                info!(
                    event_id = %event.id,
                    target = %target,
                    images = images.len(),
                    "event carried no container spec, looked up deployed images"
                );
                images
            }
            Err(e) => {
                warn!(event_id = %event.id, target = %target, error = %e, "container lookup failed");
                Vec::new()
            }
        }
    }

    fn ignore(&self, event: &DeploymentEvent, reason: IgnoreReason) -> HandleReport {
        info!(
            event_id = %event.id,
            subject = %event.subject,
            reason = %reason,
            "event ignored"
        );
        metrics::counter!(m::INTAKE_EVENTS_IGNORED_TOTAL, m::LABEL_REASON => reason.label())
            .increment(1);
        HandleReport::ignored(event.id.clone(), reason)
    }

    async fn process_image(
        &self,
        spec: &ImageSpec,
        context: &JobContext,
        credentials: &OnceCell<Result<Credentials, String>>,
    ) -> ImageReport {
        let image = match ImageReference::from_fragment(&spec.fragment) {
            Ok(image) => image,
            Err(e) => {
                metrics::counter!(m::INTAKE_IMAGE_PARSE_ERRORS_TOTAL).increment(1);
                warn!(
                    event_id = %context.event_id,
                    raw_image = %spec.raw,
                    error = %e,
                    "skipping malformed image reference"
                );
                let record = ScanErrorRecord {
                    raw_image: spec.raw.clone(),
                    canonical_id: None,
                    scan_id: None,
                    event_id: context.event_id.clone(),
                    kind: ScanErrorKind::ImageParse,
                    message: e.to_string(),
                    raw_output: None,
                };
                // 파싱 에러 기록은 재전달 대상이 아님
                let location = match self.results.save_error(&record).await {
                    Ok(location) => Some(location),
                    Err(store_err) => {
                        warn!(raw_image = %spec.raw, error = %store_err, "failed to record image parse error");
                        None
                    }
                };
                return ImageReport {
                    raw_image: spec.raw.clone(),
                    canonical_id: None,
                    outcome: ImageOutcome::InvalidReference {
                        error: e.to_string(),
                        location,
                    },
                };
            }
        };

        let canonical = image.canonical();
        let report = |outcome: ImageOutcome| ImageReport {
            raw_image: spec.raw.clone(),
            canonical_id: Some(canonical.clone()),
            outcome,
        };

        if !self
            .cache
            .should_scan(&canonical, self.config.window_hours)
            .await
        {
            info!(
                event_id = %context.event_id,
                image = %canonical,
                window_hours = self.config.window_hours,
                "image scanned recently, skipping"
            );
            return report(ImageOutcome::CacheHit);
        }

        let resolved = credentials
            .get_or_init(|| async {
                Credentials::resolve(self.secrets.as_ref(), &self.credential_mappings)
                    .await
                    .map_err(|e| e.to_string())
            })
            .await;
        let creds = match resolved {
            Ok(creds) => creds,
            Err(reason) => {
                error!(
                    event_id = %context.event_id,
                    image = %canonical,
                    reason = %reason,
                    "scanner credentials unavailable"
                );
                let record = ScanErrorRecord {
                    raw_image: spec.raw.clone(),
                    canonical_id: Some(canonical.clone()),
                    scan_id: None,
                    event_id: context.event_id.clone(),
                    kind: ScanErrorKind::Provisioning,
                    message: format!("credentials unavailable: {reason}"),
                    raw_output: None,
                };
                let outcome = match self.results.save_error(&record).await {
                    Ok(location) => ImageOutcome::ScanError {
                        scan_id: None,
                        status: ScanStatus::Failed,
                        kind: ScanErrorKind::Provisioning,
                        location,
                        cleanup_warning: None,
                    },
                    Err(e) => ImageOutcome::StoreFailed {
                        error: e.to_string(),
                    },
                };
                return report(outcome);
            }
        };

        let job = self.orchestrator.run(&image, creds, context).await;
        let outcome = match job.outcome {
            Ok(result) => self.persist_result(&result, job.cleanup_warning).await,
            Err(e) => {
                let failure = JobFailure {
                    job_id: &job.job_id,
                    status: job.status,
                    error: e,
                    cleanup_warning: job.cleanup_warning,
                };
                self.persist_failure(spec, &canonical, failure, context).await
            }
        };
        report(outcome)
    }

    async fn persist_result(
        &self,
        result: &ScanResult,
        cleanup_warning: Option<String>,
    ) -> ImageOutcome {
        let canonical = result.source_image.canonical();
        let location = match self.results.save(result).await {
            Ok(location) => location,
            Err(e) => {
                error!(
                    image = %canonical,
                    scan_id = %result.scan_id,
                    error = %e,
                    "failed to store scan result"
                );
                return ImageOutcome::StoreFailed {
                    error: e.to_string(),
                };
            }
        };

        let entry = ScanCacheEntry::from_result(result, location.clone(), self.cache.now());
        if let Err(e) = self.cache.record(&entry).await {
            warn!(image = %canonical, error = %e, "failed to update scan cache");
        }

        info!(
            image = %canonical,
            scan_id = %result.scan_id,
            status = %result.status,
            counts = %result.vulnerability_counts,
            "scan complete"
        );

        let alerted = self.maybe_alert(result, &location);
        ImageOutcome::Scanned {
            scan_id: result.scan_id.clone(),
            status: result.status,
            location,
            alerted,
            cleanup_warning,
        }
    }

    async fn persist_failure(
        &self,
        spec: &ImageSpec,
        canonical: &str,
        failure: JobFailure<'_>,
        context: &JobContext,
    ) -> ImageOutcome {
        let JobFailure {
            job_id,
            status,
            error,
            cleanup_warning,
        } = failure;
        let kind = error_kind(&error);
        let raw_output = match &error {
            ScanJobError::Unparseable { raw_output, .. } => Some(raw_output.clone()),
            _ => None,
        };
        warn!(
            event_id = %context.event_id,
            image = canonical,
            scan_id = job_id,
            status = %status,
            kind = %kind,
            error = %error,
            "scan produced no report"
        );
        let record = ScanErrorRecord {
            raw_image: spec.raw.clone(),
            canonical_id: Some(canonical.to_owned()),
            scan_id: Some(job_id.to_owned()),
            event_id: context.event_id.clone(),
            kind,
            message: error.to_string(),
            raw_output,
        };
        let location = match self.results.save_error(&record).await {
            Ok(location) => location,
            Err(e) => {
                error!(image = canonical, scan_id = job_id, error = %e, "failed to store scan error");
                return ImageOutcome::StoreFailed {
                    error: e.to_string(),
                };
            }
        };

        let entry = ScanCacheEntry::failure(
            canonical,
            status,
            Some(job_id.to_owned()),
            Some(location.clone()),
            context.event_id.clone(),
            self.cache.now(),
        );
        if let Err(e) = self.cache.record(&entry).await {
            warn!(image = canonical, error = %e, "failed to update scan cache");
        }

        ImageOutcome::ScanError {
            scan_id: Some(job_id.to_owned()),
            status,
            kind,
            location,
            cleanup_warning,
        }
    }

    fn maybe_alert(&self, result: &ScanResult, location: &str) -> bool {
        if !self.config.alert_enabled || !result.exceeds(self.config.alert_threshold) {
            return false;
        }
        let severity = result
            .vulnerability_counts
            .highest()
            .unwrap_or(self.config.alert_threshold);
        let alert = AlertEvent::for_scan(
            result.source_image.canonical(),
            result.scan_id.clone(),
            severity,
            result.vulnerability_counts,
            location,
            result.event_id.clone(),
        );
        self.notifier.raise(alert);
        metrics::counter!(m::INTAKE_ALERTS_SENT_TOTAL, m::LABEL_SEVERITY => severity.as_lower_str())
            .increment(1);
        true
    }
}

/// [`EventHandler`] 빌더
pub struct EventHandlerBuilder<P, S, K, L = NoLookup>
where
    P: ExecutionPlatform,
    S: BlobStore + RowStore + KeyValueStore,
    K: SecretStore,
    L: ContainerLookup,
{
    config: IntakeConfig,
    orchestrator: Option<ScanJobOrchestrator<P>>,
    storage: Option<Arc<S>>,
    secrets: Option<Arc<K>>,
    lookup: Arc<L>,
    notifier: Option<Arc<dyn NotificationSink>>,
    clock: Option<Arc<dyn Clock>>,
}

impl<P, S, K> EventHandlerBuilder<P, S, K>
where
    P: ExecutionPlatform,
    S: BlobStore + RowStore + KeyValueStore,
    K: SecretStore,
{
    pub fn new() -> Self {
        Self {
            config: IntakeConfig::default(),
            orchestrator: None,
            storage: None,
            secrets: None,
            lookup: Arc::new(NoLookup),
            notifier: None,
            clock: None,
        }
    }
}

impl<P, S, K, L> EventHandlerBuilder<P, S, K, L>
where
    P: ExecutionPlatform,
    S: BlobStore + RowStore + KeyValueStore,
    K: SecretStore,
    L: ContainerLookup,
{

    pub fn config(mut self, config: IntakeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn orchestrator(mut self, orchestrator: ScanJobOrchestrator<P>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn storage(mut self, storage: Arc<S>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn secrets(mut self, secrets: Arc<K>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// 컨테이너 이미지 조회 (기본값: [`NoLookup`])
    pub fn lookup<L2: ContainerLookup>(self, lookup: Arc<L2>) -> EventHandlerBuilder<P, S, K, L2> {
        EventHandlerBuilder {
            config: self.config,
            orchestrator: self.orchestrator,
            storage: self.storage,
            secrets: self.secrets,
            lookup,
            notifier: self.notifier,
            clock: self.clock,
        }
    }

    /// 알림 sink (기본값: [`TracingSink`])
    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// 캐시와 저장소가 사용할 시계 (기본값: [`SystemClock`])
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<EventHandler<P, S, K, L>, IntakeError> {
        self.config.validate()?;

        let orchestrator = self.orchestrator.ok_or_else(|| IntakeError::Config {
            field: "orchestrator".to_owned(),
            reason: "scan job orchestrator is required".to_owned(),
        })?;
        let storage = self.storage.ok_or_else(|| IntakeError::Config {
            field: "storage".to_owned(),
            reason: "storage backend is required".to_owned(),
        })?;
        let secrets = self.secrets.ok_or_else(|| IntakeError::Config {
            field: "secrets".to_owned(),
            reason: "secret store is required".to_owned(),
        })?;
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(TracingSink));
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let credential_mappings = orchestrator.config().credentials.clone();
        Ok(EventHandler {
            config: self.config,
            cache: ScanCache::new(Arc::clone(&storage), Arc::clone(&clock)),
            results: ResultStore::new(storage, Arc::clone(&clock)),
            orchestrator,
            secrets,
            lookup: self.lookup,
            credential_mappings,
            notifier,
            clock,
        })
    }
}

impl<P, S, K> Default for EventHandlerBuilder<P, S, K>
where
    P: ExecutionPlatform,
    S: BlobStore + RowStore + KeyValueStore,
    K: SecretStore,
{
    fn default() -> Self {
        Self::new()
    }
}
