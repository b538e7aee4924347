//! 스캔 잡 오케스트레이터
//!
//! [`ScanJobOrchestrator`]는 이미지 하나에 대해 실행 단위를 만들고, 종료 또는 제한 시간까지
//! 폴링한 뒤 출력을 파싱하고, 어떤 경로로 끝나든 실행 단위를 정확히 한 번 삭제합니다.
//!
//! # 정리 보장
//!
//! 생성, 폴링, 로그 조회, 파싱 단계는 하나의 future로 묶여 실행되며, 에러와 panic 모두
//! 값으로 변환된 뒤 삭제 단계가 실행됩니다. 삭제 실패는 판정을 바꾸지 않고
//! [`JobReport::cleanup_warning`]으로만 보고됩니다.
//!
//! # 폴링
//!
//! `tokio::time::Instant`와 `tokio::time::sleep`을 사용하므로 `start_paused` 테스트에서
//! 가상 시간으로 제한 시간을 검증할 수 있습니다.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use deployscan_core::clock::{Clock, unix_millis};
use deployscan_core::image::ImageReference;
use deployscan_core::metrics as m;
use deployscan_core::types::{ScanResult, ScanStatus};

use crate::config::ScanJobConfig;
use crate::credentials::Credentials;
use crate::error::ScanJobError;
use crate::output::{extract_report, parse_report, tail};
use crate::platform::{ExecutionPlatform, MAX_UNIT_NAME_LEN};
use crate::spec::{JobContext, UnitSpec};
use crate::state::{JobSignal, JobState, PollDecision, evaluate_poll};

const JOB_ID_RANDOM_LEN: usize = 6;
const FALLBACK_SLUG: &str = "image";

/// 스캔 잡 한 번의 실행 보고서
#[derive(Debug)]
pub struct JobReport {
    /// 잡 ID (실행 단위 이름, 스캔 ID)
    pub job_id: String,
    /// 최종 판정
    pub status: ScanStatus,
    /// 관찰된 종료 코드
    pub exit_code: Option<i64>,
    /// 거쳐간 상태 (`Pending`부터 `Terminal`까지)
    pub history: Vec<JobState>,
    /// 실행 단위 삭제 실패 메시지
    pub cleanup_warning: Option<String>,
    /// 결과 또는 실패 원인
    ///
    /// 종료 코드가 0이 아니어도 JSON 보고서가 있으면 `Ok`이며 `status`는 `Failed`입니다.
    pub outcome: Result<ScanResult, ScanJobError>,
    /// 프로비저닝부터 정리까지 걸린 시간
    pub duration: Duration,
}

/// 상태 전이를 기록하는 추적기
struct StateTracker<'a> {
    job_id: &'a str,
    state: JobState,
    history: Vec<JobState>,
}

impl<'a> StateTracker<'a> {
    fn new(job_id: &'a str) -> Self {
        Self {
            job_id,
            state: JobState::Pending,
            history: vec![JobState::Pending],
        }
    }

    fn apply(&mut self, signal: JobSignal) {
        match self.state.transition(signal) {
            Some(next) => {
                debug!(job_id = self.job_id, from = %self.state, to = %next, "job state transition");
                self.state = next;
                self.history.push(next);
            }
            None => {
                warn!(
                    job_id = self.job_id,
                    state = %self.state,
                    signal = ?signal,
                    "ignoring invalid job state transition"
                );
            }
        }
    }
}

/// 스캔 잡 오케스트레이터
pub struct ScanJobOrchestrator<P: ExecutionPlatform> {
    platform: Arc<P>,
    config: ScanJobConfig,
    clock: Arc<dyn Clock>,
}

impl<P: ExecutionPlatform> Clone for ScanJobOrchestrator<P> {
    fn clone(&self) -> Self {
        Self {
            platform: Arc::clone(&self.platform),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<P: ExecutionPlatform> ScanJobOrchestrator<P> {
    pub fn new(platform: Arc<P>, config: ScanJobConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            platform,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &ScanJobConfig {
        &self.config
    }

    /// 실행 단위 이름 접두어 (자체 트리거 필터용)
    pub fn job_name_prefix(&self) -> &str {
        &self.config.job_name_prefix
    }

    /// 이미지와 현재 시각으로 잡 ID를 만듭니다.
    ///
    /// 형식: `{prefix}{slug}-{unix_millis}-{random}`, 소문자, 최대 63자
    pub fn job_id(&self, target: &ImageReference) -> String {
        let random = Uuid::new_v4().simple().to_string();
        let suffix = format!(
            "-{}-{}",
            unix_millis(self.clock.now()),
            &random[..JOB_ID_RANDOM_LEN]
        );
        let budget = MAX_UNIT_NAME_LEN
            .saturating_sub(self.config.job_name_prefix.len())
            .saturating_sub(suffix.len());

        let mut slug = String::with_capacity(budget);
        for c in target.short_name().chars() {
            let c = c.to_ascii_lowercase();
            let c = if c.is_ascii_alphanumeric() { c } else { '-' };
            if c == '-' && (slug.is_empty() || slug.ends_with('-')) {
                continue;
            }
            if slug.len() >= budget {
                break;
            }
            slug.push(c);
        }
        let slug = slug.trim_end_matches('-');
        let slug = if slug.is_empty() {
            &FALLBACK_SLUG[..FALLBACK_SLUG.len().min(budget)]
        } else {
            slug
        };

        format!("{}{slug}{suffix}", self.config.job_name_prefix)
    }

    /// 설정된 제한 시간으로 스캔을 실행합니다.
    pub async fn run(
        &self,
        target: &ImageReference,
        credentials: &Credentials,
        context: &JobContext,
    ) -> JobReport {
        self.run_with_timeout(target, credentials, context, self.config.timeout())
            .await
    }

    /// 스캔을 실행합니다.
    ///
    /// 항상 보고서를 반환하며, 반환 전에 실행 단위 삭제를 정확히 한 번 요청합니다.
    pub async fn run_with_timeout(
        &self,
        target: &ImageReference,
        credentials: &Credentials,
        context: &JobContext,
        timeout: Duration,
    ) -> JobReport {
        let job_id = self.job_id(target);
        let started = Instant::now();
        let mut tracker = StateTracker::new(&job_id);
        let spec = UnitSpec::build(&self.config, job_id.as_str(), target, credentials, context);

        metrics::counter!(m::SCAN_JOB_STARTED_TOTAL).increment(1);
        info!(
            job_id = %job_id,
            image = %target,
            event_id = %context.event_id,
            timeout_secs = timeout.as_secs(),
            unit = %spec.describe(),
            "starting scan job"
        );

        let execution = AssertUnwindSafe(self.execute(&spec, target, context, timeout, &mut tracker))
            .catch_unwind()
            .await;
        let (exit_code, outcome) = match execution {
            Ok(result) => result,
            Err(_) => (
                None,
                Err(ScanJobError::Platform(format!(
                    "scan job '{job_id}' aborted unexpectedly"
                ))),
            ),
        };
        if !tracker.state.is_verdict() {
            tracker.apply(JobSignal::Fault);
        }
        let status = tracker.state.scan_status().unwrap_or(ScanStatus::Failed);

        tracker.apply(JobSignal::Cleanup);
        let cleanup_warning = match self.call("delete", self.platform.delete(&job_id)).await {
            Ok(()) => None,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "failed to delete execution unit");
                metrics::counter!(m::SCAN_JOB_CLEANUP_FAILURES_TOTAL).increment(1);
                Some(e.to_string())
            }
        };
        tracker.apply(JobSignal::Finish);

        let duration = started.elapsed();
        metrics::counter!(m::SCAN_JOB_FINISHED_TOTAL, m::LABEL_STATUS => status.to_string())
            .increment(1);
        metrics::histogram!(m::SCAN_JOB_DURATION_SECONDS).record(duration.as_secs_f64());

        match &outcome {
            Ok(result) => info!(
                job_id = %job_id,
                image = %target,
                status = %status,
                exit_code = ?exit_code,
                counts = %result.vulnerability_counts,
                duration_secs = duration.as_secs(),
                "scan job finished"
            ),
            Err(e) => warn!(
                job_id = %job_id,
                image = %target,
                status = %status,
                error = %e,
                duration_secs = duration.as_secs(),
                "scan job finished without result"
            ),
        }

        let history = tracker.history;
        JobReport {
            job_id,
            status,
            exit_code,
            history,
            cleanup_warning,
            outcome,
            duration,
        }
    }

    /// 생성부터 파싱까지 실행합니다. 판정 상태 전이는 여기서 적용합니다.
    async fn execute(
        &self,
        spec: &UnitSpec,
        target: &ImageReference,
        context: &JobContext,
        timeout: Duration,
        tracker: &mut StateTracker<'_>,
    ) -> (Option<i64>, Result<ScanResult, ScanJobError>) {
        let name = spec.name.as_str();
        let started = Instant::now();

        tracker.apply(JobSignal::Provision);
        let created = match self.call("create", self.platform.create(spec)).await {
            Err(ScanJobError::Platform(reason)) => Err(ScanJobError::Provisioning {
                unit: name.to_owned(),
                reason,
            }),
            other => other,
        };
        if let Err(e) = created {
            tracker.apply(JobSignal::Fault);
            return (None, Err(e));
        }

        let exit_code = match self.poll(name, started, timeout, tracker).await {
            Ok(code) => code,
            Err(e) => return (None, Err(e)),
        };

        let logs = match self.call("logs", self.platform.logs(name)).await {
            Ok(logs) => logs,
            Err(e) => {
                tracker.apply(JobSignal::Fault);
                return (Some(exit_code), Err(e));
            }
        };
        let logs = tail(&logs, self.config.max_log_bytes);

        let Some(report_json) = extract_report(logs) else {
            tracker.apply(JobSignal::Fault);
            return (
                Some(exit_code),
                Err(ScanJobError::Unparseable {
                    unit: name.to_owned(),
                    raw_output: logs.to_owned(),
                }),
            );
        };

        tracker.apply(JobSignal::Exited { exit_code });
        let report = parse_report(&report_json.value);
        let status = if exit_code == 0 {
            ScanStatus::Succeeded
        } else {
            ScanStatus::Failed
        };

        let result = ScanResult {
            scan_id: name.to_owned(),
            tool_scan_id: report.tool_scan_id,
            source_image: target.clone(),
            event_id: context.event_id.clone(),
            status,
            exit_code: Some(exit_code),
            findings: report.findings,
            vulnerability_counts: report.vulnerability_counts,
            compliance_checks: report.compliance_checks,
            compliance_counts: report.compliance_counts,
            raw_payload: report_json.raw,
            scanned_at: self.clock.now(),
        };
        (Some(exit_code), Ok(result))
    }

    /// 종료 코드가 관찰될 때까지 폴링합니다.
    async fn poll(
        &self,
        name: &str,
        started: Instant,
        timeout: Duration,
        tracker: &mut StateTracker<'_>,
    ) -> Result<i64, ScanJobError> {
        let interval = self.config.poll_interval();
        let mut status_errors: u32 = 0;

        loop {
            let elapsed = started.elapsed();
            let decision = match self.call("status", self.platform.status(name)).await {
                Ok(status) => {
                    status_errors = 0;
                    evaluate_poll(&status, elapsed, timeout)
                }
                Err(e @ ScanJobError::UnitNotFound(_)) => {
                    tracker.apply(JobSignal::Fault);
                    return Err(e);
                }
                Err(_) if elapsed >= timeout => PollDecision::TimedOut,
                Err(e) => {
                    status_errors += 1;
                    if status_errors > self.config.max_status_errors {
                        tracker.apply(JobSignal::Fault);
                        return Err(e);
                    }
                    warn!(
                        job_id = name,
                        attempt = status_errors,
                        max_errors = self.config.max_status_errors,
                        error = %e,
                        "status poll failed, retrying"
                    );
                    PollDecision::Wait
                }
            };

            match decision {
                PollDecision::Wait => {}
                PollDecision::Started => {
                    if tracker.state == JobState::Provisioning {
                        tracker.apply(JobSignal::Started);
                        info!(job_id = name, "scan job running");
                    }
                }
                PollDecision::Exited(code) => return Ok(code),
                PollDecision::ProvisioningFailed(reason) => {
                    tracker.apply(JobSignal::Fault);
                    return Err(ScanJobError::Provisioning {
                        unit: name.to_owned(),
                        reason,
                    });
                }
                PollDecision::TimedOut => {
                    tracker.apply(JobSignal::Deadline);
                    warn!(
                        job_id = name,
                        elapsed_secs = elapsed.as_secs(),
                        "scan job timed out, terminating"
                    );
                    if let Err(e) = self.call("terminate", self.platform.terminate(name)).await {
                        warn!(job_id = name, error = %e, "failed to terminate execution unit");
                    }
                    return Err(ScanJobError::TimedOut {
                        unit: name.to_owned(),
                        elapsed_secs: elapsed.as_secs(),
                    });
                }
            }

            let remaining = timeout.saturating_sub(started.elapsed());
            tokio::time::sleep(interval.min(remaining)).await;
        }
    }

    /// 플랫폼 호출 하나에 타임아웃을 적용합니다.
    async fn call<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T, ScanJobError>>,
    ) -> Result<T, ScanJobError> {
        let limit = self.config.platform_call_timeout();
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(ScanJobError::Platform(format!(
                "{operation} did not complete within {}s",
                limit.as_secs()
            ))),
        }
    }
}
