//! 스캔 잡 상태 머신
//!
//! ```text
//! Pending → Provisioning → Running → {Succeeded | Failed | TimedOut} → CleaningUp → Terminal
//!                 │                                  ▲
//!                 └──── (프로비저닝 실패, 시간 초과) ────┘
//! ```
//!
//! [`JobState::transition`]과 [`evaluate_poll`]은 순수 함수이며 실행 플랫폼 없이 테스트할 수 있습니다.

use std::fmt;
use std::time::Duration;

use deployscan_core::types::ScanStatus;

use crate::platform::UnitStatus;

/// 스캔 잡 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Pending,
    Provisioning,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    CleaningUp,
    Terminal,
}

/// 상태 전이를 유발하는 신호
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSignal {
    /// 실행 단위 생성 요청
    Provision,
    /// 플랫폼이 시작을 보고
    Started,
    /// 종료 코드 관찰
    Exited { exit_code: i64 },
    /// 생성 실패 또는 플랫폼 오류
    Fault,
    /// 제한 시간 초과
    Deadline,
    /// 삭제 시작
    Cleanup,
    /// 삭제 완료 (성공 여부 무관)
    Finish,
}

impl JobState {
    /// 신호에 따른 다음 상태를 반환합니다. 허용되지 않는 전이는 `None`입니다.
    pub fn transition(self, signal: JobSignal) -> Option<JobState> {
        use JobSignal as S;
        use JobState::*;

        match (self, signal) {
            (Pending, S::Provision) => Some(Provisioning),
            (Pending, S::Fault) => Some(Failed),
            (Provisioning, S::Started) => Some(Running),
            // 시작 보고 없이 바로 종료가 관찰될 수 있음
            (Provisioning | Running, S::Exited { exit_code: 0 }) => Some(Succeeded),
            (Provisioning | Running, S::Exited { .. }) => Some(Failed),
            (Provisioning | Running, S::Fault) => Some(Failed),
            (Provisioning | Running, S::Deadline) => Some(TimedOut),
            (Succeeded | Failed | TimedOut, S::Cleanup) => Some(CleaningUp),
            (CleaningUp, S::Finish) => Some(Terminal),
            _ => None,
        }
    }

    /// 판정 상태(`Succeeded`, `Failed`, `TimedOut`) 여부
    pub fn is_verdict(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }

    /// 판정 상태를 스캔 상태로 변환합니다.
    pub fn scan_status(self) -> Option<ScanStatus> {
        match self {
            Self::Succeeded => Some(ScanStatus::Succeeded),
            Self::Failed => Some(ScanStatus::Failed),
            Self::TimedOut => Some(ScanStatus::TimedOut),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Provisioning => "Provisioning",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::TimedOut => "TimedOut",
            Self::CleaningUp => "CleaningUp",
            Self::Terminal => "Terminal",
        };
        f.write_str(s)
    }
}

/// 상태 조회 한 번의 판정 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollDecision {
    /// 계속 대기
    Wait,
    /// 시작됨 (계속 대기)
    Started,
    /// 종료 코드 관찰
    Exited(i64),
    /// 플랫폼이 시작을 포기함
    ProvisioningFailed(String),
    /// 제한 시간 초과
    TimedOut,
}

/// 조회된 상태와 경과 시간으로 다음 행동을 결정합니다.
///
/// 이미 종료 코드가 관찰되었다면 제한 시간을 넘겼더라도 종료가 우선합니다.
pub fn evaluate_poll(status: &UnitStatus, elapsed: Duration, timeout: Duration) -> PollDecision {
    match status {
        UnitStatus::Exited { exit_code } => PollDecision::Exited(*exit_code),
        UnitStatus::ProvisioningFailed { reason } => {
            PollDecision::ProvisioningFailed(reason.clone())
        }
        _ if elapsed >= timeout => PollDecision::TimedOut,
        UnitStatus::Running => PollDecision::Started,
        UnitStatus::Pending => PollDecision::Wait,
    }
}
