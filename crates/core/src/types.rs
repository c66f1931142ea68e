//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 모든 모듈이 공유하는 데이터 구조를 정의합니다.
//! 이벤트 엔벨로프는 [`envelope`](crate::envelope) 모듈에 있습니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 심각도 레벨
///
/// 이벤트의 심각도를 나타냅니다.
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
///
/// 소스 이벤트는 syslog 계열의 다양한 표기("err", "warning", "crit" 등)를
/// 사용하므로, 비교 전에 [`Severity::from_str_loose`]로 정규화합니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    /// 정보성 이벤트
    #[default]
    Info,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적 — 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않으며, syslog 계열 별칭을 허용합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" | "informational" | "notice" | "debug" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" | "warning" | "warn" => Some(Self::Medium),
            "high" | "error" | "err" | "alert" => Some(Self::High),
            "critical" | "crit" | "emergency" | "emerg" | "fatal" => Some(Self::Critical),
            _ => None,
        }
    }

    /// 인시던트 매니저 webhook의 정수 심각도(0-5)로 변환합니다.
    ///
    /// 0은 심각도 미상 이벤트에 예약되어 있으므로 호출 측에서
    /// `severity.map(Severity::webhook_level).unwrap_or(0)` 형태로 사용합니다.
    pub fn webhook_level(self) -> u8 {
        match self {
            Self::Info => 1,
            Self::Low => 2,
            Self::Medium => 3,
            Self::High => 4,
            Self::Critical => 5,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "Info"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}
