//! 라우팅 규칙 데이터 타입
//!
//! YAML 규칙 파일에서 역직렬화되는 구조체들을 정의합니다.

use serde::{Deserialize, Serialize};

use relaypost_core::types::Severity;

use crate::error::RelayPipelineError;

/// 라우팅 규칙 -- 하나의 YAML 규칙 파일에 대응합니다.
///
/// # YAML 스키마
/// ```yaml
/// id: prod_disk_errors
/// priority: 10
/// match_type: contains
/// match_string: "ERROR"
/// severity: high
/// team: storage
/// dev_handling: ticket_only
/// prod_handling: page_and_ticket
/// description: Disk error events from storage hosts
/// ```
///
/// trap 계열 규칙은 `match_string` 대신 `trap_oid`를 사용합니다:
/// ```yaml
/// id: cisco_linkdown
/// priority: 5
/// match_type: oid_prefix
/// trap_oid: "1.3.6.1.6.3.1.1.5.3"
/// team: network
/// prod_handling: page
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    /// 규칙 고유 ID (규칙 집합 내에서 유일해야 함)
    pub id: String,
    /// 평가 순서. 값이 작을수록 먼저 평가되며, 같으면 ID 사전순입니다.
    pub priority: i64,
    /// 매칭 방식
    pub match_type: MatchType,
    /// contains/regex 매칭 대상 패턴
    #[serde(default)]
    pub match_string: Option<String>,
    /// oid_prefix 매칭 대상 SNMP trap OID 접두사
    #[serde(default)]
    pub trap_oid: Option<String>,
    /// 심각도 필터. 설정 시 이 심각도의 이벤트만 매칭합니다.
    ///
    /// syslog 계열 표기("err", "warning" 등)를 허용하며,
    /// 심각도가 없는 이벤트는 필터가 있는 규칙에 매칭되지 않습니다.
    #[serde(default)]
    pub severity: Option<String>,
    /// 담당 팀
    pub team: String,
    /// dev 환경 호스트에 적용되는 처리 방식 (예: "ticket_only")
    #[serde(default)]
    pub dev_handling: Option<String>,
    /// prod 환경 호스트에 적용되는 처리 방식 (예: "page_and_ticket")
    #[serde(default)]
    pub prod_handling: Option<String>,
    /// 규칙 설명
    #[serde(default)]
    pub description: String,
}

impl RouteRule {
    /// 규칙의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), RelayPipelineError> {
        if self.id.is_empty() {
            return Err(RelayPipelineError::RuleValidation {
                rule_id: "(empty)".to_owned(),
                reason: "rule id must not be empty".to_owned(),
            });
        }

        if self.id.len() > 256 {
            return Err(RelayPipelineError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "rule id must not exceed 256 characters".to_owned(),
            });
        }

        if self.team.trim().is_empty() {
            return Err(RelayPipelineError::RuleValidation {
                rule_id: self.id.clone(),
                reason: "team must not be empty".to_owned(),
            });
        }

        match self.match_type {
            MatchType::Contains | MatchType::Regex => {
                if self.match_string.as_deref().is_none_or(str::is_empty) {
                    return Err(RelayPipelineError::RuleValidation {
                        rule_id: self.id.clone(),
                        reason: format!(
                            "match_string is required for match_type '{}'",
                            self.match_type.as_str()
                        ),
                    });
                }
            }
            MatchType::OidPrefix => {
                if self.trap_oid.as_deref().is_none_or(str::is_empty) {
                    return Err(RelayPipelineError::RuleValidation {
                        rule_id: self.id.clone(),
                        reason: "trap_oid is required for match_type 'oid_prefix'".to_owned(),
                    });
                }
            }
        }

        if let Some(ref spelling) = self.severity {
            if Severity::from_str_loose(spelling).is_none() {
                return Err(RelayPipelineError::RuleValidation {
                    rule_id: self.id.clone(),
                    reason: format!("unknown severity '{}'", spelling),
                });
            }
        }

        Ok(())
    }

    /// 심각도 필터를 정규화된 [`Severity`]로 반환합니다.
    pub fn severity_filter(&self) -> Option<Severity> {
        self.severity.as_deref().and_then(Severity::from_str_loose)
    }

    /// 호스트 환경에 맞는 처리 방식을 반환합니다.
    pub fn resolve_handling(&self, is_dev_host: bool) -> Option<&str> {
        if is_dev_host {
            self.dev_handling.as_deref()
        } else {
            self.prod_handling.as_deref()
        }
    }
}

/// 매칭 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// 메시지 부분 문자열 포함 (대소문자 구분 없음)
    Contains,
    /// 메시지 정규식 매칭 (대소문자 구분 없음)
    Regex,
    /// SNMP trap OID 접두사 일치
    OidPrefix,
}

impl MatchType {
    /// YAML 표기와 같은 이름을 반환합니다.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Regex => "regex",
            Self::OidPrefix => "oid_prefix",
        }
    }
}
