//! 규칙 스냅샷 -- 한 세대 동안 불변인 컴파일된 규칙 집합
//!
//! 로더가 읽은 규칙을 (priority, id) 순으로 정렬하고 정규식을 미리
//! 컴파일해 둡니다. 매칭 경로에서는 어떤 컴파일도 일어나지 않으며,
//! 스냅샷 교체는 통째로만 이루어집니다.

use std::collections::{HashMap, HashSet};

use regex::Regex;

use relaypost_core::types::Severity;

use super::types::{MatchType, RouteRule};

/// 컴파일된 규칙
///
/// 매칭에 필요한 파생값(소문자 패턴, 정규식, 정규화된 심각도)을
/// 스냅샷 생성 시점에 한 번만 계산합니다.
#[derive(Debug)]
pub struct CompiledRule {
    /// 원본 규칙
    pub rule: RouteRule,
    /// contains 매칭용 소문자화된 패턴
    pub(crate) contains_pattern: Option<String>,
    /// regex 매칭용 컴파일된 패턴 (대소문자 무시)
    pub(crate) regex: Option<Regex>,
    /// 정규화된 심각도 필터
    pub(crate) severity_filter: Option<Severity>,
    /// 활성 여부. 정규식 컴파일에 실패한 규칙은 이 세대 동안 비활성입니다.
    pub active: bool,
}

impl CompiledRule {
    fn compile(rule: RouteRule) -> Self {
        let mut active = true;

        let contains_pattern = match rule.match_type {
            MatchType::Contains => rule.match_string.as_deref().map(str::to_lowercase),
            _ => None,
        };

        let regex = match rule.match_type {
            MatchType::Regex => {
                let pattern = rule.match_string.as_deref().unwrap_or_default();
                match Regex::new(&format!("(?i){}", pattern)) {
                    Ok(compiled) => Some(compiled),
                    Err(e) => {
                        tracing::warn!(
                            rule_id = %rule.id,
                            error = %e,
                            "regex failed to compile, rule inactive for this generation"
                        );
                        active = false;
                        None
                    }
                }
            }
            _ => None,
        };

        let severity_filter = rule.severity_filter();

        Self {
            rule,
            contains_pattern,
            regex,
            severity_filter,
            active,
        }
    }
}

/// 규칙 스냅샷
///
/// 라우터가 한 이벤트를 처리하는 동안 바라보는 규칙 집합 전체입니다.
/// 생성 이후 절대 변하지 않으므로 락 없이 공유해도 안전합니다.
#[derive(Debug)]
pub struct RuleSnapshot {
    /// (priority, id) 오름차순으로 정렬된 규칙들
    rules: Vec<CompiledRule>,
    /// dev 환경 호스트명 집합
    dev_hosts: HashSet<String>,
    /// 호스트명 -> 담당 팀 매핑
    host_team_map: HashMap<String, String>,
}

impl RuleSnapshot {
    /// 규칙 목록과 호스트 매핑으로 스냅샷을 생성합니다.
    ///
    /// 규칙은 priority 오름차순, 같으면 ID 사전순으로 정렬되어
    /// 어느 워커에서 평가하든 같은 순서를 보장합니다.
    pub fn new(
        rules: Vec<RouteRule>,
        dev_hosts: HashSet<String>,
        host_team_map: HashMap<String, String>,
    ) -> Self {
        let mut compiled: Vec<CompiledRule> = rules.into_iter().map(CompiledRule::compile).collect();
        compiled.sort_by(|a, b| {
            a.rule
                .priority
                .cmp(&b.rule.priority)
                .then_with(|| a.rule.id.cmp(&b.rule.id))
        });

        Self {
            rules: compiled,
            dev_hosts,
            host_team_map,
        }
    }

    /// 빈 스냅샷을 생성합니다. 모든 이벤트가 미처리로 분류됩니다.
    pub fn empty() -> Self {
        Self::new(Vec::new(), HashSet::new(), HashMap::new())
    }

    /// 평가 순서대로 정렬된 규칙 목록
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// 전체 규칙 수 (비활성 포함)
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 규칙이 하나도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 활성 규칙 수
    pub fn active_count(&self) -> usize {
        self.rules.iter().filter(|r| r.active).count()
    }

    /// 호스트가 dev 환경인지 확인합니다.
    pub fn is_dev_host(&self, hostname: &str) -> bool {
        self.dev_hosts.contains(hostname)
    }

    /// 호스트의 담당 팀을 반환합니다. 매핑에 없으면 `None`입니다.
    pub fn team_for_host(&self, hostname: &str) -> Option<&str> {
        self.host_team_map.get(hostname).map(String::as_str)
    }
}
