//! 규칙 매칭 -- 스냅샷에 대한 순수 함수
//!
//! 같은 (이벤트, 스냅샷) 쌍은 언제나 같은 결과를 내며,
//! 첫 번째로 매칭된 규칙 하나만 적용됩니다 (first match wins).

use relaypost_core::envelope::EventEnvelope;

use super::snapshot::{CompiledRule, RuleSnapshot};
use super::types::MatchType;

/// 이벤트에 매칭되는 첫 규칙을 찾습니다.
///
/// 스냅샷의 규칙들은 이미 (priority, id) 순으로 정렬되어 있으므로
/// 앞에서부터 순회하며 비활성 규칙은 건너뜁니다.
pub fn match_event<'a>(event: &EventEnvelope, snapshot: &'a RuleSnapshot) -> Option<&'a CompiledRule> {
    snapshot
        .rules()
        .iter()
        .filter(|compiled| compiled.active)
        .find(|compiled| rule_matches(event, compiled))
}

/// 규칙 하나에 대한 매칭 판정
fn rule_matches(event: &EventEnvelope, compiled: &CompiledRule) -> bool {
    // trap 규칙은 OID 접두사만 봅니다
    if compiled.rule.match_type == MatchType::OidPrefix {
        return match (&event.trap_oid, &compiled.rule.trap_oid) {
            (Some(event_oid), Some(prefix)) => event_oid.starts_with(prefix.as_str()),
            _ => false,
        };
    }

    // 메시지 계열: 심각도 필터가 있으면 먼저 기각합니다.
    // 심각도 표기가 없거나 해석 불가능한 이벤트는 필터를 통과하지 못합니다.
    if let Some(filter) = compiled.severity_filter {
        if event.severity_parsed() != Some(filter) {
            return false;
        }
    }

    match compiled.rule.match_type {
        MatchType::Contains => compiled
            .contains_pattern
            .as_deref()
            .is_some_and(|pattern| event.message.to_lowercase().contains(pattern)),
        MatchType::Regex => compiled
            .regex
            .as_ref()
            .is_some_and(|re| re.is_match(&event.message)),
        MatchType::OidPrefix => false,
    }
}
