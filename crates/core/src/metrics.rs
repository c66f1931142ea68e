//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `relaypost_`
//! - 모듈명: `router_`, `forwarder_`, `queue_`, `janitor_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use relaypost_core::metrics;
//! use metrics::counter;
//!
//! counter!(relaypost_core::metrics::ROUTER_EVENTS_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 큐 이름 레이블 키 (input, alert, dlq 등)
pub const LABEL_QUEUE: &str = "queue";

/// 심각도 레이블 키 (info, low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 모듈 레이블 키
pub const LABEL_MODULE: &str = "module";

/// 매칭된 규칙 ID 레이블 키
pub const LABEL_RULE: &str = "rule";

/// 담당 팀 레이블 키
pub const LABEL_TEAM: &str = "team";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 실패 사유 레이블 키 (timeout, http_5xx, http_4xx, connection)
pub const LABEL_REASON: &str = "reason";

// ─── Router 메트릭 ──────────────────────────────────────────────────

/// Router: 입력 큐에서 클레임한 전체 이벤트 수 (counter)
pub const ROUTER_EVENTS_TOTAL: &str = "relaypost_router_events_total";

/// Router: 규칙에 매칭된 이벤트 수 (counter, label: rule)
pub const ROUTER_EVENTS_MATCHED_TOTAL: &str = "relaypost_router_events_matched_total";

/// Router: 어떤 규칙에도 매칭되지 않은 이벤트 수 (counter)
pub const ROUTER_EVENTS_UNHANDLED_TOTAL: &str = "relaypost_router_events_unhandled_total";

/// Router: 중복 제거 임계값 도달로 발생한 메타 알림 수 (counter)
pub const ROUTER_META_ALERTS_TOTAL: &str = "relaypost_router_meta_alerts_total";

/// Router: 이벤트 1건 처리 지연 시간 (histogram, 초)
pub const ROUTER_PROCESSING_DURATION_SECONDS: &str =
    "relaypost_router_processing_duration_seconds";

// ─── Forwarder 메트릭 ───────────────────────────────────────────────

/// Forwarder: 전달에 성공한 알림 수 (counter)
pub const FORWARDER_SENT_TOTAL: &str = "relaypost_forwarder_sent_total";

/// Forwarder: 전달 실패 수 (counter, label: reason)
pub const FORWARDER_FAILURES_TOTAL: &str = "relaypost_forwarder_failures_total";

/// Forwarder: 레이트 리밋으로 거부된 알림 수 (counter)
pub const FORWARDER_RATE_LIMITED_TOTAL: &str = "relaypost_forwarder_rate_limited_total";

/// Forwarder: 서킷 브레이커 OPEN으로 건너뛴 전달 시도 수 (counter)
pub const FORWARDER_BREAKER_OPEN_TOTAL: &str = "relaypost_forwarder_breaker_open_total";

/// Forwarder: 재시도를 위해 재큐잉된 알림 수 (counter)
pub const FORWARDER_REQUEUED_TOTAL: &str = "relaypost_forwarder_requeued_total";

/// Forwarder: webhook 호출 소요 시간 (histogram, 초)
pub const FORWARDER_SEND_DURATION_SECONDS: &str = "relaypost_forwarder_send_duration_seconds";

// ─── Queue 메트릭 ───────────────────────────────────────────────────

/// Queue: 현재 큐 깊이 (gauge, label: queue)
pub const QUEUE_DEPTH: &str = "relaypost_queue_depth";

/// Queue: DLQ 현재 깊이 (gauge, label: queue)
pub const DLQ_DEPTH: &str = "relaypost_dlq_depth";

/// Queue: DLQ로 보낸 메시지 수 (counter, label: queue)
pub const DLQ_MESSAGES_TOTAL: &str = "relaypost_dlq_messages_total";

/// Queue: 재시도 한도 초과로 격리된 포이즌 메시지 수 (counter)
pub const POISON_MESSAGES_TOTAL: &str = "relaypost_poison_messages_total";

/// Queue: 계약 위반으로 폐기된 메시지 수 (counter, labels: module, reason)
///
/// 역할에 관계없이 클레임 루프에서 폐기를 기록합니다.
pub const EVENTS_DISCARDED_TOTAL: &str = "relaypost_events_discarded_total";

// ─── Worker / Janitor 메트릭 ────────────────────────────────────────

/// Janitor: 죽은 워커의 처리 목록에서 복구한 메시지 수 (counter)
pub const JANITOR_RECOVERED_TOTAL: &str = "relaypost_janitor_recovered_total";

/// Janitor: 수행된 청소 횟수 (counter)
pub const JANITOR_RUNS_TOTAL: &str = "relaypost_janitor_runs_total";

/// Worker: 스토어 재접속 시도 수 (counter, label: module)
pub const WORKER_RECONNECTS_TOTAL: &str = "relaypost_worker_reconnects_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "relaypost_daemon_uptime_seconds";

/// Daemon: 등록된 플러그인 수 (gauge)
pub const DAEMON_PLUGINS_REGISTERED: &str = "relaypost_daemon_plugins_registered";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "relaypost_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 이벤트 처리 지연 시간 히스토그램 버킷 (초)
///
/// 100us ~ 10s 범위, 로그 단위 분포
pub const PROCESSING_DURATION_BUCKETS: [f64; 10] = [
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 10.0,
];

/// webhook 호출 소요 시간 히스토그램 버킷 (초)
///
/// 10ms ~ 30s 범위 (외부 HTTP 호출은 타임아웃까지 포함)
pub const SEND_DURATION_BUCKETS: [f64; 10] =
    [0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// `metrics::describe_counter!()`, `describe_gauge!()`, `describe_histogram!()`을
/// 호출하여 Prometheus HELP 텍스트를 설정합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `relaypost-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Router
    describe_counter!(
        ROUTER_EVENTS_TOTAL,
        "Total number of events claimed from the input queue"
    );
    describe_counter!(
        ROUTER_EVENTS_MATCHED_TOTAL,
        "Total number of events matched by a routing rule"
    );
    describe_counter!(
        ROUTER_EVENTS_UNHANDLED_TOTAL,
        "Total number of events that matched no routing rule"
    );
    describe_counter!(
        ROUTER_META_ALERTS_TOTAL,
        "Total number of meta-alerts emitted for unhandled-event bursts"
    );
    describe_histogram!(
        ROUTER_PROCESSING_DURATION_SECONDS,
        "Time to route a single event in seconds"
    );

    // Forwarder
    describe_counter!(
        FORWARDER_SENT_TOTAL,
        "Total number of alerts delivered to the incident manager"
    );
    describe_counter!(
        FORWARDER_FAILURES_TOTAL,
        "Total number of failed webhook deliveries by reason"
    );
    describe_counter!(
        FORWARDER_RATE_LIMITED_TOTAL,
        "Total number of alerts rejected by the fleet-wide rate limiter"
    );
    describe_counter!(
        FORWARDER_BREAKER_OPEN_TOTAL,
        "Total number of delivery attempts skipped while the circuit breaker was open"
    );
    describe_counter!(
        FORWARDER_REQUEUED_TOTAL,
        "Total number of alerts re-enqueued for retry after a transient failure"
    );
    describe_histogram!(
        FORWARDER_SEND_DURATION_SECONDS,
        "Webhook call duration in seconds"
    );

    // Queue
    describe_gauge!(QUEUE_DEPTH, "Current number of messages in a queue");
    describe_gauge!(DLQ_DEPTH, "Current number of messages in a dead-letter queue");
    describe_counter!(
        DLQ_MESSAGES_TOTAL,
        "Total number of messages pushed to a dead-letter queue"
    );
    describe_counter!(
        POISON_MESSAGES_TOTAL,
        "Total number of messages quarantined after exhausting their retry budget"
    );
    describe_counter!(
        EVENTS_DISCARDED_TOTAL,
        "Total number of messages discarded for violating the envelope contract"
    );

    // Worker / Janitor
    describe_counter!(
        JANITOR_RECOVERED_TOTAL,
        "Total number of orphaned messages returned to their source queue"
    );
    describe_counter!(JANITOR_RUNS_TOTAL, "Total number of janitor sweeps executed");
    describe_counter!(
        WORKER_RECONNECTS_TOTAL,
        "Total number of queue store reconnect attempts"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Relaypost daemon uptime in seconds");
    describe_gauge!(
        DAEMON_PLUGINS_REGISTERED,
        "Number of plugins registered in the daemon"
    );
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version/commit labels)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        ROUTER_EVENTS_TOTAL,
        ROUTER_EVENTS_MATCHED_TOTAL,
        ROUTER_EVENTS_UNHANDLED_TOTAL,
        ROUTER_META_ALERTS_TOTAL,
        ROUTER_PROCESSING_DURATION_SECONDS,
        FORWARDER_SENT_TOTAL,
        FORWARDER_FAILURES_TOTAL,
        FORWARDER_RATE_LIMITED_TOTAL,
        FORWARDER_BREAKER_OPEN_TOTAL,
        FORWARDER_REQUEUED_TOTAL,
        FORWARDER_SEND_DURATION_SECONDS,
        QUEUE_DEPTH,
        DLQ_DEPTH,
        DLQ_MESSAGES_TOTAL,
        POISON_MESSAGES_TOTAL,
        EVENTS_DISCARDED_TOTAL,
        JANITOR_RECOVERED_TOTAL,
        JANITOR_RUNS_TOTAL,
        WORKER_RECONNECTS_TOTAL,
        DAEMON_UPTIME_SECONDS,
        DAEMON_PLUGINS_REGISTERED,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_relaypost_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("relaypost_"),
                "Metric '{}' does not start with 'relaypost_' prefix",
                name
            );
        }
    }

    #[test]
    fn all_metrics_have_22_entries() {
        assert_eq!(
            ALL_METRIC_NAMES.len(),
            22,
            "Expected 22 metrics (5 Router + 6 Forwarder + 5 Queue + 3 Worker/Janitor + 3 Daemon)"
        );
    }

    #[test]
    fn describe_all_does_not_panic() {
        // describe_all() should not panic even without a recorder installed
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        let labels = [
            LABEL_QUEUE,
            LABEL_SEVERITY,
            LABEL_MODULE,
            LABEL_RULE,
            LABEL_TEAM,
            LABEL_RESULT,
            LABEL_REASON,
        ];
        for label in &labels {
            assert_eq!(
                label.to_lowercase(),
                *label,
                "Label key '{}' should be lowercase",
                label
            );
        }
    }

    #[test]
    fn processing_duration_buckets_are_sorted() {
        let buckets = PROCESSING_DURATION_BUCKETS;
        for i in 1..buckets.len() {
            assert!(
                buckets[i] > buckets[i - 1],
                "Bucket values must be in ascending order"
            );
        }
    }

    #[test]
    fn send_duration_buckets_are_sorted() {
        let buckets = SEND_DURATION_BUCKETS;
        for i in 1..buckets.len() {
            assert!(
                buckets[i] > buckets[i - 1],
                "Bucket values must be in ascending order"
            );
        }
    }
}
