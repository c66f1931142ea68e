//! 지수 백오프 계산
//!
//! 포워더 재전송과 스토어 재접속이 같은 공식을 사용합니다:
//! `min(base * 2^attempt, cap)`. 오버플로는 상한으로 포화됩니다.

use std::time::Duration;

/// `attempt`번째 재시도 전 대기 시간을 계산합니다.
///
/// `attempt`는 0부터 시작합니다 (첫 재시도 전 대기 = base).
pub fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let Some(factor) = 2u32.checked_pow(attempt) else {
        return cap;
    };
    match base.checked_mul(factor) {
        Some(delay) => delay.min(cap),
        None => cap,
    }
}
