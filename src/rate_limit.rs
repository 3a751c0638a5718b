//! Client-side tracking of the unauthenticated quota and classification of
//! throttling responses.
//!
//! The local counter is an early warning only. The server is authoritative:
//! several processes may share an IP address, and clocks drift, so a request
//! the guard allows can still come back throttled.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;

/// Requests allowed per window without a key pair.
pub const UNAUTHENTICATED_DAILY_LIMIT: u32 = 50;

/// Length of the fixed quota window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

const THROTTLE_DETAIL_PREFIX: &str = "Request was throttled";
const AVAILABLE_IN_MARKER: &str = "available in ";

/// Quota bookkeeping for one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitState {
    pub window_start: DateTime<Utc>,
    pub calls_in_window: u32,
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitState {
    fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        // A clock that moved backwards counts as no time elapsed.
        (now - self.window_start).to_std().unwrap_or(Duration::ZERO)
    }

    fn has_rolled_over(&self, now: DateTime<Utc>) -> bool {
        self.elapsed(now) >= self.window
    }

    fn roll_if_expired(&mut self, now: DateTime<Utc>) {
        if self.has_rolled_over(now) {
            self.window_start = now;
            self.calls_in_window = 0;
        }
    }

    fn preflight(&self, authenticated: bool, now: DateTime<Utc>) -> Preflight {
        if authenticated || self.has_rolled_over(now) || self.calls_in_window < self.limit {
            return Preflight::Allowed;
        }
        Preflight::WouldExceed {
            calls: self.calls_in_window,
            limit: self.limit,
            resets_in: self.window.saturating_sub(self.elapsed(now)),
        }
    }
}

/// Outcome of the local pre-flight check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preflight {
    Allowed,
    WouldExceed { calls: u32, limit: u32, resets_in: Duration },
}

/// How a server response should be treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseClass {
    Ok,
    RateLimited {
        retry_after: Option<Duration>,
        detail: String,
    },
    OtherError,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

/// Tracks unauthenticated calls against a fixed wall-clock window.
///
/// All state lives behind one mutex so check-and-record is a single critical
/// section when a client is shared between tasks.
#[derive(Debug)]
pub struct RateLimitGuard {
    state: Mutex<RateLimitState>,
}

impl Default for RateLimitGuard {
    fn default() -> Self {
        Self::new(UNAUTHENTICATED_DAILY_LIMIT, DEFAULT_WINDOW)
    }
}

impl RateLimitGuard {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::starting_at(limit, window, Utc::now())
    }

    pub fn starting_at(limit: u32, window: Duration, window_start: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(RateLimitState {
                window_start,
                calls_in_window: 0,
                limit,
                window,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RateLimitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of the current bookkeeping.
    pub fn snapshot(&self) -> RateLimitState {
        self.lock().clone()
    }

    /// Unauthenticated calls left in the current window.
    pub fn remaining(&self) -> u32 {
        self.remaining_at(Utc::now())
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> u32 {
        let state = self.lock();
        if state.has_rolled_over(now) {
            state.limit
        } else {
            state.limit.saturating_sub(state.calls_in_window)
        }
    }

    pub fn record_call(&self, authenticated: bool) {
        self.record_call_at(authenticated, Utc::now());
    }

    /// Counts an issued call. Authenticated calls only roll the window.
    pub fn record_call_at(&self, authenticated: bool, now: DateTime<Utc>) {
        let mut state = self.lock();
        state.roll_if_expired(now);
        if !authenticated {
            state.calls_in_window = state.calls_in_window.saturating_add(1);
        }
    }

    pub fn check_before_call(&self, authenticated: bool) -> Preflight {
        self.check_before_call_at(authenticated, Utc::now())
    }

    /// Advisory check; does not change the count.
    pub fn check_before_call_at(&self, authenticated: bool, now: DateTime<Utc>) -> Preflight {
        self.lock().preflight(authenticated, now)
    }

    pub fn try_acquire(&self, authenticated: bool) -> Preflight {
        self.try_acquire_at(authenticated, Utc::now())
    }

    /// Checks and, when allowed, records the call under one lock.
    pub fn try_acquire_at(&self, authenticated: bool, now: DateTime<Utc>) -> Preflight {
        let mut state = self.lock();
        let verdict = state.preflight(authenticated, now);
        match verdict {
            Preflight::Allowed => {
                state.roll_if_expired(now);
                if !authenticated {
                    state.calls_in_window = state.calls_in_window.saturating_add(1);
                    if state.calls_in_window == state.limit {
                        info!(
                            target: "bitnodes::audit",
                            limit = state.limit;
                            "Unauthenticated quota used up for this window"
                        );
                    }
                }
            },
            Preflight::WouldExceed { calls, limit, .. } => {
                warn!(target: "bitnodes::audit", calls = calls, limit = limit; "Local rate limit reached");
            },
        }
        verdict
    }

    /// Classifies a server response.
    ///
    /// Throttling is recognised from HTTP 429 or from a body whose `detail`
    /// reads "Request was throttled...". The wait hint comes from the
    /// `Retry-After` header, else from "Expected available in N seconds" in
    /// the body.
    pub fn classify_response(status: StatusCode, headers: &HeaderMap, body: &str) -> ResponseClass {
        let detail = serde_json::from_str::<ErrorBody>(body).ok().and_then(|b| b.detail);
        let throttled_body = detail
            .as_deref()
            .is_some_and(|d| d.starts_with(THROTTLE_DETAIL_PREFIX));

        if status == StatusCode::TOO_MANY_REQUESTS || (!status.is_success() && throttled_body) {
            let retry_after = retry_after_header(headers).or_else(|| detail.as_deref().and_then(available_in));
            return ResponseClass::RateLimited {
                retry_after,
                detail: detail.unwrap_or_else(|| body.trim().to_string()),
            };
        }

        if status.is_success() {
            ResponseClass::Ok
        } else {
            ResponseClass::OtherError
        }
    }
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn available_in(detail: &str) -> Option<Duration> {
    let start = detail.find(AVAILABLE_IN_MARKER)? + AVAILABLE_IN_MARKER.len();
    let digits: String = detail[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_would_exceed_exactly_at_limit() {
        let guard = RateLimitGuard::starting_at(3, DEFAULT_WINDOW, t0());
        let now = t0() + chrono::Duration::minutes(5);

        for _ in 0..2 {
            guard.record_call_at(false, now);
            assert_eq!(guard.check_before_call_at(false, now), Preflight::Allowed);
        }
        guard.record_call_at(false, now);

        match guard.check_before_call_at(false, now) {
            Preflight::WouldExceed { calls, limit, resets_in } => {
                assert_eq!(calls, 3);
                assert_eq!(limit, 3);
                assert_eq!(resets_in, DEFAULT_WINDOW - Duration::from_secs(5 * 60));
            },
            other => panic!("expected WouldExceed, got {:?}", other),
        }
        assert_eq!(guard.remaining_at(now), 0);
    }

    #[test]
    fn test_window_rollover_allows_again() {
        let guard = RateLimitGuard::starting_at(2, DEFAULT_WINDOW, t0());
        guard.record_call_at(false, t0());
        guard.record_call_at(false, t0());
        assert!(matches!(guard.check_before_call_at(false, t0()), Preflight::WouldExceed { .. }));

        let later = t0() + chrono::Duration::hours(24);
        assert_eq!(guard.check_before_call_at(false, later), Preflight::Allowed);
        assert_eq!(guard.remaining_at(later), 2);

        guard.record_call_at(false, later);
        let state = guard.snapshot();
        assert_eq!(state.window_start, later);
        assert_eq!(state.calls_in_window, 1);
    }

    #[test]
    fn test_authenticated_calls_are_not_counted() {
        let guard = RateLimitGuard::starting_at(1, DEFAULT_WINDOW, t0());
        guard.record_call_at(false, t0());

        assert_eq!(guard.check_before_call_at(true, t0()), Preflight::Allowed);
        assert_eq!(guard.try_acquire_at(true, t0()), Preflight::Allowed);
        guard.record_call_at(true, t0());

        assert_eq!(guard.snapshot().calls_in_window, 1);
    }

    #[test]
    fn test_try_acquire_checks_and_records() {
        let guard = RateLimitGuard::starting_at(2, DEFAULT_WINDOW, t0());

        assert_eq!(guard.try_acquire_at(false, t0()), Preflight::Allowed);
        assert_eq!(guard.try_acquire_at(false, t0()), Preflight::Allowed);
        assert!(matches!(guard.try_acquire_at(false, t0()), Preflight::WouldExceed { .. }));
        // Refused attempts do not count.
        assert_eq!(guard.snapshot().calls_in_window, 2);
    }

    #[test]
    fn test_concurrent_callers_never_overshoot() {
        let guard = Arc::new(RateLimitGuard::new(50, DEFAULT_WINDOW));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| guard.try_acquire(false) == Preflight::Allowed)
                        .count()
                })
            })
            .collect();
        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(allowed, 50);
        assert_eq!(guard.snapshot().calls_in_window, 50);
        assert_eq!(guard.remaining(), 0);
    }

    #[test]
    fn test_clock_moving_backwards_keeps_window() {
        let guard = RateLimitGuard::starting_at(1, DEFAULT_WINDOW, t0());
        guard.record_call_at(false, t0());

        let earlier = t0() - chrono::Duration::hours(1);
        match guard.check_before_call_at(false, earlier) {
            Preflight::WouldExceed { resets_in, .. } => assert_eq!(resets_in, DEFAULT_WINDOW),
            other => panic!("expected WouldExceed, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_status_429_with_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "3600".parse().unwrap());

        let class = RateLimitGuard::classify_response(
            StatusCode::TOO_MANY_REQUESTS,
            &headers,
            r#"{"detail":"Request was throttled. Expected available in 86400 seconds."}"#,
        );

        assert_eq!(
            class,
            ResponseClass::RateLimited {
                retry_after: Some(Duration::from_secs(3600)),
                detail: "Request was throttled. Expected available in 86400 seconds.".to_string(),
            }
        );
    }

    #[test]
    fn test_classify_hint_from_body() {
        let class = RateLimitGuard::classify_response(
            StatusCode::TOO_MANY_REQUESTS,
            &HeaderMap::new(),
            r#"{"detail":"Request was throttled. Expected available in 512 seconds."}"#,
        );
        assert!(matches!(
            class,
            ResponseClass::RateLimited { retry_after: Some(d), .. } if d == Duration::from_secs(512)
        ));

        let no_hint = RateLimitGuard::classify_response(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), "slow down");
        assert_eq!(
            no_hint,
            ResponseClass::RateLimited {
                retry_after: None,
                detail: "slow down".to_string(),
            }
        );
    }

    #[test]
    fn test_classify_throttle_body_on_other_status() {
        let class = RateLimitGuard::classify_response(
            StatusCode::FORBIDDEN,
            &HeaderMap::new(),
            r#"{"detail":"Request was throttled."}"#,
        );
        assert!(matches!(class, ResponseClass::RateLimited { retry_after: None, .. }));
    }

    #[test]
    fn test_classify_success_and_errors() {
        let headers = HeaderMap::new();
        assert_eq!(
            RateLimitGuard::classify_response(StatusCode::OK, &headers, r#"{"count":0}"#),
            ResponseClass::Ok
        );
        assert_eq!(
            RateLimitGuard::classify_response(StatusCode::NOT_FOUND, &headers, r#"{"detail":"Not found."}"#),
            ResponseClass::OtherError
        );
        assert_eq!(
            RateLimitGuard::classify_response(StatusCode::INTERNAL_SERVER_ERROR, &headers, "oops"),
            ResponseClass::OtherError
        );
    }
}
