//! Admission control for incoming requests.
//!
//! Every request is checked against a token bucket keyed by (rule, client IP)
//! before authentication or any handler runs. Sensitive auth endpoints get
//! tight per-path rules; all other traffic shares one coarse global rule that
//! protects aggregate capacity rather than per-route fairness.
//!
//! The bucket table is process-local and rebuildable from nothing: losing a
//! bucket only resets a client's consumption history. Memory is bounded two
//! ways: a per-rule cap on distinct clients (exceeding it clears that rule's
//! whole map before inserting) and a periodic full-table sweep.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::api::ApiError;

/// Hard cap on distinct client entries per rule.
pub const DEFAULT_MAX_CLIENTS_PER_RULE: usize = 10_000;

/// Interval between full bucket-table sweeps.
pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Paths that bypass admission control entirely.
const EXEMPT_PATHS: &[&str] = &["/health", "/docs", "/error"];

/// Prefix under which per-path auth rules apply.
const AUTH_PREFIX: &str = "/api/auth";

static RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
static RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
static RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// A single admission rule: path-match key, bucket capacity, refill window.
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    /// Path prefix this rule applies to (exact match wins over prefix match)
    pub key: String,
    /// Tokens available in a full bucket
    pub capacity: u32,
    /// Time for a full bucket to regenerate
    pub window: Duration,
}

impl RateLimitRule {
    pub fn new(key: &str, capacity: u32, window: Duration) -> Self {
        Self {
            key: key.to_string(),
            capacity,
            window,
        }
    }

    /// Refill rate in tokens per second.
    fn rate(&self) -> f64 {
        self.capacity as f64 / self.window.as_secs_f64()
    }
}

/// Statically configured rule table.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    /// Per-path rules for endpoints under the public auth prefix
    pub auth_rules: Vec<RateLimitRule>,
    /// Fallback for auth-prefix paths no rule matches
    pub default_auth_rule: RateLimitRule,
    /// Single rule for all authenticated traffic, keyed by client IP only
    pub global_rule: RateLimitRule,
    /// Per-rule cap on distinct client entries
    pub max_clients_per_rule: usize,
    /// Interval between full bucket-table sweeps
    pub eviction_interval: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            auth_rules: vec![
                RateLimitRule::new("/api/auth/login", 5, Duration::from_secs(5 * 60)),
                RateLimitRule::new("/api/auth/register", 3, Duration::from_secs(60 * 60)),
                RateLimitRule::new("/api/auth/password-reset", 3, Duration::from_secs(60 * 60)),
                RateLimitRule::new("/api/auth/refresh", 30, Duration::from_secs(60)),
            ],
            default_auth_rule: RateLimitRule::new(AUTH_PREFIX, 10, Duration::from_secs(60)),
            global_rule: RateLimitRule::new("", 100, Duration::from_secs(60)),
            max_clients_per_rule: DEFAULT_MAX_CLIENTS_PER_RULE,
            eviction_interval: DEFAULT_EVICTION_INTERVAL,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Admitted {
        limit: u32,
        remaining: u32,
        reset_secs: u64,
    },
    Rejected {
        limit: u32,
        reset_secs: u64,
        retry_after_secs: u64,
    },
}

/// One client's token bucket. Refilled lazily on each consume.
#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity as f64,
            last_refill: now,
        }
    }

    /// Refill based on elapsed time, then try to deduct one token.
    fn consume(&mut self, rule: &RateLimitRule, now: Instant) -> Decision {
        let capacity = rule.capacity as f64;
        let rate = rule.rate();

        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * rate).min(capacity);
        self.last_refill = now;

        let reset_secs = ((capacity - self.tokens).max(0.0) / rate).ceil() as u64;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Decision::Admitted {
                limit: rule.capacity,
                remaining: self.tokens as u32,
                reset_secs: ((capacity - self.tokens) / rate).ceil() as u64,
            }
        } else {
            let retry_after_secs = (((1.0 - self.tokens) / rate).ceil() as u64).max(1);
            Decision::Rejected {
                limit: rule.capacity,
                reset_secs,
                retry_after_secs,
            }
        }
    }
}

/// A rule plus its per-client bucket map. Each slot has its own lock, so
/// contention is striped across rules instead of one table-wide mutex.
struct RuleSlot {
    rule: RateLimitRule,
    clients: Mutex<HashMap<String, Bucket>>,
}

impl RuleSlot {
    fn new(rule: RateLimitRule) -> Self {
        Self {
            rule,
            clients: Mutex::new(HashMap::new()),
        }
    }
}

/// The admission controller. Owns the entire bucket table; no other
/// component reads or mutates it.
pub struct AdmissionControl {
    auth_slots: Vec<RuleSlot>,
    default_auth: RuleSlot,
    global: RuleSlot,
    max_clients_per_rule: usize,
}

impl AdmissionControl {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            auth_slots: settings
                .auth_rules
                .iter()
                .cloned()
                .map(RuleSlot::new)
                .collect(),
            default_auth: RuleSlot::new(settings.default_auth_rule.clone()),
            global: RuleSlot::new(settings.global_rule.clone()),
            max_clients_per_rule: settings.max_clients_per_rule,
        }
    }

    /// Whether a path bypasses admission control.
    pub fn is_exempt(path: &str) -> bool {
        EXEMPT_PATHS.contains(&path)
    }

    /// Map a request path to its rule. Auth-prefix paths get the rule whose
    /// key is the longest prefix of the path (an exact match is always the
    /// longest), falling back to the conservative default auth rule.
    /// Everything else shares the global rule.
    fn resolve(&self, path: &str) -> &RuleSlot {
        if !path.starts_with(AUTH_PREFIX) {
            return &self.global;
        }

        let mut best: Option<&RuleSlot> = None;
        for slot in &self.auth_slots {
            if path == slot.rule.key {
                return slot;
            }
            if path.starts_with(slot.rule.key.as_str())
                && best.is_none_or(|b| slot.rule.key.len() > b.rule.key.len())
            {
                best = Some(slot);
            }
        }
        best.unwrap_or(&self.default_auth)
    }

    /// Check whether a request from `client` to `path` is admitted.
    pub fn check(&self, path: &str, client: &str) -> Decision {
        self.check_at(path, client, Instant::now())
    }

    fn check_at(&self, path: &str, client: &str, now: Instant) -> Decision {
        let slot = self.resolve(path);
        let mut clients = slot
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Hard memory ceiling: clearing the whole map is a coarse O(1)
        // decision that resets every client's history together.
        if !clients.contains_key(client) && clients.len() >= self.max_clients_per_rule {
            tracing::warn!(
                rule = %slot.rule.key,
                cap = self.max_clients_per_rule,
                "Rate limit client table full, clearing"
            );
            clients.clear();
        }

        clients
            .entry(client.to_string())
            .or_insert_with(|| Bucket::new(slot.rule.capacity, now))
            .consume(&slot.rule, now)
    }

    /// Clear every rule's client map. Run on a fixed schedule, independent of
    /// the per-rule cap.
    pub fn sweep(&self) {
        for slot in self
            .auth_slots
            .iter()
            .chain([&self.default_auth, &self.global])
        {
            slot.clients
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clear();
        }
    }
}

fn set_rate_limit_headers(response: &mut Response, limit: u32, remaining: u32, reset_secs: u64) {
    let headers = response.headers_mut();
    headers.insert(RATELIMIT_LIMIT.clone(), HeaderValue::from(limit));
    headers.insert(RATELIMIT_REMAINING.clone(), HeaderValue::from(remaining));
    headers.insert(RATELIMIT_RESET.clone(), HeaderValue::from(reset_secs));
}

/// Middleware that gates every request through the bucket table.
/// Runs before authentication; a rejected request never reaches it.
pub async fn admission_gate(
    State(admission): State<Arc<AdmissionControl>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if AdmissionControl::is_exempt(&path) {
        return next.run(request).await;
    }

    // The immediate remote address only. Forwarded-for headers are
    // attacker-controlled and never trusted as the client key.
    let Some(client) = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
    else {
        return (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response();
    };

    match admission.check(&path, &client) {
        Decision::Admitted {
            limit,
            remaining,
            reset_secs,
        } => {
            let mut response = next.run(request).await;
            set_rate_limit_headers(&mut response, limit, remaining, reset_secs);
            response
        }
        Decision::Rejected {
            limit,
            reset_secs,
            retry_after_secs,
        } => {
            let mut response =
                ApiError::too_many_requests("Too many requests. Please try again later.")
                    .into_response();
            set_rate_limit_headers(&mut response, limit, 0, reset_secs);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            response
        }
    }
}

/// Spawn a background task that clears the bucket table on a fixed interval.
/// Isolated from request handling; a slow sweep never blocks a request.
pub fn spawn_eviction_sweeper(
    admission: Arc<AdmissionControl>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            admission.sweep();
            tracing::debug!("Rate limit bucket table cleared");
        }
    })
}
