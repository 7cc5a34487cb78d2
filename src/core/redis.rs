use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{cmd, Client, RedisError};
use tokio::sync::RwLock;

#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

/// Fixed-window limit applied per subject within one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RateLimitPolicy {
    pub(crate) scope: &'static str,
    pub(crate) limit: u64,
    pub(crate) window_seconds: u64,
}

impl RateLimitPolicy {
    pub(crate) const LOGIN: Self = Self { scope: "login", limit: 10, window_seconds: 60 };
    pub(crate) const TOKEN: Self = Self { scope: "token", limit: 10, window_seconds: 60 };
    /// Each generation is a paid model call.
    pub(crate) const EXAM_GENERATION: Self =
        Self { scope: "exam-generation", limit: 5, window_seconds: 300 };

    /// Subjects are case-folded so `Alice` and `alice` share a window.
    pub(crate) fn key(&self, subject: &str) -> String {
        format!("rl:{}:{}", self.scope, subject.trim().to_lowercase())
    }
}

const RATE_LIMIT_SCRIPT: &str = r#"
    local current = redis.call("INCR", KEYS[1])
    if current == 1 then
        redis.call("EXPIRE", KEYS[1], ARGV[1])
    end
    return current
"#;

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self { url, manager: Arc::new(RwLock::new(None)) }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        *guard = Some(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        let mut guard = self.manager.write().await;
        *guard = None;
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut manager).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    /// Counts one hit for `subject` under `policy`. Returns `true` while the
    /// subject is within its limit; always allows when Redis is not connected.
    pub(crate) async fn rate_limit(
        &self,
        policy: RateLimitPolicy,
        subject: &str,
    ) -> Result<bool, RedisError> {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return Ok(true);
        };

        let current: i64 = redis::Script::new(RATE_LIMIT_SCRIPT)
            .key(policy.key(subject))
            .arg(policy.window_seconds as i64)
            .invoke_async(&mut manager)
            .await?;

        Ok(current <= policy.limit as i64)
    }

    /// Like [`RedisHandle::rate_limit`], but a Redis failure is logged and
    /// treated as allowed.
    pub(crate) async fn allow(&self, policy: RateLimitPolicy, subject: &str) -> bool {
        match self.rate_limit(policy, subject).await {
            Ok(allowed) => allowed,
            Err(err) => {
                tracing::warn!(error = %err, scope = policy.scope, "Rate limit check failed");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RateLimitPolicy, RedisHandle, RedisHealth};

    #[tokio::test]
    async fn disconnected_handle_allows_and_reports_disconnected() {
        let redis = RedisHandle::new("redis://127.0.0.1:1/0".to_string());

        for _ in 0..20 {
            assert!(redis.rate_limit(RateLimitPolicy::LOGIN, "someone").await.expect("rate limit"));
        }
        assert!(redis.allow(RateLimitPolicy::EXAM_GENERATION, "author-1").await);
        assert!(matches!(redis.health().await, RedisHealth::Disconnected));
    }

    #[test]
    fn policy_keys_are_scoped_and_case_folded() {
        assert_eq!(RateLimitPolicy::LOGIN.key("  Dr.House "), "rl:login:dr.house");
        assert_ne!(RateLimitPolicy::LOGIN.key("a"), RateLimitPolicy::TOKEN.key("a"));
    }
}
