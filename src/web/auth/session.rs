//! In-memory session cache fronting the `user_sessions` table.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::data::models::User;
use crate::data::{sessions, users};

/// Session tokens are 32 characters from nanoid's URL-safe alphabet.
pub const TOKEN_LEN: usize = 32;

/// Refresh `last_active_at` in the database at most this often per session.
const TOUCH_INTERVAL: chrono::TimeDelta = chrono::TimeDelta::minutes(5);

#[derive(Debug, Clone)]
struct CachedSession {
    user: User,
    expires_at: DateTime<Utc>,
    touched_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionCache {
    pool: PgPool,
    ttl: Duration,
    sessions: Arc<DashMap<String, CachedSession>>,
}

impl SessionCache {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self {
            pool,
            ttl,
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Open a new session for `user` and return its token.
    pub async fn create(&self, user: &User) -> Result<String> {
        let token = nanoid::nanoid!(TOKEN_LEN);
        let ttl = chrono::TimeDelta::from_std(self.ttl)?;
        let session = sessions::create_session(&self.pool, &token, user.id, Utc::now() + ttl).await?;
        self.sessions.insert(
            token.clone(),
            CachedSession {
                user: user.clone(),
                expires_at: session.expires_at,
                touched_at: session.last_active_at,
            },
        );
        debug!(user_id = user.id, "session created");
        Ok(token)
    }

    /// Resolve a token to its active user.
    ///
    /// Expired sessions and deactivated accounts resolve to `None`.
    pub async fn get_user(&self, token: &str) -> Result<Option<User>> {
        let now = Utc::now();
        let cached = self.sessions.get(token).map(|entry| entry.value().clone());
        if let Some(entry) = cached {
            if entry.expires_at <= now {
                self.sessions.remove(token);
                return Ok(None);
            }
            if now - entry.touched_at > TOUCH_INTERVAL {
                sessions::touch_session(&self.pool, token).await?;
                if let Some(mut e) = self.sessions.get_mut(token) {
                    e.touched_at = now;
                }
            }
            return Ok(Some(entry.user));
        }

        let Some(session) = sessions::get_active_session(&self.pool, token).await? else {
            return Ok(None);
        };
        let Some(user) = users::get_user(&self.pool, session.user_id).await? else {
            return Ok(None);
        };
        if !user.is_active {
            return Ok(None);
        }

        sessions::touch_session(&self.pool, token).await?;
        self.sessions.insert(
            token.to_string(),
            CachedSession {
                user: user.clone(),
                expires_at: session.expires_at,
                touched_at: now,
            },
        );
        Ok(Some(user))
    }

    /// End a session (logout).
    pub async fn remove(&self, token: &str) -> Result<()> {
        self.sessions.remove(token);
        sessions::delete_session(&self.pool, token).await
    }

    /// Forget cached sessions of a user so the next request reloads the account.
    pub fn evict_user(&self, user_id: i32) {
        self.sessions.retain(|_, s| s.user.id != user_id);
    }

    /// Replace the cached copy of a user after a profile change.
    pub fn refresh_user(&self, user: &User) {
        for mut entry in self.sessions.iter_mut() {
            if entry.user.id == user.id {
                entry.user = user.clone();
            }
        }
    }

    pub fn cached_len(&self) -> usize {
        self.sessions.len()
    }

    /// Drop expired sessions from memory and the database.
    pub async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        self.sessions.retain(|_, s| s.expires_at > now);
        sessions::cleanup_expired(&self.pool).await
    }

    /// Periodically purge expired sessions until the process exits.
    pub fn spawn_cleanup(&self, interval: Duration) {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                match cache.purge_expired().await {
                    Ok(0) => {}
                    Ok(n) => info!(purged = n, "expired sessions purged"),
                    Err(e) => warn!(error = ?e, "failed to purge expired sessions"),
                }
            }
        });
    }

    /// Register a fixed token for a user without touching the database (debug builds only).
    #[cfg(debug_assertions)]
    pub fn inject_dev_session(&self, token: &str, user: User) {
        let now = Utc::now();
        self.sessions.insert(
            token.to_string(),
            CachedSession {
                user,
                expires_at: now + chrono::TimeDelta::days(365),
                touched_at: now + chrono::TimeDelta::days(365),
            },
        );
    }
}
