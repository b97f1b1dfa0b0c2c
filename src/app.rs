use crate::cli::Command;
use crate::config::Config;
use crate::crawler::ScraperRegistry;
use crate::data::{aggregates, broadcasts, users};
use crate::state::AppState;
use crate::utils::fmt_duration;
use crate::web::auth::password::hash_password;
use crate::web::create_router;
use crate::web::middleware::rate_limit::RateLimitState;
use anyhow::{Context, bail};
use sqlx::ConnectOptions;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tracing::{error, info, warn};

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);
const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);
const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    db_pool: sqlx::PgPool,
    app_state: AppState,
}

impl App {
    /// Connect to the database, apply migrations and build shared state.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let connect_options = sqlx::postgres::PgConnectOptions::from_str(&config.database_url)
            .context("Failed to parse database URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let slow_threshold = Duration::from_millis(500);
        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(8)
            .acquire_slow_threshold(slow_threshold)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        info!(
            min_connections = 0,
            max_connections = 8,
            acquire_timeout = "4s",
            idle_timeout = "2m",
            max_lifetime = "30m",
            acquire_slow_threshold = fmt_duration(slow_threshold),
            "database pool established"
        );

        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed successfully");

        let http = reqwest::Client::builder()
            .user_agent(concat!("born2eat/", env!("CARGO_PKG_VERSION")))
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        let known_broadcasts = broadcasts::list_broadcasts(&db_pool)
            .await
            .context("Failed to load broadcasts")?;
        let registry = ScraperRegistry::from_broadcasts(&http, &known_broadcasts);
        info!(scrapers = ?registry.codes(), "scraper registry built");

        let app_state = AppState::new(config.clone(), db_pool.clone(), http, registry);

        // Seed the initial admin user if configured
        if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
            let email = email.trim().to_lowercase();
            let password = password.clone();
            let hash = tokio::task::spawn_blocking(move || hash_password(&password))
                .await
                .context("Password hashing task failed")??;
            let user = users::ensure_seed_admin(&db_pool, &email, &hash)
                .await
                .context("Failed to seed admin user")?;
            info!(user_id = user.id, email = %user.email, "Seed admin ensured");

            #[cfg(debug_assertions)]
            {
                app_state.session_cache.inject_dev_session("dev-admin", user);
                info!("Dev auth bypass active -- use: Cookie: session=dev-admin");
            }
        }

        Ok(App {
            config,
            db_pool,
            app_state,
        })
    }

    /// Dispatch a CLI command. No command means `serve`.
    pub async fn run(self, command: Option<Command>) -> Result<(), anyhow::Error> {
        match command.unwrap_or(Command::Serve) {
            Command::Serve => self.serve().await,
            Command::Crawl {
                broadcast,
                start,
                end,
            } => self.crawl(&broadcast, start, end).await,
            Command::KakaoSync { limit } => self.kakao_sync(limit).await,
            Command::RecomputeAggregates => self.recompute_aggregates().await,
        }
    }

    /// Serve HTTP until SIGINT/SIGTERM, then drain within `SHUTDOWN_TIMEOUT`.
    async fn serve(self) -> Result<(), anyhow::Error> {
        let rate_limit = Arc::new(RateLimitState::new());
        {
            let rate_limit = rate_limit.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(RATE_LIMIT_PRUNE_INTERVAL);
                loop {
                    ticker.tick().await;
                    rate_limit.retain_recent();
                }
            });
        }
        self.app_state.session_cache.spawn_cleanup(SESSION_CLEANUP_INTERVAL);

        tokio::fs::create_dir_all(&self.config.upload_dir)
            .await
            .with_context(|| format!("Failed to create upload dir {}", self.config.upload_dir.display()))?;

        let router = create_router(self.app_state.clone(), rate_limit);
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        info!(%addr, "web server listening");

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
        let mut server = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
        });

        tokio::select! {
            result = &mut server => {
                return match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e).context("Web server failed"),
                    Err(e) => Err(e).context("Web server task panicked"),
                };
            }
            _ = shutdown_signal() => {}
        }

        let _ = shutdown_tx.send(true);
        let started = Instant::now();
        match tokio::time::timeout(self.config.shutdown_timeout, server).await {
            Ok(Ok(Ok(()))) => {
                info!(elapsed = fmt_duration(started.elapsed()), "web server stopped gracefully");
            }
            Ok(Ok(Err(e))) => error!(error = %e, "web server failed during shutdown"),
            Ok(Err(e)) => error!(error = %e, "web server task panicked during shutdown"),
            Err(_) => warn!(
                timeout = fmt_duration(self.config.shutdown_timeout),
                "graceful shutdown timed out, dropping open connections"
            ),
        }
        self.db_pool.close().await;
        Ok(())
    }

    async fn crawl(&self, broadcast: &str, start: u32, end: Option<u32>) -> Result<(), anyhow::Error> {
        let start = i32::try_from(start).context("start episode out of range")?;
        let end = end
            .map(i32::try_from)
            .transpose()
            .context("end episode out of range")?;

        let report = self
            .app_state
            .crawler
            .crawl(broadcast, start, end)
            .await
            .context("Crawl failed")?;
        info!(
            broadcast = %report.broadcast_code,
            start = report.start,
            end = report.end,
            success = report.success,
            skipped = report.skipped,
            failed = report.failed.len(),
            "crawl complete"
        );
        for failure in &report.failed {
            warn!(episode = failure.episode, error = %failure.error, "episode failed");
        }
        Ok(())
    }

    async fn kakao_sync(&self, limit: i64) -> Result<(), anyhow::Error> {
        if !self.app_state.kakao.is_configured() {
            bail!("KAKAO_REST_API_KEY is not set");
        }
        let report = crate::kakao::sync_restaurants(&self.db_pool, &self.app_state.kakao, limit.max(1))
            .await
            .context("Kakao sync failed")?;
        info!(
            processed = report.processed,
            matched = report.matched,
            unmatched = report.unmatched,
            failed = report.failed,
            "Kakao sync complete"
        );
        Ok(())
    }

    async fn recompute_aggregates(&self) -> Result<(), anyhow::Error> {
        let started = Instant::now();
        let report = aggregates::recompute_all(&self.db_pool)
            .await
            .context("Aggregate recompute failed")?;
        info!(
            restaurants_fixed = report.restaurants_fixed,
            reviews_fixed = report.reviews_fixed,
            duration = fmt_duration(started.elapsed()),
            "aggregates recomputed"
        );
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
