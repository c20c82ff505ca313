use anyhow::anyhow;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use petlink::app::matcher::{MatchDispatcher, Matcher};
use petlink::config::matching::MatchDispatch;
use petlink::config::AppConfig;
use petlink::infra::{cache::RedisCache, db::Db, queue::QueueClient, storage::ObjectStorage};
use petlink::jobs::{match_processor, reconciler};
use petlink::{http, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.log_format);

    let db = Db::connect(&config).await?;
    let cache = RedisCache::connect(&config.redis_url).await?;
    let matcher = Matcher::new(db.clone(), config.matching);

    match config.app_mode.as_str() {
        "api" => {
            let storage = ObjectStorage::new(&config).await?;
            let dispatcher = match config.matching.dispatch {
                MatchDispatch::Queue => MatchDispatcher::Queue(QueueClient::new(&config).await?),
                MatchDispatch::Inline => {
                    // No worker runs alongside inline dispatch, so the API sweeps too.
                    tokio::spawn(reconciler::run(
                        matcher.clone(),
                        cache.clone(),
                        config.matching.reconcile_interval_seconds,
                    ));
                    MatchDispatcher::Inline(matcher.clone())
                }
            };

            let state = AppState {
                db,
                cache,
                storage,
                matcher,
                dispatcher,
                upload_url_ttl_seconds: config.upload_url_ttl_seconds,
                upload_max_bytes: config.upload_max_bytes,
                admin_token: config.admin_token.clone(),
                paseto_access_key: config.paseto_access_key,
                access_ttl_minutes: config.access_ttl_minutes,
                s3_public_endpoint: config.s3_public_endpoint.clone(),
            };

            let app: Router = http::router(state).layer(TraceLayer::new_for_http());
            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!("listening on {}", config.http_addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        "worker" => {
            tracing::info!(dispatch = ?config.matching.dispatch, "starting worker mode");
            let interval = config.matching.reconcile_interval_seconds;
            match config.matching.dispatch {
                MatchDispatch::Queue => {
                    let queue = QueueClient::new(&config).await?;
                    tokio::select! {
                        result = match_processor::run(matcher.clone(), queue) => {
                            result?;
                        }
                        result = reconciler::run(matcher, cache, interval) => {
                            result?;
                        }
                        _ = shutdown_signal() => {}
                    }
                }
                MatchDispatch::Inline => {
                    tokio::select! {
                        result = reconciler::run(matcher, cache, interval) => {
                            result?;
                        }
                        _ = shutdown_signal() => {}
                    }
                }
            }
        }
        "reconcile" => {
            let summary = reconciler::sweep(&matcher).await?;
            tracing::info!(
                scanned = summary.reports_scanned,
                failed = summary.passes_failed,
                inserted = summary.inserted,
                updated = summary.updated,
                dismissed = summary.dismissed + summary.orphaned_dismissed as usize,
                "one-shot reconciliation finished"
            );
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = log_format == "json";

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
