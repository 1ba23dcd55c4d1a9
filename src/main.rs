use axum::http::{HeaderValue, Method};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use room_backend::config::{self, MailerConfig, Settings};
use room_backend::middleware::{
    overload::{OverloadGuard, ProcHealthSampler},
    request_id_middleware, RouteLimiters,
};
use room_backend::services::{
    AccessLogService, BulkService, DownloadService, IdentityService, InviteService,
    LifecycleService, Mailer, NoopMailer, PresenceService, QuotaService, ReaperService,
    RoomService, S3Service, Scheduler, SmtpMailer, UploadService,
};
use room_backend::{routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "room_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::new()?;

    tracing::info!("Starting room coordination backend...");

    let db = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .min_connections(settings.database.min_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;

    tracing::info!("Database connection established");

    config::database::init_tables(&db)
        .await
        .expect("Failed to initialize database tables");

    let s3 = Arc::new(S3Service::from_config(&settings.s3).await?);
    tracing::info!("Object store client initialized");

    let scheduler = Scheduler::new();
    let lifecycle = Arc::new(LifecycleService::new(
        db.clone(),
        s3.clone(),
        scheduler,
        settings.capacity.clone(),
    ));

    let identity = Arc::new(IdentityService::new(db.clone()));
    let presence = Arc::new(PresenceService::new(db.clone(), settings.capacity.clone()));
    let room = Arc::new(RoomService::new(
        db.clone(),
        s3.clone(),
        QuotaService::new(db.clone()),
        settings.capacity.unlimited_threshold,
    ));
    let upload = Arc::new(UploadService::new(
        db.clone(),
        s3.clone(),
        QuotaService::new(db.clone()),
    ));
    let download = Arc::new(DownloadService::new(
        db.clone(),
        s3.clone(),
        identity.clone(),
        lifecycle.clone(),
        settings.capacity.clone(),
    ));
    let bulk = Arc::new(BulkService::new(db.clone(), s3.clone()));
    let access_log = Arc::new(AccessLogService::with_null_geo(db.clone()));
    let reaper = Arc::new(ReaperService::new(
        s3.clone(),
        lifecycle.clone(),
        settings.multipart_stale_after,
    ));

    let limiters = Arc::new(RouteLimiters::from_config(&settings.rate_limit));
    limiters.clone().spawn_cleanup_tasks();

    let mailer: Arc<dyn Mailer> = if settings.mailer.smtp_username.is_empty() {
        tracing::warn!("SMTP credentials not configured, invites will be logged but not sent");
        Arc::new(NoopMailer)
    } else {
        Arc::new(SmtpMailer::from_config(&settings.mailer)?)
    };

    let invite = Arc::new(InviteService::new(
        db.clone(),
        mailer,
        limiters.clone(),
        &settings.mailer,
    ));

    let overload = Arc::new(OverloadGuard::new(
        Box::new(ProcHealthSampler::new()),
        settings.overload.clone(),
    ));
    spawn_overload_sampler(overload.clone(), settings.overload.sample_interval);
    spawn_reaper_loop(reaper.clone(), settings.reaper_interval);

    let mailer_config = settings.mailer.clone();
    let settings = Arc::new(settings);

    let state = AppState {
        db: db.clone(),
        settings: settings.clone(),
        s3,
        identity,
        presence,
        room,
        upload,
        download,
        bulk,
        lifecycle: lifecycle.clone(),
        invite,
        access_log,
        reaper,
        limiters,
        overload,
    };

    let cors = build_cors(&mailer_config);

    let app = Router::new()
        .nest("/api", routes::api_routes(state))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .layer(cors);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server running on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(lifecycle))
    .await?;

    Ok(())
}

fn spawn_overload_sampler(overload: Arc<OverloadGuard>, sample_interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sample_interval);
        loop {
            ticker.tick().await;
            overload.refresh_and_check().await;
        }
    });
}

fn spawn_reaper_loop(reaper: Arc<ReaperService>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            reaper.run_once().await;
        }
    });
}

fn build_cors(mailer: &MailerConfig) -> CorsLayer {
    let mut origins = vec![mailer.frontend_origin.trim_end_matches('/').to_string()];
    if mailer.allow_localhost_origins {
        origins.push("http://localhost:3000".to_string());
        origins.push("http://127.0.0.1:3000".to_string());
    }

    let allowed: Vec<HeaderValue> = origins
        .into_iter()
        .filter_map(|origin| {
            HeaderValue::from_str(&origin).ok().or_else(|| {
                tracing::warn!("Invalid CORS origin, skipping: {origin}");
                None
            })
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::ACCEPT,
            axum::http::header::ORIGIN,
            axum::http::HeaderName::from_static("x-author-token"),
            axum::http::HeaderName::from_static("x-device-id"),
        ])
        // spec §6: "ETag exposed via CORS for multipart completion" — the
        // frontend reads part ETags back off presigned PUT responses.
        .expose_headers([axum::http::header::ETAG])
}

async fn shutdown_signal(lifecycle: Arc<LifecycleService>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down, cancelling in-flight destruction timers");
    lifecycle.cancel_all_timers().await;
}
