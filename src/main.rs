//! Emergency medical loan API server

use axum::http::{header, HeaderValue, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::cors::CorsLayer;

use medloan_server::config::{Config, ImageAnalyzerKind};
use medloan_server::db;
use medloan_server::geo::{GooglePlacesGeocoder, IpApiGeolocator};
use medloan_server::loan::InMemoryLoanRepository;
use medloan_server::middleware;
use medloan_server::routes;
use medloan_server::services::documents::{
    FirRegistry, HttpFirRegistry, InMemoryKnownHashStore, OfflineFirRegistry,
};
use medloan_server::services::image::{
    GoogleVisionClassifier, HeuristicImageAnalyzer, ImageAnalyzer, LabelImageAnalyzer,
};
use medloan_server::state::{AppState, Backends, Collaborators};
use medloan_server::store::InMemoryStore;

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting loan API");

    let backends = match init_backends(&config).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize storage");
            std::process::exit(1);
        }
    };

    let http = match reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            std::process::exit(1);
        }
    };

    let app_state = AppState::new(&config, backends, collaborators(&config, http));
    tracing::info!(
        backend = app_state.backend,
        image_analyzer = app_state.risk_service.image_analyzer_name(),
        "Services wired"
    );

    let mut app = routes::create_router(app_state).layer(configure_cors(&config));
    if config.environment.is_production() {
        app = app.layer(axum::middleware::from_fn(middleware::hsts_header));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, %addr, "Failed to bind listener");
            std::process::exit(1);
        }
    };

    // Serve with graceful shutdown
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    tracing::info!("Server shutdown complete");
}

/// Postgres when `DATABASE_URL` is set, otherwise process-local stores
async fn init_backends(config: &Config) -> anyhow::Result<Backends> {
    if config.database_url.is_some() {
        let pool = db::create_pool(config).await?;
        db::run_migrations(&pool).await?;
        return Ok(Backends::postgres(pool));
    }

    tracing::warn!("DATABASE_URL not set, using in-memory stores (single instance only)");

    let store = InMemoryStore::new();
    let sweeper = store.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(300)).await;
            sweeper.cleanup().await;
        }
    });

    Ok(Backends {
        name: "memory",
        store: Arc::new(store),
        loans: Arc::new(InMemoryLoanRepository::new()),
        known_hashes: Arc::new(InMemoryKnownHashStore::new()),
    })
}

fn collaborators(config: &Config, http: reqwest::Client) -> Collaborators {
    let image_analyzer: Arc<dyn ImageAnalyzer> = match (
        config.image_analyzer,
        config.google_vision_api_key.clone(),
    ) {
        (ImageAnalyzerKind::Labels, Some(key)) => Arc::new(LabelImageAnalyzer::new(Arc::new(
            GoogleVisionClassifier::new(http.clone(), key),
        ))),
        (ImageAnalyzerKind::Labels, None) => {
            tracing::warn!("GOOGLE_VISION_API_KEY not set, falling back to heuristic image analysis");
            Arc::new(HeuristicImageAnalyzer)
        }
        (ImageAnalyzerKind::Heuristic, _) => Arc::new(HeuristicImageAnalyzer),
    };

    let fir_registry: Arc<dyn FirRegistry> = match &config.fir_registry_url {
        Some(url) => Arc::new(HttpFirRegistry::new(http.clone(), url.clone())),
        None => {
            tracing::warn!("FIR_REGISTRY_URL not set, FIR numbers will not be verified");
            Arc::new(OfflineFirRegistry)
        }
    };

    if config.google_maps_api_key.is_none() {
        tracing::warn!("GOOGLE_MAPS_API_KEY not set, hospital lookups will fail");
    }

    Collaborators {
        geocoder: Arc::new(GooglePlacesGeocoder::new(
            http.clone(),
            config.google_maps_api_key.clone(),
        )),
        ip_geolocator: Some(Arc::new(IpApiGeolocator::new(
            http,
            config.ip_geolocation_url.clone(),
        ))),
        image_analyzer,
        fir_registry,
    }
}

fn configure_cors(config: &Config) -> CorsLayer {
    let allowed = config.cors_allowed_origins.as_deref().unwrap_or_default();

    if allowed.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
