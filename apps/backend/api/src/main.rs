#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use agroscan_api::construct_router;
use agroscan_api::state::State;
use agroscan_api::store::ScanStore;
use agroscan_api::token::TokenIssuer;
use agroscan_vision::onnx::OnnxModelSource;
use agroscan_vision::{DecisionPolicy, LoadPolicy, ModelLoader};
use axum::{Router, http::HeaderValue, routing::get};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

mod config;
mod telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    telemetry::init_telemetry()?;

    tracing::info!("Starting Agroscan API service");

    let config = config::Config::from_env()?;
    let manifest = config.manifest()?;
    tracing::info!(
        version = %manifest.version,
        model_path = %manifest.model_path.display(),
        load = ?config.model_load,
        "Loaded configuration"
    );

    let store = ScanStore::connect(&config.database_url, &config.pool).await?;
    store.ensure_schema().await?;

    let policy = DecisionPolicy::from_manifest(&manifest, config.confidence_threshold)?;
    let loader = Arc::new(ModelLoader::new(
        Arc::new(OnnxModelSource::from_manifest(&manifest)),
        config.model_load,
        manifest.num_classes(),
    ));
    if config.model_load == LoadPolicy::Eager {
        match loader.load().await {
            Ok(()) => tracing::info!("Model loaded"),
            Err(e) => tracing::error!(
                "Model failed to load, /predict will answer 503 until restart: {}",
                e
            ),
        }
    }

    let tokens = match &config.auth_secret {
        Some(secret) => TokenIssuer::new(secret.as_bytes()),
        None => {
            tracing::warn!(
                "AUTH_SECRET not set. Using a random signing secret; login tokens will not survive a restart."
            );
            TokenIssuer::random()
        }
    };

    let state = Arc::new(
        State::new(store, loader, &manifest, policy, tokens)
            .with_max_upload_bytes(config.max_upload_bytes),
    );

    let app = Router::new()
        .merge(construct_router(state))
        .route("/metrics", get(telemetry::handler))
        .layer(cors_layer(&config.cors_origins));

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    CorsLayer::permissive().allow_origin(AllowOrigin::list(origins))
}
