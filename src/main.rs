use anyhow::Result;
use asset_api::{
    codecs::{image_codec::RasterImageCodec, pdf_codec::PdfCodec},
    config::AppConfig,
    routes::routes::routes,
    services::asset_service::{AssetService, ServiceSettings},
    storage::{asset_store::SqliteAssetStore, blob_store::FsBlobStore},
};
use axum::{Router, extract::DefaultBodyLimit};
use std::{fs, io::ErrorKind, path::Path, path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting asset-api with config: {:?}", cfg);

    // --- Ensure media directory exists ---
    if !Path::new(&cfg.media_root).exists() {
        fs::create_dir_all(&cfg.media_root)?;
        tracing::info!("Created media directory at {}", cfg.media_root);
    }

    // --- Initialize SQLite store ---
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let store = SqliteAssetStore::connect(&cfg.database_url).await?;
    let statements = store.migrate().await?;
    tracing::info!("Applied {} schema statements", statements);

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core service ---
    let service = AssetService::new(
        Arc::new(store),
        Arc::new(FsBlobStore::new(&cfg.media_root)),
        Arc::new(RasterImageCodec::new()),
        Arc::new(PdfCodec::new(cfg.pdfium_path.clone(), cfg.raster_dpi)),
        ServiceSettings {
            media_url: cfg.media_url.clone(),
            export_root: PathBuf::from(&cfg.export_root),
        },
    );

    // --- Build router ---
    let mut app: Router = routes().with_state(service);

    // Serve stored files when the media URL is a local path.
    let media_prefix = cfg.media_url.trim_end_matches('/');
    if media_prefix.starts_with('/') && !media_prefix.is_empty() {
        app = app.nest_service(media_prefix, ServeDir::new(&cfg.media_root));
        tracing::info!("Serving {} at {}/", cfg.media_root, media_prefix);
    }

    let app = app
        .layer(DefaultBodyLimit::max(cfg.max_upload_bytes))
        .layer(TraceLayer::new_for_http());

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
