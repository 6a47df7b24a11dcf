use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub media_root: String,
    pub media_url: String,
    pub database_url: String,
    pub export_root: String,
    pub pdfium_path: Option<PathBuf>,
    pub raster_dpi: f32,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Image & PDF asset API")]
pub struct Args {
    /// Host to bind to (overrides ASSET_API_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ASSET_API_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded and derived files are stored (overrides ASSET_API_MEDIA_ROOT)
    #[arg(long)]
    pub media_root: Option<String>,

    /// Public URL prefix for stored files (overrides ASSET_API_MEDIA_URL)
    #[arg(long)]
    pub media_url: Option<String>,

    /// Database URL (overrides ASSET_API_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory that /file_to_base64/ may read from (overrides ASSET_API_EXPORT_ROOT)
    #[arg(long)]
    pub export_root: Option<String>,

    /// Directory containing the pdfium shared library (overrides ASSET_API_PDFIUM_PATH)
    #[arg(long)]
    pub pdfium_path: Option<PathBuf>,

    /// Resolution used when rasterizing PDF pages (overrides ASSET_API_RASTER_DPI)
    #[arg(long)]
    pub raster_dpi: Option<f32>,

    /// Maximum request body size in bytes (overrides ASSET_API_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        Self::resolve(args, |key| env::var(key).ok())
    }

    /// Merge CLI arguments over values looked up with `env`, then defaults.
    pub fn resolve(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<(Self, bool)> {
        let string = |key: &str, default: &str| env(key).unwrap_or_else(|| default.into());

        // --- Environment fallback ---
        let env_host = string("ASSET_API_HOST", "0.0.0.0");
        let env_port = parse_env(&env, "ASSET_API_PORT")?.unwrap_or(8000);
        let env_media_root = string("ASSET_API_MEDIA_ROOT", "./data/media");
        let env_media_url = string("ASSET_API_MEDIA_URL", "/media/");
        let env_db = string(
            "ASSET_API_DATABASE_URL",
            "sqlite://./data/meta/assets.db",
        );
        let env_export_root = string("ASSET_API_EXPORT_ROOT", ".");
        let env_pdfium = env("ASSET_API_PDFIUM_PATH").map(PathBuf::from);
        let env_dpi = parse_env(&env, "ASSET_API_RASTER_DPI")?.unwrap_or(72.0);
        let env_max_upload = parse_env(&env, "ASSET_API_MAX_UPLOAD_BYTES")?.unwrap_or(50 * 1024 * 1024);

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            media_root: args.media_root.unwrap_or(env_media_root),
            media_url: args.media_url.unwrap_or(env_media_url),
            database_url: args.database_url.unwrap_or(env_db),
            export_root: args.export_root.unwrap_or(env_export_root),
            pdfium_path: args.pdfium_path.or(env_pdfium),
            raster_dpi: args.raster_dpi.unwrap_or(env_dpi),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
        };

        if !(cfg.raster_dpi.is_finite() && cfg.raster_dpi > 0.0) {
            anyhow::bail!("raster DPI must be positive, got {}", cfg.raster_dpi);
        }

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env(key)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", key, value))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_env_or_args() {
        let (cfg, migrate) = AppConfig::resolve(Args::default(), env_from(&[])).unwrap();
        assert!(!migrate);
        assert_eq!(cfg.addr(), "0.0.0.0:8000");
        assert_eq!(cfg.media_root, "./data/media");
        assert_eq!(cfg.media_url, "/media/");
        assert_eq!(cfg.database_url, "sqlite://./data/meta/assets.db");
        assert_eq!(cfg.export_root, ".");
        assert_eq!(cfg.pdfium_path, None);
        assert_eq!(cfg.raster_dpi, 72.0);
        assert_eq!(cfg.max_upload_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn args_override_env() {
        let args = Args {
            port: Some(9100),
            media_url: Some("https://cdn.example.com/media/".into()),
            migrate: true,
            ..Args::default()
        };
        let env = env_from(&[
            ("ASSET_API_PORT", "7000"),
            ("ASSET_API_HOST", "127.0.0.1"),
            ("ASSET_API_RASTER_DPI", "150"),
            ("ASSET_API_PDFIUM_PATH", "/opt/pdfium/lib"),
        ]);

        let (cfg, migrate) = AppConfig::resolve(args, env).unwrap();
        assert!(migrate);
        assert_eq!(cfg.addr(), "127.0.0.1:9100");
        assert_eq!(cfg.media_url, "https://cdn.example.com/media/");
        assert_eq!(cfg.raster_dpi, 150.0);
        assert_eq!(cfg.pdfium_path, Some(PathBuf::from("/opt/pdfium/lib")));
    }

    #[test]
    fn rejects_unparseable_port() {
        let err = AppConfig::resolve(Args::default(), env_from(&[("ASSET_API_PORT", "eighty")]))
            .unwrap_err();
        assert!(err.to_string().contains("ASSET_API_PORT"));
    }

    #[test]
    fn rejects_non_positive_dpi() {
        assert!(
            AppConfig::resolve(Args::default(), env_from(&[("ASSET_API_RASTER_DPI", "0")]))
                .is_err()
        );
    }
}
