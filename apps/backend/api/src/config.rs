use agroscan_api::state::DEFAULT_MAX_UPLOAD_BYTES;
use agroscan_api::store::PoolOptions;
use agroscan_vision::decision::DEFAULT_CONFIDENCE_THRESHOLD;
use agroscan_vision::{LoadPolicy, ManifestError, ModelManifest};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub pool: PoolOptions,
    pub manifest_path: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
    pub model_load: LoadPolicy,
    pub confidence_threshold: f64,
    pub auth_secret: Option<String>,
    pub max_upload_bytes: usize,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL").ok_or(ConfigError::MissingVar("DATABASE_URL"))?;

        let confidence_threshold: f64 =
            parse_or(var("CONFIDENCE_THRESHOLD"), "CONFIDENCE_THRESHOLD", DEFAULT_CONFIDENCE_THRESHOLD)?;
        if !(confidence_threshold > 0.0 && confidence_threshold < 1.0) {
            return Err(ConfigError::InvalidValue(format!(
                "CONFIDENCE_THRESHOLD must lie in (0, 1), got {}",
                confidence_threshold
            )));
        }

        let defaults = PoolOptions::default();
        let pool = PoolOptions {
            max_connections: parse_or(
                var("DB_MAX_CONNECTIONS"),
                "DB_MAX_CONNECTIONS",
                defaults.max_connections,
            )?,
            min_connections: parse_or(
                var("DB_MIN_CONNECTIONS"),
                "DB_MIN_CONNECTIONS",
                defaults.min_connections,
            )?,
            ..defaults
        };
        if pool.min_connections > pool.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS exceeds DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(Config {
            port: parse_or(var("PORT"), "PORT", 8000)?,
            database_url,
            pool,
            manifest_path: var("MODEL_MANIFEST").map(PathBuf::from),
            model_path: var("MODEL_PATH").map(PathBuf::from),
            model_load: parse_or(var("MODEL_LOAD"), "MODEL_LOAD", LoadPolicy::Eager)?,
            confidence_threshold,
            auth_secret: var("AUTH_SECRET"),
            max_upload_bytes: parse_or(
                var("MAX_UPLOAD_BYTES"),
                "MAX_UPLOAD_BYTES",
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            cors_origins: var("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    /// The manifest file when one is configured, otherwise the built-in tea
    /// manifest. `MODEL_PATH` overrides the artifact location in both cases.
    pub fn manifest(&self) -> Result<ModelManifest, ConfigError> {
        let manifest = match &self.manifest_path {
            Some(path) => ModelManifest::from_path(path).map_err(ConfigError::Manifest)?,
            None => ModelManifest::default(),
        };
        Ok(match &self.model_path {
            Some(path) => manifest.with_model_path(path),
            None => manifest,
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}: '{}'", key, raw))),
        None => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidValue(String),
    Manifest(ManifestError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVar(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(var) => write!(f, "Invalid value for: {}", var),
            ConfigError::Manifest(err) => write!(f, "Model manifest error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/agroscan")]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.pool.max_connections, 10);
        assert_eq!(config.pool.min_connections, 1);
        assert_eq!(config.model_load, LoadPolicy::Eager);
        assert_eq!(config.confidence_threshold, 0.70);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert!(config.cors_origins.is_empty());
        assert!(config.auth_secret.is_none());

        let manifest = config.manifest().unwrap();
        assert_eq!(manifest.version, "tea-v2-224");
        assert_eq!(manifest.model_path, PathBuf::from("./tea_disease_model.onnx"));
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(
            config(&[]),
            Err(ConfigError::MissingVar("DATABASE_URL"))
        ));
        assert!(matches!(
            config(&[("DATABASE_URL", "  ")]),
            Err(ConfigError::MissingVar("DATABASE_URL"))
        ));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("PORT", "9001"),
            ("MODEL_LOAD", "Lazy"),
            ("CONFIDENCE_THRESHOLD", "0.85"),
            ("MODEL_PATH", "/models/tea.onnx"),
            ("CORS_ORIGINS", "https://a.example, https://b.example,"),
        ])
        .unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.model_load, LoadPolicy::Lazy);
        assert_eq!(config.confidence_threshold, 0.85);
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(
            config.manifest().unwrap().model_path,
            PathBuf::from("/models/tea.onnx")
        );
    }

    #[test]
    fn bad_values_are_rejected() {
        for (key, value) in [
            ("PORT", "eighty"),
            ("MODEL_LOAD", "sometimes"),
            ("CONFIDENCE_THRESHOLD", "1.5"),
            ("CONFIDENCE_THRESHOLD", "0"),
            ("MAX_UPLOAD_BYTES", "-1"),
        ] {
            let result = config(&[("DATABASE_URL", "sqlite::memory:"), (key, value)]);
            assert!(
                matches!(result, Err(ConfigError::InvalidValue(_))),
                "{key}={value}"
            );
        }
    }

    #[test]
    fn manifest_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            r#"{
                "version": "tea-v3-256",
                "model_path": "tea-v3.onnx",
                "input_height": 256,
                "input_width": 256,
                "labels": ["healthy", "Other_Non_Tea_Leaf", "white spot"],
                "out_of_domain_label": "Other_Non_Tea_Leaf"
            }"#,
        )
        .unwrap();

        let config = config(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("MODEL_MANIFEST", path.to_str().unwrap()),
        ])
        .unwrap();
        let manifest = config.manifest().unwrap();
        assert_eq!(manifest.version, "tea-v3-256");
        assert_eq!(manifest.input_height, 256);
        assert_eq!(manifest.model_path, dir.path().join("tea-v3.onnx"));
    }

    #[test]
    fn missing_manifest_file_fails() {
        let config = config(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("MODEL_MANIFEST", "/nonexistent/manifest.json"),
        ])
        .unwrap();
        assert!(matches!(config.manifest(), Err(ConfigError::Manifest(_))));
    }
}
