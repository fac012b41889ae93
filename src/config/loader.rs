use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Plain environment variables honoured on top of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub port: Option<String>,
    pub environment: Option<String>,
    pub default_backend_url: Option<String>,
    pub default_backend_max_age: Option<String>,
}

impl EnvOverrides {
    /// Read `PORT`, `ENVIRONMENT`, `DEFAULT_BACKEND_URL` and `DEFAULT_BACKEND_MAXAGE`.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            port: var("PORT"),
            environment: var("ENVIRONMENT"),
            default_backend_url: var("DEFAULT_BACKEND_URL"),
            default_backend_max_age: var("DEFAULT_BACKEND_MAXAGE"),
        }
    }
}

/// Determine file format based on extension
fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        _ => FileFormat::Toml,
    }
}

/// Load configuration from a file, `COMPOSER__*` variables and the plain
/// environment overrides, in increasing precedence.
pub fn load_config(config_path: &str) -> Result<ServerConfig> {
    load_config_with(config_path, &EnvOverrides::from_env())
}

/// Load configuration with explicit overrides.
pub fn load_config_with(config_path: &str, overrides: &EnvOverrides) -> Result<ServerConfig> {
    let path = Path::new(config_path);

    let settings = Config::builder()
        .add_source(File::new(config_path, file_format(path)))
        .add_source(
            Environment::with_prefix("COMPOSER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("port", overrides.port.clone())?
        .set_override_option("environment", overrides.environment.clone())?
        .set_override_option("default_backend_url", overrides.default_backend_url.clone())?
        .set_override_option(
            "default_backend_max_age",
            overrides.default_backend_max_age.clone(),
        )?
        .build()
        .with_context(|| format!("Failed to build config from {}", path.display()))?;

    let server_config: ServerConfig = settings
        .try_deserialize()
        .with_context(|| format!("Failed to deserialize config from {}", path.display()))?;

    tracing::debug!(
        path = %path.display(),
        routes = server_config.routes.len(),
        "configuration loaded"
    );
    Ok(server_config)
}

/// A commented starter configuration.
pub const SAMPLE_CONFIG: &str = r#"# composer-proxy configuration
listen_addr = "0.0.0.0:3000"
environment = "development"
default_backend_url = "http://localhost:3001"
default_backend_max_age = 600
# error_page = "views/error.html"
# fragment_root = "fragments"

[common_response_headers]
x-frame-options = "SAMEORIGIN"

[proxy]
base_path = "/"
logs = true
# host_rewrite = "www.example.com"
timeout_secs = 30

[[routes]]
path = "/old-home"
redirect = "/"

[[routes]]
path = "/item/{id}"
cache_max_age = 60
template = "layout"

[[routes.fragments]]
name = "layout"
type = "file"
path = "fragments/item.html"
required = true

[[routes.fragments]]
name = "details"
type = "remote"
url = "/api/items/{id}"
required = true

[[routes.fragments]]
name = "related"
type = "remote"
url = "/api/items/{id}/related"
fallback = "<!-- related items unavailable -->"
"#;
