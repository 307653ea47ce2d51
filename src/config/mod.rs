mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    parse_config(&content).with_context(|| format!("Invalid config file: {:?}", path))
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content).context("Failed to parse config")?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./config.toml",
        "./relaycast.toml",
        "~/.config/relaycast/config.toml",
        "/etc/relaycast/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    // Return default config if no file found
    Ok(Config::default())
}

fn expand_paths(config: &mut Config) {
    let expand = |p: &Path| -> std::path::PathBuf {
        shellexpand::tilde(&p.to_string_lossy()).into_owned().into()
    };

    config.store.root = expand(&config.store.root);
    if let Some(dir) = config.acquisition.temp_dir.as_deref() {
        config.acquisition.temp_dir = Some(expand(dir));
    }
    if let Some(ffmpeg) = config.transcode.ffmpeg_path.as_deref() {
        config.transcode.ffmpeg_path = Some(expand(ffmpeg));
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.store.max_connections == 0 {
        anyhow::bail!("store.max_connections must be at least 1");
    }
    if config.store.kind == StoreKind::Http {
        match config.store.base_url.as_deref() {
            Some(url) if is_http_url(url) => {}
            Some(url) => anyhow::bail!("store.base_url is not an http(s) URL: {}", url),
            None => tracing::warn!("store.base_url is not set; streaming will fail"),
        }
    }

    if config.sources.search_timeout_secs == 0 {
        anyhow::bail!("sources.search_timeout_secs must be at least 1");
    }
    if let Some(url) = config.sources.registry_url.as_deref() {
        if !is_http_url(url) {
            anyhow::bail!("sources.registry_url is not an http(s) URL: {}", url);
        }
    }
    for instance in &config.sources.fallback_instances {
        if !is_http_url(instance) {
            anyhow::bail!("Fallback instance is not an http(s) URL: {}", instance);
        }
    }
    if config.sources.registry_url.is_none() && config.sources.fallback_instances.is_empty() {
        tracing::warn!("No provider instances configured; every download will fail");
    }

    if config.acquisition.poll_interval_ms == 0 {
        anyhow::bail!("acquisition.poll_interval_ms must be positive");
    }
    if config.acquisition.download_idle_timeout_secs == 0 {
        anyhow::bail!("acquisition.download_idle_timeout_secs must be positive");
    }
    if let Some(dest) = config.acquisition.default_destination.as_deref() {
        if dest.trim().is_empty() {
            anyhow::bail!("acquisition.default_destination cannot be blank");
        }
    }

    if config.transcode.enabled {
        if config.transcode.format.is_empty() || config.transcode.codec.is_empty() {
            anyhow::bail!("transcode.format and transcode.codec are required when enabled");
        }
        if !config
            .transcode
            .format
            .chars()
            .all(|c| c.is_ascii_alphanumeric())
        {
            anyhow::bail!("transcode.format must be a plain extension: {}", config.transcode.format);
        }
    }

    Ok(())
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
