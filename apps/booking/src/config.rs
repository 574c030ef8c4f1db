use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use client_core::{GraphQlClient, ValidationMode, WorkflowOptions};
use serde::Deserialize;
use tracing::warn;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "booking.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub graphql_url: String,
    pub session_file: PathBuf,
    pub request_timeout_secs: u64,
    pub submit_timeout_secs: Option<u64>,
    pub validation_mode: ValidationMode,
    pub max_party_size: Option<u32>,
    pub return_route: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            graphql_url: "http://127.0.0.1:4000/graphql".into(),
            session_file: PathBuf::from("./data/session.json"),
            request_timeout_secs: 30,
            submit_timeout_secs: None,
            validation_mode: ValidationMode::Local,
            max_party_size: None,
            return_route: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    graphql_url: Option<String>,
    session_file: Option<PathBuf>,
    request_timeout_secs: Option<u64>,
    submit_timeout_secs: Option<u64>,
    validation_mode: Option<String>,
    max_party_size: Option<u32>,
    return_route: Option<String>,
}

impl Settings {
    pub fn graphql_endpoint(&self) -> Result<Url> {
        let endpoint = Url::parse(self.graphql_url.trim())
            .with_context(|| format!("invalid graphql url '{}'", self.graphql_url))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            bail!("graphql url '{}' must use http or https", self.graphql_url);
        }
        Ok(endpoint)
    }

    pub fn graphql_client(&self, token: Option<String>) -> Result<GraphQlClient> {
        let client = GraphQlClient::with_timeout(
            self.graphql_endpoint()?,
            Duration::from_secs(self.request_timeout_secs),
        )?;
        Ok(client.with_token(token))
    }

    pub fn workflow_options(&self) -> WorkflowOptions {
        WorkflowOptions {
            validation: self.validation_mode,
            max_party_size: self.max_party_size,
            submit_timeout: self.submit_timeout_secs.map(Duration::from_secs),
            return_route: self.return_route.clone(),
        }
    }
}

/// Defaults, then the config file if present, then the process environment.
pub fn load_settings(config_file: &Path) -> Settings {
    let mut settings = Settings::default();

    match fs::read_to_string(config_file) {
        Ok(raw) => {
            if let Err(err) = apply_file(&mut settings, &raw) {
                warn!(
                    "config: ignoring '{}': {err:#}",
                    config_file.display()
                );
            }
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("config: cannot read '{}': {err}", config_file.display()),
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

/// Applies a config file. The whole file is validated before anything is
/// applied, so a rejected file leaves `settings` untouched. A zero limit
/// disables it, as in the environment overrides.
pub fn apply_file(settings: &mut Settings, raw: &str) -> Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw).context("config file is not valid toml")?;

    let validation_mode = match file_cfg.validation_mode.as_deref() {
        Some(v) => Some(
            ValidationMode::parse(v).with_context(|| format!("unknown validation_mode '{v}'"))?,
        ),
        None => None,
    };
    if file_cfg.request_timeout_secs == Some(0) {
        bail!("request_timeout_secs must be at least 1");
    }

    if let Some(v) = file_cfg.graphql_url {
        settings.graphql_url = v;
    }
    if let Some(v) = file_cfg.session_file {
        settings.session_file = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.submit_timeout_secs {
        settings.submit_timeout_secs = Some(v).filter(|secs| *secs > 0);
    }
    if let Some(mode) = validation_mode {
        settings.validation_mode = mode;
    }
    if let Some(v) = file_cfg.max_party_size {
        settings.max_party_size = Some(v).filter(|limit| *limit > 0);
    }
    if let Some(v) = file_cfg.return_route {
        settings.return_route = Some(v).filter(|route| !route.trim().is_empty());
    }
    Ok(())
}

/// Applies `APP__*` overrides. `BOOKING_GRAPHQL_URL` is read first so the
/// `APP__` spelling wins when both are set.
pub fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("BOOKING_GRAPHQL_URL") {
        settings.graphql_url = v;
    }
    if let Some(v) = lookup("APP__GRAPHQL_URL") {
        settings.graphql_url = v;
    }

    if let Some(v) = lookup("APP__SESSION_FILE") {
        settings.session_file = PathBuf::from(v);
    }

    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        match v.parse::<u64>() {
            Ok(parsed) if parsed > 0 => settings.request_timeout_secs = parsed,
            _ => warn!("config: ignoring APP__REQUEST_TIMEOUT_SECS={v}"),
        }
    }

    if let Some(v) = lookup("APP__SUBMIT_TIMEOUT_SECS") {
        match v.parse::<u64>() {
            Ok(0) => settings.submit_timeout_secs = None,
            Ok(parsed) => settings.submit_timeout_secs = Some(parsed),
            Err(_) => warn!("config: ignoring APP__SUBMIT_TIMEOUT_SECS={v}"),
        }
    }

    if let Some(v) = lookup("APP__VALIDATION_MODE") {
        match ValidationMode::parse(&v) {
            Some(mode) => settings.validation_mode = mode,
            None => warn!("config: ignoring APP__VALIDATION_MODE={v}"),
        }
    }

    if let Some(v) = lookup("APP__MAX_PARTY_SIZE") {
        match v.parse::<u32>() {
            Ok(0) => settings.max_party_size = None,
            Ok(parsed) => settings.max_party_size = Some(parsed),
            Err(_) => warn!("config: ignoring APP__MAX_PARTY_SIZE={v}"),
        }
    }

    if let Some(v) = lookup("APP__RETURN_ROUTE") {
        settings.return_route = Some(v).filter(|route| !route.trim().is_empty());
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
