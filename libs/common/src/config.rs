//! Layered configuration loading

use crate::{Error, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// Environment variable prefix for a service, e.g. `calcctl` -> `CALCCTL_`
pub fn env_prefix(service_name: &str) -> String {
    format!("{}_", service_name.to_uppercase().replace('-', "_"))
}

/// Load configuration from multiple sources
///
/// Priority (highest to lowest):
/// 1. Environment variables prefixed with the service name
/// 2. `{config_dir}/{service}.yaml`, `.toml`, `.json`
/// 3. `T::default()`
///
/// Missing files are skipped.
pub fn load_config<T>(config_dir: &Path, service_name: &str) -> Result<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    let figment = Figment::from(Serialized::defaults(T::default()))
        .merge(Toml::file(config_dir.join(format!("{}.toml", service_name))))
        .merge(Yaml::file(config_dir.join(format!("{}.yaml", service_name))))
        .merge(Json::file(config_dir.join(format!("{}.json", service_name))))
        .merge(Env::prefixed(&env_prefix(service_name)));

    figment
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))
}

/// Load configuration from a specific file, layered over `T::default()`
///
/// The format is picked from the extension: `yaml`/`yml`, `toml` or `json`.
pub fn load_config_from_file<T, P>(path: P) -> Result<T>
where
    T: Serialize + DeserializeOwned + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Config("Config file must have an extension".to_string()))?;

    let base = Figment::from(Serialized::defaults(T::default()));
    let figment = match extension {
        "toml" => base.merge(Toml::file(path)),
        "yaml" | "yml" => base.merge(Yaml::file(path)),
        "json" => base.merge(Json::file(path)),
        _ => {
            return Err(Error::Config(format!(
                "Unsupported config file format: {}",
                extension
            )))
        },
    };

    figment
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration from file: {}", e)))
}
