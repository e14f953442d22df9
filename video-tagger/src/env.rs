use crate::types::{ApiConfig, ProjectContext, Result, TaggerError};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const LOCAL_ENV_FILE: &str = "local.env";
pub const HOME_ENV_FILE: &str = "supervisely.env";

const PROJECT_ID_KEYS: [&str; 3] = ["PROJECT_ID", "context.projectId", "modal.state.slyProjectId"];
const DATASET_ID_KEYS: [&str; 3] = ["DATASET_ID", "context.datasetId", "modal.state.slyDatasetId"];

/// Loads `local.env` from the working directory, then `~/supervisely.env`.
///
/// Missing files are skipped. Variables already set (by the shell or by an
/// earlier file) keep their value. Returns the files that were read.
pub fn load_env_files() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(LOCAL_ENV_FILE)];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(HOME_ENV_FILE));
    }

    candidates.into_iter().filter(|path| load_env_file(path)).collect()
}

fn load_env_file(path: &Path) -> bool {
    match dotenvy::from_path(path) {
        Ok(()) => {
            debug!("Loaded environment from {}", path.display());
            true
        }
        Err(e) => {
            debug!("Skipping {}: {}", path.display(), e);
            false
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = ApiConfig::default();
        Ok(Self {
            server_address: required("SERVER_ADDRESS")?,
            api_token: required("API_TOKEN")?,
            timeout_seconds: optional_number("VIDEO_TAGGER_TIMEOUT_SECONDS")?.unwrap_or(defaults.timeout_seconds),
            max_retries: optional_number("VIDEO_TAGGER_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            ..defaults
        })
    }
}

impl ProjectContext {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            project_id: first_id(&PROJECT_ID_KEYS)?,
            dataset_id: first_id(&DATASET_ID_KEYS)?,
        })
    }
}

fn required(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(TaggerError::MissingEnv(name.to_string())),
    }
}

fn optional_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| TaggerError::InvalidEnv { name: name.to_string(), value }),
        Err(_) => Ok(None),
    }
}

fn first_id(keys: &[&str]) -> Result<i64> {
    for key in keys {
        if let Ok(value) = env::var(key) {
            return parse_id(key, &value);
        }
    }
    Err(TaggerError::MissingEnv(keys[0].to_string()))
}

pub(crate) fn parse_id(name: &str, value: &str) -> Result<i64> {
    match value.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(TaggerError::InvalidEnv {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(parse_id("PROJECT_ID", " 17 ").unwrap(), 17);
        assert!(matches!(parse_id("PROJECT_ID", "0"), Err(TaggerError::InvalidEnv { .. })));
        assert!(matches!(parse_id("DATASET_ID", "abc"), Err(TaggerError::InvalidEnv { .. })));
    }

    #[test]
    fn project_context_falls_back_to_app_keys() {
        // Only this test touches these variables.
        env::remove_var("PROJECT_ID");
        env::remove_var("DATASET_ID");
        env::set_var("context.projectId", "5");
        env::set_var("modal.state.slyDatasetId", "9");

        let context = ProjectContext::from_env().unwrap();
        assert_eq!(context, ProjectContext { project_id: 5, dataset_id: 9 });

        env::remove_var("context.projectId");
        env::remove_var("modal.state.slyDatasetId");
    }
}
