use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;

pub const SETTINGS_FILE: &str = "trainer.toml";
const USERNAME_FILE: &str = "username";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub remote_url: Option<String>,
    pub username: Option<String>,
    pub poll_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./trainer-data"),
            remote_url: None,
            username: None,
            poll_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    data_dir: Option<PathBuf>,
    remote_url: Option<String>,
    username: Option<String>,
    poll_interval_secs: Option<u64>,
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

pub fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<FileSettings>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.data_dir {
        settings.data_dir = v;
    }
    if let Some(v) = file_cfg.remote_url {
        settings.remote_url = non_empty(v);
    }
    if let Some(v) = file_cfg.username {
        settings.username = non_empty(v);
    }
    if let Some(secs) = file_cfg.poll_interval_secs.filter(|secs| *secs > 0) {
        settings.poll_interval = Duration::from_secs(secs);
    }
}

pub fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("TRAINER_DATA_DIR") {
        settings.data_dir = PathBuf::from(v);
    }
    if let Some(v) = var("TRAINER_REMOTE_URL") {
        settings.remote_url = non_empty(v);
    }
    if let Some(v) = var("TRAINER_USERNAME") {
        settings.username = non_empty(v);
    }
    if let Some(secs) = var("TRAINER_POLL_INTERVAL_SECS")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
    {
        settings.poll_interval = Duration::from_secs(secs);
    }
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Username chosen earlier with `trainer use`, if any.
pub fn read_saved_username(data_dir: &Path) -> anyhow::Result<Option<String>> {
    let path = data_dir.join(USERNAME_FILE);
    match fs::read_to_string(&path) {
        Ok(raw) => Ok(non_empty(raw)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read '{}'", path.display())),
    }
}

pub fn save_username(data_dir: &Path, username: &str) -> anyhow::Result<()> {
    fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory '{}'", data_dir.display()))?;
    let path = data_dir.join(USERNAME_FILE);
    fs::write(&path, username.trim())
        .with_context(|| format!("failed to write '{}'", path.display()))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
