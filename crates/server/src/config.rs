use std::{collections::HashMap, fs, path::PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:5984".into(),
            data_dir: PathBuf::from("./data"),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

/// Overlays keys from a `server.toml` body; unparsable files are ignored.
pub fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("data_dir") {
        settings.data_dir = PathBuf::from(v);
    }
}

/// Later names win: `APP__*` overrides the short form.
pub fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    for key in ["SERVER_BIND", "APP__BIND_ADDR"] {
        if let Some(v) = var(key) {
            settings.server_bind = v;
        }
    }
    for key in ["DATA_DIR", "APP__DATA_DIR"] {
        if let Some(v) = var(key) {
            settings.data_dir = PathBuf::from(v);
        }
    }
}

pub fn prepare_data_dir(data_dir: &std::path::Path) -> anyhow::Result<PathBuf> {
    let data_dir = if data_dir.as_os_str().is_empty() {
        Settings::default().data_dir
    } else {
        data_dir.to_path_buf()
    };
    fs::create_dir_all(&data_dir).with_context(|| {
        format!("failed to create data directory '{}'", data_dir.display())
    })?;
    Ok(data_dir)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
