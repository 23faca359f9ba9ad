use std::{fs, path::PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server_url: String,
    pub room_name: String,
    pub user_name: String,
    pub stun_server: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:30000/ws".to_string(),
            room_name: "lobby".to_string(),
            user_name: String::new(),
            stun_server: "stun:stun.l.google.com:19302".to_string(),
        }
    }
}

impl Config {
    fn get_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "sigrun")
            .map(|proj_dirs| proj_dirs.config_dir().join("config.json"))
    }

    pub fn load() -> Self {
        tracing::info!("Loading config");
        if let Some(path) = Self::get_config_path() {
            if path.exists() {
                match fs::read(&path) {
                    Ok(content) => match serde_json::from_slice(&content) {
                        Ok(config) => return config,
                        Err(e) => tracing::error!("Failed to parse config file: {}", e),
                    },
                    Err(e) => tracing::error!("Failed to read config file: {}", e),
                }
            }
        }

        tracing::info!("No config file could be loaded, using default config.");
        let default = Self::default();
        if let Err(e) = default.save() {
            tracing::error!("Failed to save default config: {}", e);
        }
        default
    }

    pub fn save(&self) -> std::io::Result<()> {
        if let Some(path) = Self::get_config_path() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_vec_pretty(self)?;
            fs::write(path, content)?;
        }
        Ok(())
    }
}
