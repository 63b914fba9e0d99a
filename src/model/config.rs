use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub outline: OutlineConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub data_file: String,
    pub log_filter: String,
    pub max_notifications: usize,
}

#[derive(Debug, Deserialize)]
pub struct OutlineConfig {
    pub indent_width: u16,
    /// Breadcrumb label for nodes with empty content.
    pub untitled_label: String,
    pub show_backlinks: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExportConfig {
    /// File name used by `:export` when no path is given.
    pub file_name: String,
}

impl AppConfig {
    /// Load configuration with layering: defaults → user config.
    pub fn load() -> Result<Self> {
        let mut config = Self::defaults()?;

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "outliner") {
            let config_path = proj_dirs.config_dir().join("config.toml");
            if config_path.exists() {
                let user_str = fs::read_to_string(&config_path)?;
                config = toml::from_str(&user_str)?;
            }
        }

        config.general.data_file = expand_home(&config.general.data_file)?;

        Ok(config)
    }

    /// The embedded defaults, without user overrides or `~` expansion.
    pub fn defaults() -> Result<Self> {
        Ok(toml::from_str(DEFAULT_CONFIG)?)
    }

    pub fn data_file(&self) -> PathBuf {
        PathBuf::from(&self.general.data_file)
    }

    /// Default export target: next to the data file, never the data file
    /// itself.
    pub fn export_path(&self) -> PathBuf {
        let data_file = self.data_file();
        let path = data_file
            .parent()
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
            .join(&self.export.file_name);
        if path == data_file {
            data_file.with_extension("export.json")
        } else {
            path
        }
    }
}

pub fn expand_home(path: &str) -> Result<String> {
    if !path.starts_with('~') {
        return Ok(path.to_string());
    }

    let home = dirs_home().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(path.replacen('~', &home.to_string_lossy(), 1))
}

fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_parse() {
        let config = AppConfig::defaults().expect("default config should parse");
        assert!(config.general.data_file.ends_with("outliner-data.json"));
        assert_eq!(config.general.log_filter, "outliner=info");
        assert_eq!(config.outline.indent_width, 2);
        assert_eq!(config.outline.untitled_label, "Untitled");
        assert_eq!(config.export.file_name, "outliner-export.json");
    }

    #[test]
    fn expand_home_leaves_plain_paths_alone() {
        assert_eq!(expand_home("/tmp/x.json").expect("plain path"), "/tmp/x.json");
    }

    #[test]
    fn export_path_sits_next_to_data_file() {
        let mut config = AppConfig::defaults().expect("default config should parse");
        config.general.data_file = "/data/outline/doc.json".to_string();
        assert_eq!(
            config.export_path(),
            PathBuf::from("/data/outline/outliner-export.json")
        );
    }

    #[test]
    fn default_export_path_differs_from_data_file() {
        let mut config = AppConfig::defaults().expect("default config should parse");
        config.general.data_file =
            expand_home(&config.general.data_file).expect("home directory resolves");
        assert_ne!(config.export_path(), config.data_file());
    }

    #[test]
    fn export_name_matching_data_file_gets_a_suffix() {
        let mut config = AppConfig::defaults().expect("default config should parse");
        config.general.data_file = "/data/outline/doc.json".to_string();
        config.export.file_name = "doc.json".to_string();
        assert_eq!(
            config.export_path(),
            PathBuf::from("/data/outline/doc.export.json")
        );
    }
}
