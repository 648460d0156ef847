use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub data_dir: PathBuf,
    pub bind: String,
    pub port: u16,
    pub title: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("."),
            bind: "127.0.0.1".into(),
            port: 8080,
            title: "Deadlines".into(),
        }
    }
}

impl Config {
    /// Reads `explicit` if given, else the per-user config file if one exists.
    /// An explicit path that does not exist is an error; a missing default is not.
    pub fn load(explicit: Option<&Path>) -> Result<Config> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Config::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let data =
            fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
        Self::from_yaml(&data).with_context(|| format!("parsing config file {:?}", path))
    }

    pub fn from_yaml(data: &str) -> Result<Config> {
        if data.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yaml::from_str(data)?;
        Ok(config)
    }

    pub fn with_overrides(
        mut self,
        data_dir: Option<PathBuf>,
        bind: Option<String>,
        port: Option<u16>,
    ) -> Self {
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        if let Some(bind) = bind {
            self.bind = bind;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "deadline-board").map(|dirs| dirs.config_dir().join("config.yml"))
}
