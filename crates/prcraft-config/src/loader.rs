use crate::Config;
use anyhow::{Context, Result};
use jsonc_parser::{parse_to_serde_value, ParseOptions};
use once_cell::sync::Lazy;
use regex::Regex;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_PATH_ENV: &str = "PRCRAFT_CONFIG";
pub const CONFIG_CONTENT_ENV: &str = "PRCRAFT_CONFIG_CONTENT";

static ENV_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{env:([^}]+)\}").expect("env reference pattern is valid"));

pub struct ConfigLoader {
    config: Config,
    config_paths: Vec<PathBuf>,
    global_path: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            config_paths: Vec::new(),
            global_path: get_global_config_path(),
        }
    }

    /// Overrides the extension-less global config path
    /// (`~/.config/prcraft/prcraft` by default).
    pub fn with_global_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_path = path.into();
        self
    }

    pub fn load_from_str(&mut self, content: &str) -> Result<()> {
        let content = substitute_env_vars(content);
        let config: Config =
            parse_jsonc(&content).with_context(|| "Failed to parse config content")?;
        self.config.merge(config);
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let content = substitute_env_vars(&content);
        let config: Config = parse_jsonc(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        debug!(path = %path.display(), "loaded config file");
        self.config.merge(config);
        self.config_paths.push(path.to_path_buf());
        Ok(())
    }

    pub fn load_global(&mut self) -> Result<()> {
        for ext in ["jsonc", "json"] {
            let path = self.global_path.with_extension(ext);
            if path.exists() {
                self.load_from_file(&path)?;
                break;
            }
        }
        Ok(())
    }

    /// `prcraft.json{c}` in the project directory, then the same names under
    /// `.prcraft/`, so the dot-directory wins.
    pub fn load_project<P: AsRef<Path>>(&mut self, project_dir: P) -> Result<()> {
        let dir = project_dir.as_ref();
        for target in [
            "prcraft.jsonc",
            "prcraft.json",
            ".prcraft/prcraft.jsonc",
            ".prcraft/prcraft.json",
        ] {
            self.load_from_file(dir.join(target))?;
        }
        Ok(())
    }

    pub fn load_from_env(&mut self) -> Result<()> {
        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            self.load_from_file(&config_path)?;
        }
        Ok(())
    }

    pub fn load_from_env_content(&mut self) -> Result<()> {
        if let Ok(config_content) = env::var(CONFIG_CONTENT_ENV) {
            self.load_from_str(&config_content)?;
        }
        Ok(())
    }

    /// Merge order, later wins:
    /// 1. Global config (`~/.config/prcraft/prcraft.json{,c}`)
    /// 2. `PRCRAFT_CONFIG` file
    /// 3. Project config (`prcraft.json{,c}`, `.prcraft/prcraft.json{,c}`)
    /// 4. Inline `PRCRAFT_CONFIG_CONTENT`
    pub fn load_all<P: AsRef<Path>>(&mut self, project_dir: P) -> Result<Config> {
        self.load_global()?;
        self.load_from_env()?;
        self.load_project(project_dir)?;
        self.load_from_env_content()?;
        Ok(self.config.clone())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_paths(&self) -> &[PathBuf] {
        &self.config_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn get_global_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("prcraft/prcraft")
}

/// Substitute `{env:VAR}` patterns with environment variable values.
/// Works on the raw JSONC text before parsing.
fn substitute_env_vars(text: &str) -> String {
    ENV_REFERENCE
        .replace_all(text, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .to_string()
}

fn parse_jsonc(content: &str) -> Result<Config> {
    let parse_options = ParseOptions {
        allow_trailing_commas: true,
        ..Default::default()
    };
    let parsed = parse_to_serde_value(content, &parse_options)
        .with_context(|| "Failed to parse JSONC")?
        .context("Config content is empty")?;
    serde_json::from_value(parsed).with_context(|| "Failed to parse config JSON")
}

pub fn load_config<P: AsRef<Path>>(project_dir: P) -> Result<Config> {
    ConfigLoader::new().load_all(project_dir)
}
