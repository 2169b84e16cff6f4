use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub server_url: String,
    pub ws_url: Option<String>,
    pub username: Option<String>,
    pub db_path: Option<String>,
    #[serde(default = "default_true")]
    pub notifications: bool,
}

fn default_true() -> bool {
    true
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config dir available"))?
        .join("mail_console"))
}

pub fn config_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("config.toml");
    Ok(p)
}

pub fn default_db_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("console.db");
    Ok(p)
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        // create a template config for users to edit
        let sample = Config {
            server_url: "http://127.0.0.1:5000".to_string(),
            ws_url: None,
            username: Some("admin".to_string()),
            db_path: None,
            notifications: true,
        };
        let tom = toml::to_string_pretty(&sample)?;
        fs::write(path, tom)?;
        return Err(anyhow!(
            "Created template config at {} — edit it and run again",
            path.display()
        ));
    }
    let s = fs::read_to_string(path)?;
    let cfg: Config =
        toml::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}

impl Config {
    pub fn server_url(&self) -> Result<Url> {
        Url::parse(&self.server_url)
            .with_context(|| format!("invalid server_url '{}'", self.server_url))
    }

    /// Push channel endpoint: `ws_url` if set, otherwise `/ws` on the server
    /// with the scheme switched to ws/wss.
    pub fn ws_url(&self) -> Result<Url> {
        if let Some(ws) = &self.ws_url {
            return Url::parse(ws).with_context(|| format!("invalid ws_url '{ws}'"));
        }
        let mut u = self.server_url()?;
        let scheme = match u.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => return Err(anyhow!("cannot derive push url from scheme '{other}'")),
        };
        u.set_scheme(scheme)
            .map_err(|_| anyhow!("cannot derive push url from {}", self.server_url))?;
        u.set_path("/ws");
        u.set_query(None);
        Ok(u)
    }

    /// Keyring account the bearer token is stored under.
    pub fn account(&self) -> String {
        match &self.username {
            Some(user) => format!("{user}@{}", self.server_url),
            None => self.server_url.clone(),
        }
    }
}

pub fn resolve_db_path(cfg: &Config) -> Result<PathBuf> {
    if let Some(p) = &cfg.db_path {
        Ok(PathBuf::from(p))
    } else {
        default_db_path()
    }
}
