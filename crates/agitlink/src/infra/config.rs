//! Configuration management utilities.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs_next::config_dir;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::domain::errors::LinkError;

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));

/// Layered configuration loaded from defaults, the user file, and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub remote: Remote,
    #[serde(default)]
    pub acme: Acme,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Remote {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    ssh_prefix: Option<String>,
}

impl Remote {
    fn default_host() -> &'static str {
        "github.com"
    }

    fn default_ssh_prefix() -> &'static str {
        "git@github.com:"
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or_else(|| Self::default_host())
    }

    pub fn ssh_prefix(&self) -> &str {
        self.ssh_prefix
            .as_deref()
            .unwrap_or_else(|| Self::default_ssh_prefix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Acme {
    #[serde(default)]
    chunk_size: Option<usize>,
    #[serde(default)]
    namespace: Option<PathBuf>,
}

impl Acme {
    fn default_chunk_size() -> usize {
        crate::infra::chunked::DEFAULT_CHUNK_SIZE
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or_else(Self::default_chunk_size)
    }

    pub fn namespace(&self) -> Option<&Path> {
        self.namespace.as_deref()
    }
}

/// Process environment, captured once at startup.
#[derive(Debug, Default, Clone)]
pub struct Environment {
    pub winid: Option<String>,
    pub namespace: Option<String>,
    pub user: Option<String>,
    pub display: Option<String>,
    pub host: Option<String>,
    pub config_path: Option<PathBuf>,
}

impl Environment {
    pub fn from_env() -> Self {
        let var = |name: &str| env::var(name).ok().filter(|value| !value.is_empty());
        Self {
            winid: var("winid"),
            namespace: var("NAMESPACE"),
            user: var("USER").or_else(|| var("LOGNAME")),
            display: var("DISPLAY"),
            host: var("AGITLINK_HOST"),
            config_path: var("AGITLINK_CONFIG").map(PathBuf::from),
        }
    }
}

impl Config {
    /// Load configuration from defaults, the user config file, and env overrides.
    pub fn load(env: &Environment) -> Result<Self> {
        let user_file = env.config_path.clone().or_else(user_config_path);
        Self::load_with_layers(user_file, env)
    }

    fn load_with_layers(user_file: Option<PathBuf>, env: &Environment) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::from_str(&DEFAULT_CONFIG)?);

        if let Some(path) = user_file.filter(|path| path.exists()) {
            layers.push(Self::from_file(&path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        Ok(apply_env_overrides(merged, env))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data).with_context(|| format!("in config file {}", path.display()))
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "failed to parse TOML config".to_string())?;
        Ok(config)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            remote: Remote {
                host: other.remote.host.or(self.remote.host),
                ssh_prefix: other.remote.ssh_prefix.or(self.remote.ssh_prefix),
            },
            acme: Acme {
                chunk_size: other.acme.chunk_size.or(self.acme.chunk_size),
                namespace: other.acme.namespace.or(self.acme.namespace),
            },
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("agitlink/config.toml"))
}

fn apply_env_overrides(mut config: Config, env: &Environment) -> Config {
    if let Some(host) = &env.host {
        config.remote.host = Some(host.clone());
    }
    if let Some(namespace) = &env.namespace {
        config.acme.namespace = Some(PathBuf::from(namespace));
    }
    config
}

/// Everything one run needs, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub window_id: u32,
    pub namespace: PathBuf,
    pub user: String,
    pub host: String,
    pub ssh_prefix: String,
    pub chunk_size: usize,
}

impl Invocation {
    /// Combine configuration, environment and an optional command-line window id.
    pub fn resolve(
        config: &Config,
        env: &Environment,
        winid_override: Option<u32>,
    ) -> Result<Self, LinkError> {
        let window_id = match winid_override {
            Some(id) => id,
            None => parse_winid(env.winid.as_deref())?,
        };

        let user = env.user.clone().ok_or_else(|| {
            LinkError::Config("cannot determine user name: $USER not set".to_owned())
        })?;

        let namespace = match config.acme.namespace() {
            Some(dir) => dir.to_path_buf(),
            None => default_namespace(&user, env.display.as_deref()),
        };

        let chunk_size = config.acme.chunk_size();
        if chunk_size == 0 {
            return Err(LinkError::Config(
                "acme.chunk_size must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            window_id,
            namespace,
            user,
            host: config.remote.host().to_owned(),
            ssh_prefix: config.remote.ssh_prefix().to_owned(),
            chunk_size,
        })
    }
}

fn parse_winid(winid: Option<&str>) -> Result<u32, LinkError> {
    let winid = winid.ok_or_else(|| {
        LinkError::Config("$winid not set - not running inside acme?".to_owned())
    })?;
    winid
        .trim()
        .parse()
        .map_err(|_| LinkError::Config(format!("invalid $winid {winid:?}")))
}

/// plan9port's namespace directory: `/tmp/ns.<user>.<display>`.
///
/// A missing display means `:0`; a trailing `.0` screen number is dropped and slashes
/// become underscores.
pub fn default_namespace(user: &str, display: Option<&str>) -> PathBuf {
    let mut display = display.unwrap_or(":0.0").to_owned();
    if let Some(colon) = display.rfind(':') {
        let digits = display[colon + 1..]
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        let screen = colon + 1 + digits;
        if &display[screen..] == ".0" {
            display.truncate(screen);
        }
    }
    let display = display.replace('/', "_");
    PathBuf::from(format!("/tmp/ns.{user}.{display}"))
}
