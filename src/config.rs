use std::{num::NonZeroU64, path::Path, time::Duration};

use minijinja::Environment;
use url::Url;

use crate::notify::TelegramConfig;
use crate::restart::RESTART_GRACE_WINDOW;

const DEFAULT_CONTAINER: &str = "piveau-hub-search";
const DEFAULT_ENDPOINT: &str =
    "https://${ project }.fokus.fraunhofer.de/search/search?filter=dataset&limit=10&page=0";
const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

pub const PROJECT_VAR: &str = "PROJECT";
pub const TELEGRAM_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
pub const TELEGRAM_CHAT_VAR: &str = "TELEGRAM_CHAT_ID";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Templating error: {0:?}")]
    Template(#[from] minijinja::Error),
    #[error("Invalid endpoint URL {0:?}: {1}")]
    Url(String, url::ParseError),
}

fn default_container() -> String {
    DEFAULT_CONTAINER.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_expected_status() -> u16 {
    200
}

fn default_check_timeout() -> NonZeroU64 {
    const CHECK_TIMEOUT: NonZeroU64 = NonZeroU64::new(120).unwrap();
    CHECK_TIMEOUT
}

fn default_docker_timeout() -> NonZeroU64 {
    const DOCKER_TIMEOUT: NonZeroU64 = NonZeroU64::new(60).unwrap();
    DOCKER_TIMEOUT
}

fn default_restart_stop() -> u32 {
    10
}

fn default_grace_window() -> NonZeroU64 {
    const GRACE_WINDOW: NonZeroU64 = NonZeroU64::new(RESTART_GRACE_WINDOW.as_secs()).unwrap();
    GRACE_WINDOW
}

fn default_notify_timeout() -> NonZeroU64 {
    const NOTIFY_TIMEOUT: NonZeroU64 = NonZeroU64::new(10).unwrap();
    NOTIFY_TIMEOUT
}

fn default_telegram_api() -> String {
    DEFAULT_TELEGRAM_API.to_string()
}

/// On-disk representation of `hubwatch.toml`. Every field is optional.
#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchdogConfigFile {
    /// Name of the container restarted when the endpoint is inactive.
    #[serde(default = "default_container")]
    pub container: String,
    /// Endpoint template. `${ project }` is replaced with `PROJECT`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    #[serde(default = "default_check_timeout")]
    pub check_timeout_secs: NonZeroU64,
    #[serde(default = "default_docker_timeout")]
    pub docker_timeout_secs: NonZeroU64,
    /// Seconds Docker waits for the container to stop before killing it.
    #[serde(default = "default_restart_stop")]
    pub restart_stop_secs: u32,
    #[serde(default = "default_grace_window")]
    pub grace_window_secs: NonZeroU64,
    #[serde(default = "default_notify_timeout")]
    pub notify_timeout_secs: NonZeroU64,
    #[serde(default)]
    pub telegram: TelegramFileEntry,
}

impl Default for WatchdogConfigFile {
    fn default() -> Self {
        Self {
            container: default_container(),
            endpoint: default_endpoint(),
            expected_status: default_expected_status(),
            check_timeout_secs: default_check_timeout(),
            docker_timeout_secs: default_docker_timeout(),
            restart_stop_secs: default_restart_stop(),
            grace_window_secs: default_grace_window(),
            notify_timeout_secs: default_notify_timeout(),
            telegram: TelegramFileEntry::default(),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramFileEntry {
    pub token: Option<String>,
    pub chat_id: Option<String>,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

impl Default for TelegramFileEntry {
    fn default() -> Self {
        Self {
            token: None,
            chat_id: None,
            api_base: default_telegram_api(),
        }
    }
}

impl WatchdogConfigFile {
    fn try_init_from_string(val: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(val)?)
    }

    /// Reads the config file. A file that does not exist yields the defaults.
    pub fn try_init(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::try_init_from_string(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config file at {path:?}, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Fully resolved settings for one watchdog cycle.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub project: String,
    pub endpoint: Url,
    pub expected_status: u16,
    pub check_timeout: Duration,
    pub container: String,
    pub docker_timeout: Duration,
    pub restart_stop_secs: u32,
    pub grace_window: Duration,
    /// `None` when no bot token or chat id is configured.
    pub telegram: Option<TelegramConfig>,
}

impl WatchdogConfig {
    /// Loads the config file at `path` and overlays the process environment.
    pub fn try_init(path: &Path) -> Result<Self, ConfigError> {
        let file = WatchdogConfigFile::try_init(path)?;
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Resolves the final configuration. `env` looks up environment values,
    /// empty values count as absent.
    pub fn resolve<F>(file: WatchdogConfigFile, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let project = env(PROJECT_VAR).ok_or(ConfigError::Missing(PROJECT_VAR))?;
        let rendered = render_endpoint(&file.endpoint, &project)?;
        let endpoint = Url::parse(&rendered).map_err(|e| ConfigError::Url(rendered, e))?;

        let token = env(TELEGRAM_TOKEN_VAR).or(file.telegram.token);
        let chat_id = env(TELEGRAM_CHAT_VAR).or(file.telegram.chat_id);
        let telegram = match (token, chat_id) {
            (Some(token), Some(chat_id)) => Some(TelegramConfig {
                token,
                chat_id,
                api_base: file.telegram.api_base,
                timeout: Duration::from_secs(file.notify_timeout_secs.get()),
            }),
            _ => None,
        };

        Ok(Self {
            project,
            endpoint,
            expected_status: file.expected_status,
            check_timeout: Duration::from_secs(file.check_timeout_secs.get()),
            container: file.container,
            docker_timeout: Duration::from_secs(file.docker_timeout_secs.get()),
            restart_stop_secs: file.restart_stop_secs,
            grace_window: Duration::from_secs(file.grace_window_secs.get()),
            telegram,
        })
    }
}

/// Renders the endpoint template with `${ ... }` delimiters.
/// Unknown variables are an error.
pub fn render_endpoint(template_str: &str, project: &str) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();

    let syntax = minijinja::syntax::SyntaxConfig::builder()
        .variable_delimiters("${", "}")
        .build()?;

    env.set_syntax(syntax);
    env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);

    let template = env.template_from_str(template_str)?;
    template.render(minijinja::context! { project => project })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_project_is_fatal() {
        let res = WatchdogConfig::resolve(WatchdogConfigFile::default(), lookup(&[]));
        assert!(
            matches!(res, Err(ConfigError::Missing(PROJECT_VAR))),
            "{:?}",
            res
        );
        let msg = res.unwrap_err().to_string();
        assert!(msg.contains("PROJECT"), "{msg}");
    }

    #[test]
    fn test_blank_project_is_missing() {
        let res =
            WatchdogConfig::resolve(WatchdogConfigFile::default(), lookup(&[("PROJECT", "  ")]));
        assert!(matches!(res, Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_defaults() {
        let cfg = WatchdogConfig::resolve(
            WatchdogConfigFile::default(),
            lookup(&[("PROJECT", "meta4ds")]),
        )
        .unwrap();
        assert_eq!(
            cfg.endpoint.as_str(),
            "https://meta4ds.fokus.fraunhofer.de/search/search?filter=dataset&limit=10&page=0"
        );
        assert_eq!(cfg.container, "piveau-hub-search");
        assert_eq!(cfg.expected_status, 200);
        assert_eq!(cfg.check_timeout, Duration::from_secs(120));
        assert_eq!(cfg.grace_window, Duration::from_secs(120));
        assert!(cfg.telegram.is_none());
    }

    #[test]
    fn test_file_and_env_layers() {
        let file = WatchdogConfigFile::try_init_from_string(
            r#"
            container = "hub-search"
            endpoint = "http://${ project }.local:8080/search"
            grace_window_secs = 90

            [telegram]
            chat_id = "@from_file"
            api_base = "http://127.0.0.1:9999"
            "#,
        )
        .expect("Failed to parse config");

        let cfg = WatchdogConfig::resolve(
            file,
            lookup(&[
                ("PROJECT", "quadriga"),
                ("TELEGRAM_BOT_TOKEN", "secret"),
                ("TELEGRAM_CHAT_ID", "@from_env"),
            ]),
        )
        .unwrap();

        assert_eq!(cfg.endpoint.as_str(), "http://quadriga.local:8080/search");
        assert_eq!(cfg.container, "hub-search");
        assert_eq!(cfg.grace_window, Duration::from_secs(90));
        let telegram = cfg.telegram.expect("telegram configured");
        assert_eq!(telegram.token, "secret");
        assert_eq!(telegram.chat_id, "@from_env");
        assert_eq!(telegram.api_base, "http://127.0.0.1:9999");
        assert_eq!(telegram.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_telegram_requires_token_and_chat() {
        let cfg = WatchdogConfig::resolve(
            WatchdogConfigFile::default(),
            lookup(&[("PROJECT", "meta4cat"), ("TELEGRAM_CHAT_ID", "@chan")]),
        )
        .unwrap();
        assert!(cfg.telegram.is_none());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let res = WatchdogConfigFile::try_init_from_string("check_timeout_secs = 0");
        assert!(matches!(res, Err(ConfigError::Toml(_))), "{:?}", res);
    }

    #[test]
    fn test_unknown_template_variable() {
        let file = WatchdogConfigFile {
            endpoint: "https://${ host }/search".to_string(),
            ..Default::default()
        };
        let res = WatchdogConfig::resolve(file, lookup(&[("PROJECT", "meta4ds")]));
        assert!(matches!(res, Err(ConfigError::Template(_))), "{:?}", res);
    }

    #[test]
    fn test_invalid_url() {
        let file = WatchdogConfigFile {
            endpoint: "not a url ${ project }".to_string(),
            ..Default::default()
        };
        let res = WatchdogConfig::resolve(file, lookup(&[("PROJECT", "meta4ds")]));
        assert!(matches!(res, Err(ConfigError::Url(_, _))), "{:?}", res);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = WatchdogConfigFile::try_init(&dir.path().join("hubwatch.toml")).unwrap();
        assert_eq!(file.container, "piveau-hub-search");
    }
}
