use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use taskdeck_backend_client::{DEFAULT_BACKEND_BASE_URL, DEFAULT_CHAT_HISTORY_LIMIT};
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_STATIC_DIR: &str = "apps/taskdeck.com/service/static";
const DEFAULT_SESSION_MODE: &str = "cookie";
const DEFAULT_SESSION_COOKIE_NAME: &str = "taskdeck.session_token";
const DEFAULT_PROTECTED_PATHS: &str = "/dashboard,/tasks,/chat";
const DEFAULT_AUTH_PATHS: &str = "/login,/signup";
const DEFAULT_LOGIN_PATH: &str = "/login";
const DEFAULT_LANDING_PATH: &str = "/dashboard";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub log_filter: String,
    pub static_dir: PathBuf,
    pub auth_secret: String,
    pub backend_base_url: String,
    pub session_mode: String,
    pub session_cookie_name: String,
    pub static_user_id: Option<String>,
    pub static_user_email: Option<String>,
    pub static_user_name: Option<String>,
    pub database_url: Option<String>,
    pub protected_paths: Vec<String>,
    pub auth_paths: Vec<String>,
    pub login_path: String,
    pub landing_path: String,
    pub chat_history_limit: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid TASKDECK_BIND_ADDR value '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("TASKDECK_AUTH_SECRET must be set to a non-empty value")]
    MissingAuthSecret,
    #[error("invalid TASKDECK_SESSION_MODE value '{value}' (expected 'cookie' or 'static')")]
    InvalidSessionMode { value: String },
    #[error("TASKDECK_STATIC_USER_ID must be set when TASKDECK_SESSION_MODE is 'static'")]
    MissingStaticIdentity,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr_raw = env::var("TASKDECK_BIND_ADDR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let bind_addr = bind_addr_raw
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddr {
                value: bind_addr_raw,
                source,
            })?;

        let log_filter = env::var("TASKDECK_LOG_FILTER")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let static_dir = env::var("TASKDECK_STATIC_DIR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR));

        let auth_secret = env::var("TASKDECK_AUTH_SECRET")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::MissingAuthSecret)?;

        let backend_base_url = env::var("TASKDECK_BACKEND_BASE_URL")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND_BASE_URL.to_string());

        let session_mode = resolve_session_mode(
            &env::var("TASKDECK_SESSION_MODE")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SESSION_MODE.to_string()),
        )?;

        let session_cookie_name = env::var("TASKDECK_SESSION_COOKIE")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_COOKIE_NAME.to_string());

        let static_user_id = env::var("TASKDECK_STATIC_USER_ID")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let static_user_email = env::var("TASKDECK_STATIC_USER_EMAIL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let static_user_name = env::var("TASKDECK_STATIC_USER_NAME")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        if session_mode == "static" && static_user_id.is_none() {
            return Err(ConfigError::MissingStaticIdentity);
        }

        let database_url = env::var("DATABASE_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let protected_paths = parse_csv(
            env::var("TASKDECK_PROTECTED_PATHS")
                .ok()
                .unwrap_or_else(|| DEFAULT_PROTECTED_PATHS.to_string()),
        );

        let auth_paths = parse_csv(
            env::var("TASKDECK_AUTH_PATHS")
                .ok()
                .unwrap_or_else(|| DEFAULT_AUTH_PATHS.to_string()),
        );

        let login_path = env::var("TASKDECK_LOGIN_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_string());

        let landing_path = env::var("TASKDECK_LANDING_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_LANDING_PATH.to_string());

        let chat_history_limit = env::var("TASKDECK_CHAT_HISTORY_LIMIT")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_CHAT_HISTORY_LIMIT);

        Ok(Self {
            bind_addr,
            log_filter,
            static_dir,
            auth_secret,
            backend_base_url,
            session_mode,
            session_cookie_name,
            static_user_id,
            static_user_email,
            static_user_name,
            database_url,
            protected_paths,
            auth_paths,
            login_path,
            landing_path,
            chat_history_limit,
        })
    }
}

#[cfg(test)]
impl Config {
    #[must_use]
    pub fn for_tests(static_dir: PathBuf) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_filter: "debug".to_string(),
            static_dir,
            auth_secret: "taskdeck-test-auth-secret".to_string(),
            backend_base_url: DEFAULT_BACKEND_BASE_URL.to_string(),
            session_mode: DEFAULT_SESSION_MODE.to_string(),
            session_cookie_name: DEFAULT_SESSION_COOKIE_NAME.to_string(),
            static_user_id: None,
            static_user_email: None,
            static_user_name: None,
            database_url: None,
            protected_paths: vec![
                "/dashboard".to_string(),
                "/tasks".to_string(),
                "/chat".to_string(),
            ],
            auth_paths: vec!["/login".to_string(), "/signup".to_string()],
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            landing_path: DEFAULT_LANDING_PATH.to_string(),
            chat_history_limit: DEFAULT_CHAT_HISTORY_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigError, resolve_session_mode};
    use std::path::PathBuf;

    #[test]
    fn test_fixture_covers_all_config_fields() {
        let config = Config::for_tests(PathBuf::from("."));
        assert_eq!(config.bind_addr.port(), 0);
        assert!(!config.auth_secret.is_empty());
        assert!(!config.protected_paths.is_empty());
        assert_eq!(config.session_mode, "cookie");
    }

    #[test]
    fn session_mode_accepts_known_values_case_insensitively() {
        assert_eq!(resolve_session_mode("cookie").unwrap(), "cookie");
        assert_eq!(resolve_session_mode(" Static ").unwrap(), "static");
    }

    #[test]
    fn session_mode_rejects_unknown_values() {
        let error = resolve_session_mode("jwt").unwrap_err();
        assert!(matches!(
            error,
            ConfigError::InvalidSessionMode { ref value } if value == "jwt"
        ));
    }
}

fn resolve_session_mode(raw: &str) -> Result<String, ConfigError> {
    let mode = raw.trim().to_lowercase();
    match mode.as_str() {
        "cookie" | "static" => Ok(mode),
        _ => Err(ConfigError::InvalidSessionMode {
            value: raw.trim().to_string(),
        }),
    }
}

fn parse_csv(value: String) -> Vec<String> {
    value
        .split(',')
        .map(|segment| segment.trim().to_string())
        .filter(|segment| !segment.is_empty())
        .collect()
}
