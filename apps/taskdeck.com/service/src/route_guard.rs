use crate::config::Config;

pub const RETURN_TARGET_PARAM: &str = "redirect";

/// What the shell handler should do with a page request. Redirect locations
/// are site-relative and already carry the return target where one applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    PassThrough,
    RedirectToLogin { location: String },
    RedirectToLanding { location: String },
}

impl RouteDecision {
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::PassThrough => "pass_through",
            Self::RedirectToLogin { .. } => "protected_without_session",
            Self::RedirectToLanding { .. } => "auth_page_with_session",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteGuardService {
    protected_paths: Vec<String>,
    auth_paths: Vec<String>,
    login_path: String,
    landing_path: String,
}

impl RouteGuardService {
    pub fn from_config(config: &Config) -> Self {
        Self {
            protected_paths: normalize_routes(&config.protected_paths),
            auth_paths: normalize_routes(&config.auth_paths),
            login_path: normalize_path(&config.login_path),
            landing_path: normalize_path(&config.landing_path),
        }
    }

    /// Presence is all that matters here; claim validation happens when a
    /// proxied call needs an identity, not when a page is routed.
    pub fn evaluate(&self, path: &str, session_present: bool) -> RouteDecision {
        let normalized = normalize_path(path);

        if !session_present && matches_any(&normalized, &self.protected_paths) {
            return RouteDecision::RedirectToLogin {
                location: format!(
                    "{}?{}={}",
                    self.login_path, RETURN_TARGET_PARAM, normalized
                ),
            };
        }

        if session_present && matches_any(&normalized, &self.auth_paths) {
            return RouteDecision::RedirectToLanding {
                location: self.landing_path.clone(),
            };
        }

        RouteDecision::PassThrough
    }
}

fn matches_any(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        if prefix == "/" {
            return path == "/";
        }
        path == *prefix || path.starts_with(&format!("{prefix}/"))
    })
}

fn normalize_routes(routes: &[String]) -> Vec<String> {
    let mut normalized = Vec::new();
    for route in routes {
        let path = normalize_path(route);
        if !normalized.iter().any(|existing| existing == &path) {
            normalized.push(path);
        }
    }
    normalized
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return "/".to_string();
    }
    let mut normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    while normalized.contains("//") {
        normalized = normalized.replace("//", "/");
    }
    normalized.trim_end_matches('/').to_string()
}
