use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::config::Config;

type HmacSha256 = Hmac<Sha256>;

/// Who the browser session belongs to. `user_id` doubles as the backend
/// namespace segment for every proxied call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

pub trait SessionResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity>;

    // Page routing only needs to know a session exists; claims are checked
    // when a proxied call actually needs an identity.
    fn session_present(&self, headers: &HeaderMap) -> bool {
        self.resolve(headers).is_some()
    }
}

#[derive(Clone)]
pub struct SessionService {
    cookie_name: String,
    resolver: Arc<dyn SessionResolver>,
}

impl SessionService {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cookie_name: config.session_cookie_name.clone(),
            resolver: resolver_from_config(config),
        }
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn session_present(&self, headers: &HeaderMap) -> bool {
        self.resolver.session_present(headers)
    }

    #[must_use]
    pub fn resolve_identity(&self, headers: &HeaderMap) -> Option<Identity> {
        self.resolver.resolve(headers)
    }
}

fn resolver_from_config(config: &Config) -> Arc<dyn SessionResolver> {
    match config.session_mode.as_str() {
        "static" => Arc::new(StaticSessionResolver {
            identity: config.static_user_id.as_ref().map(|user_id| Identity {
                user_id: user_id.clone(),
                email: config.static_user_email.clone(),
                display_name: config.static_user_name.clone(),
            }),
        }),
        _ => Arc::new(CookieSessionResolver {
            cookie_name: config.session_cookie_name.clone(),
            verification_key: config.auth_secret.clone(),
        }),
    }
}

/// Verifies the HS256 session token carried in the session cookie. The MAC is
/// checked before any claim is trusted, so the header segment is never
/// inspected on its own.
struct CookieSessionResolver {
    cookie_name: String,
    verification_key: String,
}

impl SessionResolver for CookieSessionResolver {
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        let token = extract_cookie_value(headers, &self.cookie_name)?;
        decode_session_token(&token, &self.verification_key)
    }

    fn session_present(&self, headers: &HeaderMap) -> bool {
        extract_cookie_value(headers, &self.cookie_name).is_some()
    }
}

/// Fixed identity for local development. Fails closed when no user id is
/// configured.
struct StaticSessionResolver {
    identity: Option<Identity>,
}

impl SessionResolver for StaticSessionResolver {
    fn resolve(&self, _headers: &HeaderMap) -> Option<Identity> {
        self.identity.clone()
    }
}

#[derive(Debug, Deserialize)]
struct SessionClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    exp: i64,
}

fn decode_session_token(token: &str, verification_key: &str) -> Option<Identity> {
    let mut segments = token.split('.');
    let header_segment = segments.next()?;
    let claims_segment = segments.next()?;
    let signature_segment = segments.next()?;
    if segments.next().is_some() {
        return None;
    }

    let signing_input = format!("{header_segment}.{claims_segment}");
    if !verify_signature(&signing_input, signature_segment, verification_key) {
        return None;
    }

    let claims_bytes = URL_SAFE_NO_PAD.decode(claims_segment).ok()?;
    let claims: SessionClaims = serde_json::from_slice(&claims_bytes).ok()?;
    if claims.exp <= Utc::now().timestamp() {
        return None;
    }

    let user_id = claims.sub.trim().to_string();
    if user_id.is_empty() {
        return None;
    }

    Some(Identity {
        user_id,
        email: claims.email.and_then(non_empty_claim),
        display_name: claims.name.and_then(non_empty_claim),
    })
}

fn verify_signature(signing_input: &str, signature_segment: &str, verification_key: &str) -> bool {
    let Ok(signature) = URL_SAFE_NO_PAD.decode(signature_segment) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(verification_key.as_bytes()) else {
        return false;
    };
    mac.update(signing_input.as_bytes());
    mac.verify_slice(&signature).is_ok()
}

pub(crate) fn extract_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    for part in raw.split(';') {
        let mut pieces = part.trim().splitn(2, '=');
        let key = pieces.next()?.trim();
        let value = pieces.next()?.trim();

        if key == cookie_name {
            return non_empty_claim(value.to_string());
        }
    }

    None
}

fn non_empty_claim(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
pub(crate) fn mint_session_token(
    secret: &str,
    sub: &str,
    email: Option<&str>,
    name: Option<&str>,
    exp: i64,
) -> String {
    let header = serde_json::json!({"alg": "HS256", "typ": "JWT"});
    let mut claims = serde_json::json!({
        "sub": sub,
        "iat": Utc::now().timestamp(),
        "exp": exp,
    });
    if let Some(email) = email {
        claims["email"] = serde_json::Value::String(email.to_string());
    }
    if let Some(name) = name {
        claims["name"] = serde_json::Value::String(name.to_string());
    }

    let header_segment = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).expect("header json"));
    let claims_segment = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("claims json"));
    let signing_input = format!("{header_segment}.{claims_segment}");

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("mac key");
    mac.update(signing_input.as_bytes());
    let signature_segment = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{signing_input}.{signature_segment}")
}
