use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::Config;

type HmacSha256 = Hmac<Sha256>;

pub const ACCESS_TOKEN_TTL_SECONDS: u32 = 3600;

/// Mints the short-lived bearer token the task backend verifies. One token is
/// minted per proxied request; nothing is cached or refreshed.
#[derive(Debug, Clone)]
pub struct AccessTokenIssuer {
    signing_key: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AccessTokenError {
    #[error("access token subject must not be empty")]
    SubjectRequired,
    #[error("{message}")]
    Unavailable { message: String },
}

#[derive(Debug, Clone)]
pub struct AccessTokenRequest {
    pub subject: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: u32,
    pub issued_at: i64,
    pub expires_at: i64,
    pub subject: String,
}

impl AccessTokenIssuer {
    pub fn from_config(config: &Config) -> Self {
        Self {
            signing_key: config.auth_secret.clone(),
        }
    }

    pub fn issue(
        &self,
        request: AccessTokenRequest,
    ) -> Result<IssuedAccessToken, AccessTokenError> {
        let signing_key = self.signing_key.trim();
        if signing_key.is_empty() {
            return Err(AccessTokenError::Unavailable {
                message: "access token signing key is not configured".to_string(),
            });
        }

        let subject = request.subject.trim().to_string();
        if subject.is_empty() {
            return Err(AccessTokenError::SubjectRequired);
        }

        let email = request
            .email
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string);

        let issued_at = Utc::now();
        let expires_at = issued_at + Duration::seconds(i64::from(ACCESS_TOKEN_TTL_SECONDS));

        let mut claims = serde_json::json!({
            "sub": subject,
            "iat": issued_at.timestamp(),
            "exp": expires_at.timestamp(),
        });

        if let Some(email) = email.as_ref() {
            claims["email"] = serde_json::Value::String(email.clone());
        }

        let header = serde_json::json!({
            "alg": "HS256",
            "typ": "JWT",
        });

        let token = encode_hs256_jwt(&header, &claims, signing_key)?;

        Ok(IssuedAccessToken {
            token,
            token_type: "Bearer",
            expires_in: ACCESS_TOKEN_TTL_SECONDS,
            issued_at: issued_at.timestamp(),
            expires_at: expires_at.timestamp(),
            subject,
        })
    }
}

fn encode_hs256_jwt(
    header: &serde_json::Value,
    claims: &serde_json::Value,
    signing_key: &str,
) -> Result<String, AccessTokenError> {
    let header_bytes =
        serde_json::to_vec(header).map_err(|error| AccessTokenError::Unavailable {
            message: format!("failed to encode access token header: {error}"),
        })?;
    let claims_bytes =
        serde_json::to_vec(claims).map_err(|error| AccessTokenError::Unavailable {
            message: format!("failed to encode access token claims: {error}"),
        })?;

    let header_segment = URL_SAFE_NO_PAD.encode(header_bytes);
    let claims_segment = URL_SAFE_NO_PAD.encode(claims_bytes);
    let signing_input = format!("{header_segment}.{claims_segment}");

    let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes()).map_err(|error| {
        AccessTokenError::Unavailable {
            message: format!("failed to initialize access token signer: {error}"),
        }
    })?;
    mac.update(signing_input.as_bytes());
    let signature_segment = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{signing_input}.{signature_segment}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_issuer() -> AccessTokenIssuer {
        AccessTokenIssuer::from_config(&Config::for_tests(PathBuf::from(".")))
    }

    fn decode_claims(token: &str) -> serde_json::Value {
        let claims_segment = token.split('.').nth(1).expect("claims segment");
        let claims_bytes = URL_SAFE_NO_PAD.decode(claims_segment).expect("base64url");
        serde_json::from_slice(&claims_bytes).expect("claims json")
    }

    #[test]
    fn access_token_issue_returns_expected_payload_shape() {
        let issued = test_issuer()
            .issue(AccessTokenRequest {
                subject: "user_123".to_string(),
                email: Some("user@example.com".to_string()),
            })
            .expect("token should issue");

        assert_eq!(issued.token_type, "Bearer");
        assert_eq!(issued.expires_in, ACCESS_TOKEN_TTL_SECONDS);
        assert_eq!(issued.subject, "user_123");
        assert_eq!(issued.expires_at - issued.issued_at, 3600);
        assert_eq!(issued.token.split('.').count(), 3);
    }

    #[test]
    fn access_token_claims_carry_subject_and_expiry() {
        let issued = test_issuer()
            .issue(AccessTokenRequest {
                subject: "user_123".to_string(),
                email: Some("user@example.com".to_string()),
            })
            .expect("token should issue");

        let claims = decode_claims(&issued.token);
        assert_eq!(claims["sub"], "user_123");
        assert_eq!(claims["email"], "user@example.com");
        let window = claims["exp"].as_i64().expect("exp") - claims["iat"].as_i64().expect("iat");
        assert_eq!(window, 3600);
    }

    #[test]
    fn access_token_omits_email_when_absent() {
        let issued = test_issuer()
            .issue(AccessTokenRequest {
                subject: "user_123".to_string(),
                email: None,
            })
            .expect("token should issue");

        let claims = decode_claims(&issued.token);
        assert!(claims.get("email").is_none());
    }

    #[test]
    fn access_token_signature_verifies_against_signing_input() {
        let issued = test_issuer()
            .issue(AccessTokenRequest {
                subject: "user_123".to_string(),
                email: None,
            })
            .expect("token should issue");

        let mut segments = issued.token.split('.');
        let header_segment = segments.next().expect("header segment");
        let claims_segment = segments.next().expect("claims segment");
        let signature_segment = segments.next().expect("signature segment");

        let mut mac = HmacSha256::new_from_slice(b"taskdeck-test-auth-secret").expect("mac");
        mac.update(format!("{header_segment}.{claims_segment}").as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        assert_eq!(signature_segment, expected);
    }

    #[test]
    fn access_token_issue_rejects_blank_subject() {
        let result = test_issuer().issue(AccessTokenRequest {
            subject: "   ".to_string(),
            email: None,
        });
        assert!(matches!(result, Err(AccessTokenError::SubjectRequired)));
    }

    #[test]
    fn access_token_issue_requires_signing_key() {
        let mut config = Config::for_tests(PathBuf::from("."));
        config.auth_secret = String::new();
        let issuer = AccessTokenIssuer::from_config(&config);

        let result = issuer.issue(AccessTokenRequest {
            subject: "user_123".to_string(),
            email: None,
        });
        assert!(matches!(result, Err(AccessTokenError::Unavailable { .. })));
    }
}
