//! HS256 access-token verification, matching the tokens minted by the REST API.

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::{AuthFailure, Authenticator, UserIdentity};

/// Access-token claims. The REST API puts the user id in `sub`; older tokens
/// carry it as `userId` instead.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    pub exp: i64,
}

pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn verify(&self, credential: &str) -> Result<UserIdentity, AuthFailure> {
        let data = jsonwebtoken::decode::<AccessClaims>(credential, &self.key, &self.validation)
            .map_err(|e| {
                tracing::debug!(?e, "access token validation failed");
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthFailure::Expired,
                    ErrorKind::InvalidToken => AuthFailure::Malformed,
                    _ => AuthFailure::Invalid,
                }
            })?;

        let claims = data.claims;
        let user_id = claims
            .sub
            .or(claims.user_id)
            .filter(|id| !id.is_empty())
            .ok_or(AuthFailure::MissingSubject)?;

        Ok(UserIdentity {
            user_id,
            email: claims.email,
            role: claims.role,
        })
    }
}
