//! JWT authentication utilities.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use lambda_http::{Request, RequestExt};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// JWT claims from a Cognito id token.
#[derive(Debug, Serialize, Deserialize)]
pub struct CognitoClaims {
    /// Subject (user id)
    pub sub: String,
    /// Email
    pub email: Option<String>,
    /// Cognito username
    #[serde(rename = "cognito:username")]
    pub cognito_username: Option<String>,
    /// Token use (access or id)
    pub token_use: String,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

/// Decoded user information from JWT.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// User's Cognito subject (UUID)
    pub sub: String,
    /// User's email
    pub email: Option<String>,
}

impl From<CognitoClaims> for AuthenticatedUser {
    fn from(claims: CognitoClaims) -> Self {
        Self {
            sub: claims.sub,
            email: claims.email.or(claims.cognito_username),
        }
    }
}

/// Decode a Cognito JWT and extract user information.
///
/// Note: signature verification is the API Gateway authorizer's job; this
/// only decodes the claims, e.g. to resolve the subject right after login.
pub fn validate_token(token: &str) -> Result<AuthenticatedUser> {
    // Skip "Bearer " prefix if present
    let token = token.strip_prefix("Bearer ").unwrap_or(token);

    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;

    // Use a dummy key since we're not validating signature
    let key = DecodingKey::from_secret(b"dummy");

    let token_data = decode::<CognitoClaims>(token, &key, &validation)
        .map_err(|e| Error::Auth(format!("Failed to decode token: {}", e)))?;

    Ok(AuthenticatedUser::from(token_data.claims))
}

/// Extract the caller's Cognito subject from the API Gateway request context.
///
/// With a Cognito authorizer in front, the validated claims land in
/// requestContext.authorizer.claims.
pub fn caller_sub(event: &Request) -> Result<String> {
    let context = event
        .request_context_ref()
        .ok_or_else(|| Error::Auth("Missing request context".to_string()))?;

    let claims = context
        .authorizer()
        .and_then(|a| a.fields.get("claims"))
        .ok_or_else(|| Error::Auth("Missing claims in authorizer context".to_string()))?;

    let sub = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Auth("Missing sub claim".to_string()))?;

    Ok(sub.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticated_user_prefers_email() {
        let claims = CognitoClaims {
            sub: "7b41f120-2d7f-4f28-a1af-6e1b6d2f5f55".to_string(),
            email: Some("taro@example.com".to_string()),
            cognito_username: Some("taro".to_string()),
            token_use: "id".to_string(),
            iat: 0,
            exp: 0,
            iss: "https://cognito-idp.us-east-1.amazonaws.com/pool-id".to_string(),
        };

        let user = AuthenticatedUser::from(claims);
        assert_eq!(user.email.as_deref(), Some("taro@example.com"));
    }

    #[test]
    fn test_authenticated_user_falls_back_to_username() {
        let claims = CognitoClaims {
            sub: "7b41f120-2d7f-4f28-a1af-6e1b6d2f5f55".to_string(),
            email: None,
            cognito_username: Some("taro".to_string()),
            token_use: "id".to_string(),
            iat: 0,
            exp: 0,
            iss: "https://cognito-idp.us-east-1.amazonaws.com/pool-id".to_string(),
        };

        let user = AuthenticatedUser::from(claims);
        assert_eq!(user.email.as_deref(), Some("taro"));
    }

    #[test]
    fn test_validate_token_rejects_garbage() {
        assert!(validate_token("Bearer not-a-jwt").is_err());
    }
}
