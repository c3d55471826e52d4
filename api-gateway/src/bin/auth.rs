//! Auth Lambda - Registration and login.
//!
//! Endpoints:
//! - POST /auth/register - Create a Cognito user and the application user record
//! - POST /auth/login - Exchange username/password for a Cognito token
//!
//! Credential storage and token issuance are Cognito's job; this Lambda only
//! shapes the requests and keeps the `users` table in step.

use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::{Deserialize, Serialize};
use shared::http::{error_response, json_response, ApiResponse};
use shared::models::{UserResponse, UserRow};
use shared::{parse_body, Config};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    #[validate(length(min = 3, max = 32, message = "username must be 3-32 characters"))]
    username: String,
    #[validate(email(message = "email must be a valid address"))]
    email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    password: String,
}

/// Login request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    username: String,
    password: String,
}

/// Login response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    expires_in: i32,
    user: UserResponse,
}

/// Application state
struct AppState {
    db_pool: PgPool,
    cognito: CognitoClient,
    client_id: String,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env().map_err(|e| format!("Incomplete environment: {}", e))?;
        let client_id = config
            .cognito_client_id
            .clone()
            .ok_or("COGNITO_CLIENT_ID not set")?;

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let secrets_client = aws_sdk_secretsmanager::Client::new(&aws_config);
        let cognito = CognitoClient::new(&aws_config);

        let creds =
            shared::get_database_credentials(&secrets_client, &config.db_secret_arn).await?;
        let db_pool = shared::create_pool(&config, &creds).await?;

        Ok(Self {
            db_pool,
            cognito,
            client_id,
        })
    }
}

const USER_COLUMNS: &str = "id, username, email, email_notifications, push_notifications, \
                            notification_frequency, created_at, updated_at";

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let method = event.method().as_str();

    match (method, path) {
        ("POST", "/auth/register") => {
            let request: RegisterRequest = parse_body!(event.body());

            if let Err(e) = request.validate() {
                return error_response(400, format!("Validation failed: {}", e));
            }

            // Uniqueness check before touching Cognito, so a taken name
            // never leaves a half-registered identity behind.
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 OR email = $2)",
            )
            .bind(&request.username)
            .bind(&request.email)
            .fetch_one(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to check existing users: {}", e))?;

            if taken {
                return error_response(409, "Username or email already exists");
            }

            let email_attr = AttributeType::builder()
                .name("email")
                .value(&request.email)
                .build()
                .map_err(|e| format!("Failed to build email attribute: {}", e))?;

            let signup = match state
                .cognito
                .sign_up()
                .client_id(&state.client_id)
                .username(&request.email)
                .password(&request.password)
                .user_attributes(email_attr)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    let service_err = e.into_service_error();
                    if service_err.is_username_exists_exception() {
                        return error_response(409, "Username or email already exists");
                    }
                    if service_err.is_invalid_password_exception() {
                        return error_response(400, "Password does not meet requirements");
                    }
                    error!("Cognito sign_up failed: {}", service_err);
                    return error_response(500, "Registration failed");
                }
            };

            let sub = signup.user_sub().to_string();

            let row: UserRow = sqlx::query_as(&format!(
                "INSERT INTO users (id, username, email, cognito_sub) \
                 VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(&request.username)
            .bind(&request.email)
            .bind(&sub)
            .fetch_one(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to create user: {}", e))?;

            info!("Registered user {} ({})", row.id, row.username);

            json_response(201, &ApiResponse::success(UserResponse::from(row)))
        }

        ("POST", "/auth/login") => {
            let request: LoginRequest = parse_body!(event.body());

            if request.username.is_empty() || request.password.is_empty() {
                return error_response(400, "Username and password are required");
            }

            // The login form accepts either the username or the email; Cognito
            // only knows the email, so resolve it first.
            let email: Option<String> = sqlx::query_scalar(
                "SELECT email FROM users WHERE username = $1 OR email = $1",
            )
            .bind(&request.username)
            .fetch_optional(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to look up user: {}", e))?;

            let Some(email) = email else {
                return error_response(401, "Invalid username or password");
            };

            let auth = match state
                .cognito
                .initiate_auth()
                .client_id(&state.client_id)
                .auth_flow(AuthFlowType::UserPasswordAuth)
                .auth_parameters("USERNAME", &email)
                .auth_parameters("PASSWORD", &request.password)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    let service_err = e.into_service_error();
                    if service_err.is_not_authorized_exception()
                        || service_err.is_user_not_found_exception()
                    {
                        return error_response(401, "Invalid username or password");
                    }
                    error!("Cognito initiate_auth failed: {}", service_err);
                    return error_response(500, "Login failed");
                }
            };

            let Some(result) = auth.authentication_result() else {
                // A challenge (e.g. forced password reset) has no token to hand out.
                return error_response(401, "Additional authentication required");
            };
            let token = result
                .id_token()
                .ok_or("Cognito returned no id token")?
                .to_string();

            let caller = shared::validate_token(&token)
                .map_err(|e| format!("Failed to decode issued token: {}", e))?;

            let row: Option<UserRow> = sqlx::query_as(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE cognito_sub = $1"
            ))
            .bind(&caller.sub)
            .fetch_optional(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to fetch user: {}", e))?;

            let Some(row) = row else {
                return error_response(401, "User not registered");
            };

            info!("User {} logged in", row.id);

            json_response(
                200,
                &ApiResponse::success(LoginResponse {
                    token,
                    expires_in: result.expires_in(),
                    user: UserResponse::from(row),
                }),
            )
        }

        (_, "/auth/register") | (_, "/auth/login") => error_response(405, "Method not allowed"),

        _ => error_response(404, "Not found"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_register_accepts_well_formed_request() {
        assert!(register("taro", "taro@example.com", "s3cretpass").validate().is_ok());
    }

    #[test]
    fn test_register_rejects_short_password() {
        assert!(register("taro", "taro@example.com", "short").validate().is_err());
    }

    #[test]
    fn test_register_rejects_bad_email() {
        assert!(register("taro", "not-an-email", "s3cretpass").validate().is_err());
    }

    #[test]
    fn test_register_rejects_short_username() {
        assert!(register("ta", "taro@example.com", "s3cretpass").validate().is_err());
    }
}
