//! Profile Lambda - Profile and notification settings.
//!
//! Endpoints:
//! - PUT /profile - Update username, email, and optionally the password
//! - PUT /profile/notifications - Update notification settings
//!
//! Password changes are forwarded to Cognito; the `users` row only ever
//! holds profile data.

use aws_sdk_cognitoidentityprovider::types::AttributeType;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::Deserialize;
use shared::http::{error_response, json_response, ApiResponse};
use shared::models::{UserResponse, UserRow};
use shared::{parse_body, Config};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use validator::Validate;

/// Allowed notification digest frequencies
const NOTIFICATION_FREQUENCIES: [&str; 3] = ["daily", "weekly", "monthly"];

/// Update profile request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct UpdateProfileRequest {
    #[validate(length(min = 3, max = 32, message = "username must be 3-32 characters"))]
    username: String,
    #[validate(email(message = "email must be a valid address"))]
    email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    password: Option<String>,
}

/// Update notification settings request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationSettingsRequest {
    email_notifications: bool,
    push_notifications: bool,
    notification_frequency: String,
}

/// Application state
struct AppState {
    db_pool: PgPool,
    cognito: CognitoClient,
    user_pool_id: String,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env().map_err(|e| format!("Incomplete environment: {}", e))?;
        let user_pool_id = config
            .cognito_user_pool_id
            .clone()
            .ok_or("COGNITO_USER_POOL_ID not set")?;

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let secrets_client = aws_sdk_secretsmanager::Client::new(&aws_config);
        let cognito = CognitoClient::new(&aws_config);

        let creds =
            shared::get_database_credentials(&secrets_client, &config.db_secret_arn).await?;
        let db_pool = shared::create_pool(&config, &creds).await?;

        Ok(Self {
            db_pool,
            cognito,
            user_pool_id,
        })
    }
}

fn is_valid_frequency(frequency: &str) -> bool {
    NOTIFICATION_FREQUENCIES.contains(&frequency)
}

const USER_COLUMNS: &str = "id, username, email, email_notifications, push_notifications, \
                            notification_frequency, created_at, updated_at";

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let method = event.method().as_str();

    let sub = match shared::caller_sub(&event) {
        Ok(sub) => sub,
        Err(e) => return error_response(401, format!("Authentication required: {}", e)),
    };

    let user_id = match shared::user_id_for_sub(&state.db_pool, &sub)
        .await
        .map_err(|e| format!("Failed to look up user: {}", e))?
    {
        Some(id) => id,
        None => return error_response(401, "User not registered"),
    };

    match (method, path) {
        // Update profile
        ("PUT", "/profile") => {
            let request: UpdateProfileRequest = parse_body!(event.body());

            if let Err(e) = request.validate() {
                return error_response(400, format!("Validation failed: {}", e));
            }

            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM users \
                 WHERE (username = $1 OR email = $2) AND id <> $3)",
            )
            .bind(&request.username)
            .bind(&request.email)
            .bind(user_id)
            .fetch_one(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to check existing users: {}", e))?;

            if taken {
                return error_response(409, "Username or email already exists");
            }

            let current_email: String =
                sqlx::query_scalar("SELECT email FROM users WHERE id = $1")
                    .bind(user_id)
                    .fetch_one(&state.db_pool)
                    .await
                    .map_err(|e| format!("Failed to fetch user: {}", e))?;

            if let Some(password) = &request.password {
                if let Err(e) = state
                    .cognito
                    .admin_set_user_password()
                    .user_pool_id(&state.user_pool_id)
                    .username(&sub)
                    .password(password)
                    .permanent(true)
                    .send()
                    .await
                {
                    error!("Cognito password update failed: {}", e.into_service_error());
                    return error_response(500, "Failed to update password");
                }
            }

            // Keep the Cognito email attribute in step so login by the new
            // address keeps working.
            if request.email != current_email {
                let email_attr = AttributeType::builder()
                    .name("email")
                    .value(&request.email)
                    .build()
                    .map_err(|e| format!("Failed to build email attribute: {}", e))?;
                let verified_attr = AttributeType::builder()
                    .name("email_verified")
                    .value("true")
                    .build()
                    .map_err(|e| format!("Failed to build email attribute: {}", e))?;

                if let Err(e) = state
                    .cognito
                    .admin_update_user_attributes()
                    .user_pool_id(&state.user_pool_id)
                    .username(&sub)
                    .user_attributes(email_attr)
                    .user_attributes(verified_attr)
                    .send()
                    .await
                {
                    error!("Cognito email update failed: {}", e.into_service_error());
                    return error_response(500, "Failed to update email");
                }
            }

            let row: UserRow = sqlx::query_as(&format!(
                "UPDATE users SET username = $1, email = $2, updated_at = NOW() \
                 WHERE id = $3 RETURNING {USER_COLUMNS}"
            ))
            .bind(&request.username)
            .bind(&request.email)
            .bind(user_id)
            .fetch_one(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to update profile: {}", e))?;

            info!("Updated profile for user {}", user_id);

            json_response(200, &ApiResponse::success(UserResponse::from(row)))
        }

        // Update notification settings
        ("PUT", "/profile/notifications") => {
            let request: NotificationSettingsRequest = parse_body!(event.body());

            if !is_valid_frequency(&request.notification_frequency) {
                return error_response(
                    400,
                    format!(
                        "Notification frequency must be one of: {:?}",
                        NOTIFICATION_FREQUENCIES
                    ),
                );
            }

            sqlx::query(
                "UPDATE users SET email_notifications = $1, push_notifications = $2, \
                 notification_frequency = $3, updated_at = NOW() WHERE id = $4",
            )
            .bind(request.email_notifications)
            .bind(request.push_notifications)
            .bind(&request.notification_frequency)
            .bind(user_id)
            .execute(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to update notification settings: {}", e))?;

            info!("Updated notification settings for user {}", user_id);

            json_response(
                200,
                &ApiResponse::success(serde_json::json!({
                    "message": "Notification settings updated"
                })),
            )
        }

        (_, "/profile") | (_, "/profile/notifications") => {
            error_response(405, "Method not allowed")
        }

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

    fn profile(username: &str, email: &str, password: Option<&str>) -> UpdateProfileRequest {
        UpdateProfileRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.map(String::from),
        }
    }

    #[test]
    fn test_profile_update_without_password_is_valid() {
        assert!(profile("taro", "taro@example.com", None).validate().is_ok());
    }

    #[test]
    fn test_profile_update_rejects_short_password() {
        assert!(profile("taro", "taro@example.com", Some("short"))
            .validate()
            .is_err());
    }

    #[test]
    fn test_profile_update_rejects_bad_email() {
        assert!(profile("taro", "nope", None).validate().is_err());
    }

    #[test]
    fn test_notification_frequencies() {
        assert!(is_valid_frequency("daily"));
        assert!(is_valid_frequency("weekly"));
        assert!(is_valid_frequency("monthly"));
        assert!(!is_valid_frequency("hourly"));
        assert!(!is_valid_frequency(""));
    }
}
