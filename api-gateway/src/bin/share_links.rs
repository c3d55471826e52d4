//! Share Links Lambda - Expiring read-only schedule sharing.
//!
//! Endpoints:
//! - POST /share-links - Generate a share link for the caller's schedule
//! - GET /shared/{token} - Public read-only view behind a link token
//!
//! The shared view is the only unauthenticated route in the API; everything
//! it exposes is gated on knowing an unexpired token.

use chrono::{DateTime, Utc};
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use shared::http::{error_response, json_response, ApiResponse};
use shared::models::{ScheduleResponse, ScheduleRow};
use shared::{parse_body, Config};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Create share link request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateShareLinkRequest {
    expires_at: Option<DateTime<Utc>>,
}

/// Created share link
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShareLinkResponse {
    link_token: String,
    url: String,
    expires_at: Option<String>,
}

/// Read-only view of a shared schedule
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SharedScheduleResponse {
    username: String,
    schedules: Vec<ScheduleResponse>,
}

/// Application state
struct AppState {
    db_pool: PgPool,
    config: Config,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env().map_err(|e| format!("Incomplete environment: {}", e))?;

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let secrets_client = aws_sdk_secretsmanager::Client::new(&aws_config);

        let creds =
            shared::get_database_credentials(&secrets_client, &config.db_secret_arn).await?;
        let db_pool = shared::create_pool(&config, &creds).await?;

        Ok(Self { db_pool, config })
    }
}

/// 16 random bytes, hex-encoded. Unguessable, URL-safe, no padding.
fn generate_link_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn is_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.map(|e| e <= now).unwrap_or(false)
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let method = event.method().as_str();

    match (method, path) {
        // Generate a share link
        ("POST", "/share-links") => {
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

            let request: CreateShareLinkRequest = parse_body!(event.body());

            if let Some(expires_at) = request.expires_at {
                if expires_at <= Utc::now() {
                    return error_response(400, "Expiration date must be in the future");
                }
            }

            let link_token = generate_link_token();

            sqlx::query(
                "INSERT INTO share_links (id, user_id, link_token, expires_at) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(&link_token)
            .bind(request.expires_at)
            .execute(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to create share link: {}", e))?;

            info!("Created share link for user {}", user_id);

            let url = format!(
                "{}/shared/{}",
                state.config.app_url.trim_end_matches('/'),
                link_token
            );

            json_response(
                201,
                &ApiResponse::success(ShareLinkResponse {
                    link_token,
                    url,
                    expires_at: request.expires_at.map(|e| e.to_rfc3339()),
                }),
            )
        }

        // Public read-only view
        ("GET", _) if path.starts_with("/shared/") => {
            let token = path.trim_start_matches("/shared/");

            if token.is_empty() || token.contains('/') {
                return error_response(404, "Share link not found or expired");
            }

            let link: Option<(Uuid, Option<DateTime<Utc>>, String)> =
                sqlx::query_as(
                    "SELECT sl.user_id, sl.expires_at, u.username \
                     FROM share_links sl JOIN users u ON u.id = sl.user_id \
                     WHERE sl.link_token = $1",
                )
                .bind(token)
                .fetch_optional(&state.db_pool)
                .await
                .map_err(|e| format!("Failed to fetch share link: {}", e))?;

            let Some((owner_id, expires_at, username)) = link else {
                return error_response(404, "Share link not found or expired");
            };

            // Expired links read the same as unknown ones.
            if is_expired(expires_at, Utc::now()) {
                return error_response(404, "Share link not found or expired");
            }

            let schedules: Vec<ScheduleResponse> = sqlx::query_as::<_, ScheduleRow>(
                "SELECT id, user_id, start_time, end_time, is_free_time, created_at, updated_at \
                 FROM schedules WHERE user_id = $1 ORDER BY start_time",
            )
            .bind(owner_id)
            .fetch_all(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to fetch schedules: {}", e))?
            .into_iter()
            .map(ScheduleResponse::from)
            .collect();

            json_response(
                200,
                &ApiResponse::success(SharedScheduleResponse {
                    username,
                    schedules,
                }),
            )
        }

        (_, "/share-links") => error_response(405, "Method not allowed"),
        (_, _) if path.starts_with("/shared/") => error_response(405, "Method not allowed"),

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
    use chrono::Duration;

    #[test]
    fn test_link_token_shape() {
        let token = generate_link_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_link_tokens_are_unique() {
        assert_ne!(generate_link_token(), generate_link_token());
    }

    #[test]
    fn test_expiry_check() {
        let now = Utc::now();

        assert!(!is_expired(None, now));
        assert!(!is_expired(Some(now + Duration::hours(1)), now));
        assert!(is_expired(Some(now - Duration::hours(1)), now));
        assert!(is_expired(Some(now), now));
    }
}
