//! Friends Lambda - Friend requests and the friend list.
//!
//! Endpoints:
//! - POST /friends/requests - Send a friend request
//! - GET /friends/requests - List incoming pending requests
//! - POST /friends/requests/{id}/approve - Approve a pending request
//! - POST /friends/requests/{id}/reject - Reject a pending request
//! - GET /friends - List approved friends
//! - GET /friends/search?q= - Search users to befriend
//!
//! A request may only be decided by its addressee, and only while pending.

use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use serde::{Deserialize, Serialize};
use shared::http::{error_response, json_response, ApiResponse};
use shared::models::FriendStatus;
use shared::{parse_body, Config};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Send friend request payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendFriendRequest {
    addressee_id: String,
}

/// Incoming friend request, as shown on the requests page
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FriendRequestResponse {
    id: String,
    requester_id: String,
    requester_username: String,
    created_at: String,
}

/// An approved friend
#[derive(Debug, Serialize)]
struct FriendResponse {
    id: String,
    username: String,
}

/// User search hit
#[derive(Debug, Serialize)]
struct UserSearchResponse {
    id: String,
    username: String,
    email: String,
}

/// Application state
struct AppState {
    db_pool: PgPool,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env().map_err(|e| format!("Incomplete environment: {}", e))?;

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let secrets_client = aws_sdk_secretsmanager::Client::new(&aws_config);

        let creds =
            shared::get_database_credentials(&secrets_client, &config.db_secret_arn).await?;
        let db_pool = shared::create_pool(&config, &creds).await?;

        Ok(Self { db_pool })
    }
}

/// Escape LIKE wildcards so a search for "100%" matches literally.
fn like_pattern(q: &str) -> String {
    let escaped = q
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Parse `/friends/requests/{id}/approve` or `.../reject`.
fn decision_from_path(path: &str) -> Option<(Uuid, FriendStatus)> {
    let rest = path.strip_prefix("/friends/requests/")?;
    let (id, action) = rest.split_once('/')?;
    let id = Uuid::parse_str(id).ok()?;
    match action {
        "approve" => Some((id, FriendStatus::Approved)),
        "reject" => Some((id, FriendStatus::Rejected)),
        _ => None,
    }
}

/// Apply an approve/reject decision to a pending request addressed to `user_id`.
async fn decide_request(
    state: &AppState,
    user_id: Uuid,
    request_id: Uuid,
    decision: FriendStatus,
) -> Result<Response<Body>, Error> {
    let current: Option<String> =
        sqlx::query_scalar("SELECT status FROM friends WHERE id = $1 AND addressee_id = $2")
            .bind(request_id)
            .bind(user_id)
            .fetch_optional(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to fetch friend request: {}", e))?;

    let Some(current) = current else {
        return error_response(404, "Friend request not found");
    };

    let current = FriendStatus::parse(&current)
        .ok_or_else(|| format!("Unexpected friend status in store: {}", current))?;

    if !current.may_transition_to(decision) {
        // Already decided; terminal states never move again.
        return error_response(404, "Friend request not found");
    }

    // The status guard repeats the transition check so a concurrent decision
    // on the same request cannot apply twice.
    let updated = sqlx::query(
        "UPDATE friends SET status = $1, updated_at = NOW() \
         WHERE id = $2 AND addressee_id = $3 AND status = $4",
    )
    .bind(decision.as_str())
    .bind(request_id)
    .bind(user_id)
    .bind(FriendStatus::Pending.as_str())
    .execute(&state.db_pool)
    .await
    .map_err(|e| format!("Failed to update friend request: {}", e))?;

    if updated.rows_affected() == 0 {
        return error_response(404, "Friend request not found");
    }

    info!(
        "Friend request {} {} by user {}",
        request_id,
        decision.as_str(),
        user_id
    );

    let message = match decision {
        FriendStatus::Approved => "Friend request approved",
        _ => "Friend request rejected",
    };

    json_response(
        200,
        &ApiResponse::success(serde_json::json!({ "message": message })),
    )
}

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
        // Send a friend request
        ("POST", "/friends/requests") => {
            let request: SendFriendRequest = parse_body!(event.body());

            let Ok(addressee_id) = Uuid::parse_str(&request.addressee_id) else {
                return error_response(400, "Invalid addressee ID");
            };

            if addressee_id == user_id {
                return error_response(400, "Cannot send a friend request to yourself");
            }

            let addressee_exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                    .bind(addressee_id)
                    .fetch_one(&state.db_pool)
                    .await
                    .map_err(|e| format!("Failed to verify addressee: {}", e))?;

            if !addressee_exists {
                return error_response(404, "User not found");
            }

            // One edge per pair, regardless of direction or outcome.
            let edge_exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM friends \
                 WHERE (requester_id = $1 AND addressee_id = $2) \
                    OR (requester_id = $2 AND addressee_id = $1))",
            )
            .bind(user_id)
            .bind(addressee_id)
            .fetch_one(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to check existing requests: {}", e))?;

            if edge_exists {
                return error_response(409, "A friend request already exists between these users");
            }

            let request_id = Uuid::new_v4();

            sqlx::query(
                "INSERT INTO friends (id, requester_id, addressee_id, status) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(request_id)
            .bind(user_id)
            .bind(addressee_id)
            .bind(FriendStatus::Pending.as_str())
            .execute(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to create friend request: {}", e))?;

            info!(
                "Friend request {} sent from {} to {}",
                request_id, user_id, addressee_id
            );

            json_response(
                201,
                &ApiResponse::success(serde_json::json!({
                    "requestId": request_id.to_string(),
                })),
            )
        }

        // List incoming pending requests
        ("GET", "/friends/requests") => {
            let requests: Vec<FriendRequestResponse> = sqlx::query_as::<_, (Uuid, Uuid, String, chrono::DateTime<chrono::Utc>)>(
                "SELECT f.id, u.id, u.username, f.created_at \
                 FROM friends f JOIN users u ON u.id = f.requester_id \
                 WHERE f.addressee_id = $1 AND f.status = $2 \
                 ORDER BY f.created_at",
            )
            .bind(user_id)
            .bind(FriendStatus::Pending.as_str())
            .fetch_all(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to fetch friend requests: {}", e))?
            .into_iter()
            .map(|(id, requester_id, requester_username, created_at)| FriendRequestResponse {
                id: id.to_string(),
                requester_id: requester_id.to_string(),
                requester_username,
                created_at: created_at.to_rfc3339(),
            })
            .collect();

            json_response(200, &ApiResponse::success(requests))
        }

        // Search users to befriend
        ("GET", "/friends/search") => {
            let params = event.query_string_parameters();
            let q = params.first("q").unwrap_or_default().trim().to_string();

            if q.chars().count() < 2 {
                return error_response(400, "Search query must be at least 2 characters");
            }

            let users: Vec<UserSearchResponse> = sqlx::query_as::<_, (Uuid, String, String)>(
                "SELECT id, username, email FROM users \
                 WHERE (username ILIKE $1 OR email ILIKE $1) AND id <> $2 \
                 ORDER BY username LIMIT 20",
            )
            .bind(like_pattern(&q))
            .bind(user_id)
            .fetch_all(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to search users: {}", e))?
            .into_iter()
            .map(|(id, username, email)| UserSearchResponse {
                id: id.to_string(),
                username,
                email,
            })
            .collect();

            json_response(200, &ApiResponse::success(users))
        }

        // List approved friends, whichever side sent the request
        ("GET", "/friends") => {
            let friends: Vec<FriendResponse> = sqlx::query_as::<_, (Uuid, String)>(
                "SELECT u.id, u.username \
                 FROM friends f \
                 JOIN users u ON u.id = CASE WHEN f.requester_id = $1 \
                                             THEN f.addressee_id ELSE f.requester_id END \
                 WHERE (f.requester_id = $1 OR f.addressee_id = $1) AND f.status = $2 \
                 ORDER BY u.username",
            )
            .bind(user_id)
            .bind(FriendStatus::Approved.as_str())
            .fetch_all(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to fetch friends: {}", e))?
            .into_iter()
            .map(|(id, username)| FriendResponse {
                id: id.to_string(),
                username,
            })
            .collect();

            json_response(200, &ApiResponse::success(friends))
        }

        // Approve or reject a request
        ("POST", _) if path.starts_with("/friends/requests/") => {
            let Some((request_id, decision)) = decision_from_path(path) else {
                return error_response(404, "Not found");
            };

            decide_request(&state, user_id, request_id, decision).await
        }

        (_, "/friends") | (_, "/friends/requests") | (_, "/friends/search") => {
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

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("taro"), "%taro%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_decision_from_path() {
        let id = Uuid::new_v4();

        assert_eq!(
            decision_from_path(&format!("/friends/requests/{}/approve", id)),
            Some((id, FriendStatus::Approved))
        );
        assert_eq!(
            decision_from_path(&format!("/friends/requests/{}/reject", id)),
            Some((id, FriendStatus::Rejected))
        );
        assert_eq!(
            decision_from_path(&format!("/friends/requests/{}/block", id)),
            None
        );
        assert_eq!(decision_from_path("/friends/requests/not-a-uuid/approve"), None);
        assert_eq!(decision_from_path(&format!("/friends/requests/{}", id)), None);
    }
}
