//! Schedules Lambda - CRUD for personal time blocks.
//!
//! Endpoints:
//! - POST /schedules - Create a schedule
//! - GET /schedules - List the caller's schedules
//! - PUT /schedules/{id} - Update a schedule
//! - DELETE /schedules/{id} - Delete a schedule

use chrono::{DateTime, Utc};
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::Deserialize;
use shared::http::{error_response, json_response, ApiResponse};
use shared::models::{ScheduleResponse, ScheduleRow};
use shared::{parse_body, Config};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Create schedule request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateScheduleRequest {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    #[serde(default)]
    is_free_time: bool,
}

/// Update schedule request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateScheduleRequest {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    is_free_time: Option<bool>,
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

const SCHEDULE_COLUMNS: &str =
    "id, user_id, start_time, end_time, is_free_time, created_at, updated_at";

/// A time block is only meaningful if it ends after it starts.
fn validate_time_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), &'static str> {
    if end <= start {
        return Err("End time must be after start time");
    }
    Ok(())
}

/// Parse the schedule id out of `/schedules/{id}`.
fn schedule_id_from_path(path: &str) -> Option<Uuid> {
    let id = path.strip_prefix("/schedules/")?.split('/').next()?;
    Uuid::parse_str(id).ok()
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
        // Create schedule
        ("POST", "/schedules") => {
            let request: CreateScheduleRequest = parse_body!(event.body());

            if let Err(msg) = validate_time_range(request.start_time, request.end_time) {
                return error_response(400, msg);
            }

            let row: ScheduleRow = sqlx::query_as(&format!(
                "INSERT INTO schedules (id, user_id, start_time, end_time, is_free_time) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING {SCHEDULE_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(request.start_time)
            .bind(request.end_time)
            .bind(request.is_free_time)
            .fetch_one(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to create schedule: {}", e))?;

            info!("Created schedule {} for user {}", row.id, user_id);

            json_response(201, &ApiResponse::success(ScheduleResponse::from(row)))
        }

        // List schedules
        ("GET", "/schedules") => {
            let schedules: Vec<ScheduleResponse> = sqlx::query_as::<_, ScheduleRow>(&format!(
                "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE user_id = $1 ORDER BY start_time"
            ))
            .bind(user_id)
            .fetch_all(&state.db_pool)
            .await
            .map_err(|e| format!("Failed to fetch schedules: {}", e))?
            .into_iter()
            .map(ScheduleResponse::from)
            .collect();

            json_response(200, &ApiResponse::success(schedules))
        }

        // Update or delete specific schedule
        _ if path.starts_with("/schedules/") => {
            let Some(schedule_id) = schedule_id_from_path(path) else {
                return error_response(400, "Invalid schedule ID");
            };

            match method {
                "PUT" => {
                    let request: UpdateScheduleRequest = parse_body!(event.body());

                    if let Err(msg) = validate_time_range(request.start_time, request.end_time) {
                        return error_response(400, msg);
                    }

                    let owner: Option<Uuid> =
                        sqlx::query_scalar("SELECT user_id FROM schedules WHERE id = $1")
                            .bind(schedule_id)
                            .fetch_optional(&state.db_pool)
                            .await
                            .map_err(|e| format!("Failed to fetch schedule: {}", e))?;

                    match owner {
                        None => return error_response(404, "Schedule not found"),
                        Some(owner) if owner != user_id => {
                            return error_response(
                                403,
                                "You do not have permission to update this schedule",
                            );
                        }
                        Some(_) => {}
                    }

                    let row: ScheduleRow = sqlx::query_as(&format!(
                        "UPDATE schedules SET start_time = $1, end_time = $2, \
                         is_free_time = COALESCE($3, is_free_time), updated_at = NOW() \
                         WHERE id = $4 RETURNING {SCHEDULE_COLUMNS}"
                    ))
                    .bind(request.start_time)
                    .bind(request.end_time)
                    .bind(request.is_free_time)
                    .bind(schedule_id)
                    .fetch_one(&state.db_pool)
                    .await
                    .map_err(|e| format!("Failed to update schedule: {}", e))?;

                    info!("Updated schedule {} for user {}", schedule_id, user_id);

                    json_response(200, &ApiResponse::success(ScheduleResponse::from(row)))
                }

                "DELETE" => {
                    // Scoped to the caller's rows, so someone else's schedule
                    // reads the same as a missing one.
                    let deleted =
                        sqlx::query("DELETE FROM schedules WHERE id = $1 AND user_id = $2")
                            .bind(schedule_id)
                            .bind(user_id)
                            .execute(&state.db_pool)
                            .await
                            .map_err(|e| format!("Failed to delete schedule: {}", e))?;

                    if deleted.rows_affected() == 0 {
                        return error_response(404, "Schedule not found");
                    }

                    info!("Deleted schedule {} for user {}", schedule_id, user_id);

                    json_response(
                        200,
                        &ApiResponse::success(serde_json::json!({
                            "message": "Schedule deleted"
                        })),
                    )
                }

                _ => error_response(405, "Method not allowed"),
            }
        }

        (_, "/schedules") => error_response(405, "Method not allowed"),

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
    use chrono::TimeZone;

    #[test]
    fn test_time_range_must_be_positive() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        assert!(validate_time_range(start, end).is_ok());
        assert!(validate_time_range(end, start).is_err());
    }

    #[test]
    fn test_time_range_rejects_zero_length() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        assert!(validate_time_range(t, t).is_err());
    }

    #[test]
    fn test_schedule_id_from_path() {
        let id = Uuid::new_v4();
        assert_eq!(
            schedule_id_from_path(&format!("/schedules/{}", id)),
            Some(id)
        );
        assert_eq!(schedule_id_from_path("/schedules/not-a-uuid"), None);
        assert_eq!(schedule_id_from_path("/elsewhere"), None);
    }

    #[test]
    fn test_create_request_defaults_free_time() {
        let request: CreateScheduleRequest = serde_json::from_str(
            r#"{"startTime":"2024-05-01T09:00:00Z","endTime":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert!(!request.is_free_time);
    }

    #[test]
    fn test_create_request_rejects_malformed_time() {
        let result: Result<CreateScheduleRequest, _> = serde_json::from_str(
            r#"{"startTime":"yesterday","endTime":"2024-05-01T10:00:00Z"}"#,
        );
        assert!(result.is_err());
    }
}
