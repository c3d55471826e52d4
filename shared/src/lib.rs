//! Shared library for SchedShare Lambda functions.
//!
//! This crate provides common utilities, types, and clients used across all Lambda functions.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod secrets;

pub use auth::{caller_sub, validate_token, AuthenticatedUser, CognitoClaims};
pub use config::Config;
pub use db::{create_pool, user_id_for_sub};
pub use error::{Error, Result};
pub use http::{error_response, json_response, ApiResponse};
pub use models::{FriendStatus, ScheduleResponse, ScheduleRow, UserResponse, UserRow};
pub use secrets::{get_database_credentials, get_secret, DatabaseCredentials};
