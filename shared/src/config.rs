//! Configuration management for Lambda functions.

use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database host
    pub db_host: String,
    /// Database name
    pub db_name: String,
    /// ARN of the secret containing database credentials
    pub db_secret_arn: String,
    /// AWS region
    pub aws_region: String,
    /// Public base URL of the app, used to build share links
    pub app_url: String,
    /// Cognito app client id (only needed by the auth Lambda)
    pub cognito_client_id: Option<String>,
    /// Cognito user pool id (only needed by Lambdas that manage credentials)
    pub cognito_user_pool_id: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            db_host: env::var("DB_HOST")?,
            db_name: env::var("DB_NAME").unwrap_or_else(|_| "schedshare".to_string()),
            db_secret_arn: env::var("DB_SECRET_ARN")?,
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            app_url: env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            cognito_client_id: env::var("COGNITO_CLIENT_ID").ok(),
            cognito_user_pool_id: env::var("COGNITO_USER_POOL_ID").ok(),
        })
    }
}
