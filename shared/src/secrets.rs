//! AWS Secrets Manager integration.

use aws_sdk_secretsmanager::Client as SecretsClient;
use serde::Deserialize;

use crate::{Error, Result};

/// Database credentials from Secrets Manager.
///
/// Matches the JSON shape of an RDS-managed secret; host/port/dbname are
/// present on rotation-managed secrets but the deployment passes them via
/// environment variables, so they are optional here.
#[derive(Debug, Deserialize)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: Option<String>,
}

/// Get a secret value from Secrets Manager.
pub async fn get_secret(client: &SecretsClient, secret_arn: &str) -> Result<String> {
    let response = client
        .get_secret_value()
        .secret_id(secret_arn)
        .send()
        .await
        .map_err(|e| Error::Aws(format!("Failed to get secret: {}", e)))?;

    let secret_string = response
        .secret_string()
        .ok_or_else(|| Error::Aws("Secret has no string value".to_string()))?
        .to_string();

    Ok(secret_string)
}

/// Get database credentials from Secrets Manager.
///
/// Called once per cold start while building the connection pool.
pub async fn get_database_credentials(
    client: &SecretsClient,
    secret_arn: &str,
) -> Result<DatabaseCredentials> {
    let secret_string = get_secret(client, secret_arn).await?;

    serde_json::from_str(&secret_string)
        .map_err(|e| Error::Aws(format!("Failed to parse database credentials: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credentials() {
        let json = r#"{"username":"ssadmin","password":"secret123","host":"db.example.com","port":5432,"dbname":"schedshare"}"#;
        let creds: DatabaseCredentials = serde_json::from_str(json).unwrap();
        assert_eq!(creds.username, "ssadmin");
        assert_eq!(creds.password, "secret123");
        assert_eq!(creds.port, Some(5432));
    }

    #[test]
    fn test_parse_credentials_minimal() {
        let creds: DatabaseCredentials =
            serde_json::from_str(r#"{"username":"ssadmin","password":"x"}"#).unwrap();
        assert!(creds.host.is_none());
        assert!(creds.dbname.is_none());
    }
}
