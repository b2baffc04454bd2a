use std::env;

/// Store configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// DynamoDB table holding the immunization records.
    pub table_name: String,
    /// Optional endpoint override for a local DynamoDB (e.g. LocalStack).
    pub endpoint_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `DYNAMODB_TABLE_NAME` - table name (default: "immunisation-events")
    /// - `DYNAMODB_ENDPOINT_URL` - local endpoint override (default: unset)
    pub fn from_env() -> Self {
        Self {
            table_name: env::var("DYNAMODB_TABLE_NAME")
                .unwrap_or_else(|_| "immunisation-events".to_string()),
            endpoint_url: env::var("DYNAMODB_ENDPOINT_URL").ok(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
