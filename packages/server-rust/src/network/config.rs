//! Network configuration for the HTTP transport.

use std::time::Duration;

/// Listener and HTTP middleware settings.
#[derive(Debug, Clone, clap::Args)]
pub struct NetworkConfig {
    /// Bind address for the server.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,
    /// Allowed CORS origins, comma separated. `*` allows any origin.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,
    /// Maximum time to wait for a request to complete.
    #[arg(long = "request-timeout-ms", env = "REQUEST_TIMEOUT_MS", default_value = "30000", value_parser = parse_millis)]
    pub request_timeout: Duration,
    /// Wait for background work before every response, for platforms that
    /// freeze the process between requests.
    #[arg(long, env = "SERVERLESS", default_value_t = false)]
    pub serverless: bool,
}

fn parse_millis(raw: &str) -> Result<Duration, std::num::ParseIntError> {
    raw.parse().map(Duration::from_millis)
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            serverless: false,
        }
    }
}
