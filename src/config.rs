use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite connection string, e.g. "sqlite:./shortly.db"
    pub database_url: String,

    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Public base URL used when building short URLs, e.g.
    /// "https://s.example.com". Must NOT have a trailing slash.
    pub base_url: String,

    /// Geolocation lookup endpoint without a trailing slash.
    /// Overridable so deployments can point at a mirror or a stub.
    pub geo_api_url: String,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy
    /// before this is called).
    pub fn from_env() -> Result<Self> {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse::<u16>()
            .context("PORT must be a valid port number (1–65535)")?;

        let base_url = std::env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();

        let geo_api_url = std::env::var("GEO_API_URL")
            .unwrap_or_else(|_| "http://ip-api.com/json".into())
            .trim_end_matches('/')
            .to_owned();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./shortly.db".into()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            base_url,
            geo_api_url,
        })
    }
}
