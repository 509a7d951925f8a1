use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{ShortenedUrl, UrlVisit};

/// Fresh in-memory database with the embedded migrations applied. A single
/// connection keeps every query on the same `:memory:` instance.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite pool");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");

    pool
}

pub fn sample_url(code: &str, long_url: &str) -> ShortenedUrl {
    ShortenedUrl {
        id: Uuid::new_v4(),
        long_url: long_url.to_owned(),
        short_url: format!("http://localhost:3000/{code}"),
        code: code.to_owned(),
        created_at: Utc::now(),
        expires_at: None,
        visit_count: 0,
        visits: Vec::new(),
    }
}

pub fn sample_visit(shortened_url_id: Uuid, ip: &str) -> UrlVisit {
    UrlVisit {
        id: Uuid::new_v4(),
        shortened_url_id,
        ip_address: ip.to_owned(),
        virtual_location: "Unknown".to_owned(),
        visited_at: Utc::now(),
    }
}
