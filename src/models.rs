use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A shortened URL record from the `shortened_urls` table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ShortenedUrl {
    pub id: Uuid,
    pub long_url: String,
    pub short_url: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub visit_count: i64,
    /// Visit history materialized for history responses, newest first.
    /// Not a column; loaded separately and empty everywhere else.
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub visits: Vec<UrlVisit>,
}

/// A single visit event from the `url_visits` table. Immutable once written.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UrlVisit {
    #[serde(skip_serializing)]
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub shortened_url_id: Uuid,
    pub ip_address: String,
    pub virtual_location: String,
    pub visited_at: DateTime<Utc>,
}

/// A visitor's IP joined with its formatted location.
#[derive(Debug, Clone, Serialize)]
pub struct VisitorAddress {
    pub ip_address: String,
    pub virtual_location: String,
}
