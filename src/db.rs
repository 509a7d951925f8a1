use crate::models::{ShortenedUrl, UrlVisit};
use sqlx::SqlitePool;

// ── Shortened URLs ─────────────────────────────────────────────────────────

/// Insert a freshly generated record. The UNIQUE constraint on `code` is
/// the authoritative uniqueness guarantee; callers treat a violation as a
/// retryable condition, not a fatal error.
pub async fn insert_url(pool: &SqlitePool, url: &ShortenedUrl) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO shortened_urls
             (id, long_url, short_url, code, created_at, expires_at, visit_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(url.id)
    .bind(&url.long_url)
    .bind(&url.short_url)
    .bind(&url.code)
    .bind(url.created_at)
    .bind(url.expires_at)
    .bind(url.visit_count)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single record by its short code.
pub async fn find_url_by_code(
    pool: &SqlitePool,
    code: &str,
) -> Result<Option<ShortenedUrl>, sqlx::Error> {
    let url: Option<ShortenedUrl> = sqlx::query_as(
        "SELECT id, long_url, short_url, code, created_at, expires_at, visit_count
         FROM shortened_urls WHERE code = ?1",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;

    Ok(url)
}

/// Fetch a record by its exact long URL — the store side of dedup.
pub async fn find_url_by_long_url(
    pool: &SqlitePool,
    long_url: &str,
) -> Result<Option<ShortenedUrl>, sqlx::Error> {
    let url: Option<ShortenedUrl> = sqlx::query_as(
        "SELECT id, long_url, short_url, code, created_at, expires_at, visit_count
         FROM shortened_urls WHERE long_url = ?1",
    )
    .bind(long_url)
    .fetch_optional(pool)
    .await?;

    Ok(url)
}

/// Existence probe used by the code generator before each insert attempt.
pub async fn code_exists(pool: &SqlitePool, code: &str) -> Result<bool, sqlx::Error> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM shortened_urls WHERE code = ?1)")
            .bind(code)
            .fetch_one(pool)
            .await?;

    Ok(exists)
}

/// True when a write failed on a UNIQUE constraint (a late insert race).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(e) => e.is_unique_violation(),
        _ => false,
    }
}

// ── Visits ─────────────────────────────────────────────────────────────────

/// Persist a visit and bump the owning record's counter as one transaction.
/// The increment happens in SQL so two concurrent visits never lose an
/// update to a read-modify-write race.
pub async fn record_visit(pool: &SqlitePool, visit: &UrlVisit) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO url_visits (id, shortened_url_id, ip_address, virtual_location, visited_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(visit.id)
    .bind(visit.shortened_url_id)
    .bind(&visit.ip_address)
    .bind(&visit.virtual_location)
    .bind(visit.visited_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE shortened_urls SET visit_count = visit_count + 1 WHERE id = ?1")
        .bind(visit.shortened_url_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// All visits for one record, newest first.
pub async fn visits_for_url(
    pool: &SqlitePool,
    shortened_url_id: uuid::Uuid,
) -> Result<Vec<UrlVisit>, sqlx::Error> {
    let visits: Vec<UrlVisit> = sqlx::query_as(
        "SELECT id, shortened_url_id, ip_address, virtual_location, visited_at
         FROM url_visits
         WHERE shortened_url_id = ?1
         ORDER BY visited_at DESC",
    )
    .bind(shortened_url_id)
    .fetch_all(pool)
    .await?;

    Ok(visits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{memory_pool, sample_url, sample_visit};

    #[tokio::test]
    async fn insert_then_find_by_code_and_long_url() {
        let pool = memory_pool().await;
        let url = sample_url("abc1234", "https://example.com/a/b");
        insert_url(&pool, &url).await.unwrap();

        let by_code = find_url_by_code(&pool, "abc1234").await.unwrap().unwrap();
        assert_eq!(by_code.id, url.id);
        assert_eq!(by_code.long_url, "https://example.com/a/b");

        let by_long = find_url_by_long_url(&pool, "https://example.com/a/b")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_long.code, "abc1234");
    }

    #[tokio::test]
    async fn duplicate_code_insert_is_a_unique_violation() {
        let pool = memory_pool().await;
        insert_url(&pool, &sample_url("abc1234", "https://example.com/1"))
            .await
            .unwrap();

        let err = insert_url(&pool, &sample_url("abc1234", "https://example.com/2"))
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn code_exists_reflects_store_contents() {
        let pool = memory_pool().await;
        assert!(!code_exists(&pool, "abc1234").await.unwrap());

        insert_url(&pool, &sample_url("abc1234", "https://example.com"))
            .await
            .unwrap();
        assert!(code_exists(&pool, "abc1234").await.unwrap());
    }

    #[tokio::test]
    async fn record_visit_increments_counter_atomically() {
        let pool = memory_pool().await;
        let url = sample_url("abc1234", "https://example.com");
        insert_url(&pool, &url).await.unwrap();

        record_visit(&pool, &sample_visit(url.id, "8.8.8.8")).await.unwrap();
        record_visit(&pool, &sample_visit(url.id, "1.1.1.1")).await.unwrap();

        let reloaded = find_url_by_code(&pool, "abc1234").await.unwrap().unwrap();
        assert_eq!(reloaded.visit_count, 2);
    }

    #[tokio::test]
    async fn visits_come_back_newest_first() {
        let pool = memory_pool().await;
        let url = sample_url("abc1234", "https://example.com");
        insert_url(&pool, &url).await.unwrap();

        let mut older = sample_visit(url.id, "8.8.8.8");
        older.visited_at = older.visited_at - chrono::Duration::seconds(60);
        let newer = sample_visit(url.id, "1.1.1.1");

        record_visit(&pool, &older).await.unwrap();
        record_visit(&pool, &newer).await.unwrap();

        let visits = visits_for_url(&pool, url.id).await.unwrap();
        assert_eq!(visits.len(), 2);
        assert_eq!(visits[0].ip_address, "1.1.1.1");
        assert_eq!(visits[1].ip_address, "8.8.8.8");
    }
}
