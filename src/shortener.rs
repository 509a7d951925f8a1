use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use url::Url;
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::db;
use crate::error::{Result, ServiceError};
use crate::generator;
use crate::geo::{self, GeoResolver};
use crate::models::{ShortenedUrl, UrlVisit, VisitorAddress};

/// TTL for code- and long-URL-keyed record entries.
const URL_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// TTL for counter-keyed history snapshots. Snapshots self-invalidate when
/// the counter moves, so this only bounds how long orphaned keys linger.
const HISTORY_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// TTL for visitor detail lookups.
const VISITOR_CACHE_TTL: Duration = Duration::from_secs(20 * 60);

/// Longest accepted long URL.
const MAX_URL_LEN: usize = 2048;

/// Widest stored visitor address (IPv6 needs up to 45 chars).
const MAX_IP_LEN: usize = 45;

/// Fresh-code attempts after an insert lost the uniqueness race to a
/// concurrent writer. Each retry draws a brand-new code, so one is almost
/// always enough.
const INSERT_RETRIES: u32 = 3;

const CACHE_KEY_PREFIX: &str = "url_";

/// The shortening engine: dedup, code generation, persistence, cache
/// population, visit tracking, and history aggregation.
///
/// Caches are a re-derivable projection of the store — every path that
/// populates them tolerates a cold cache, and administrative clears are
/// always safe.
pub struct UrlShortener {
    db: SqlitePool,
    base_url: String,
    urls: TtlCache<ShortenedUrl>,
    visitors: TtlCache<VisitorAddress>,
    geo: GeoResolver,
}

impl UrlShortener {
    pub fn new(db: SqlitePool, base_url: impl Into<String>, geo: GeoResolver) -> Self {
        Self {
            db,
            base_url: base_url.into(),
            urls: TtlCache::new(),
            visitors: TtlCache::new(),
            geo,
        }
    }

    // ── Shortening ─────────────────────────────────────────────────────────

    /// Shorten `long_url`, returning the existing record when this exact
    /// URL was already shortened (idempotent dedup).
    ///
    /// Persistence failures here propagate: a shorten request with no
    /// persisted record is a caller-visible failure.
    pub async fn shorten(&self, long_url: &str) -> Result<ShortenedUrl> {
        let long_url = long_url.trim();
        validate_long_url(long_url)?;

        // Fast path: this exact URL was shortened recently.
        let long_key = long_url_key(long_url);
        if let Some(existing) = self.urls.get(&long_key) {
            return Ok(existing);
        }

        // Cache miss — the store is the authority on dedup.
        if let Some(existing) = db::find_url_by_long_url(&self.db, long_url)
            .await
            .map_err(|e| ServiceError::persistence("long URL lookup", e))?
        {
            self.cache_record(&long_key, &existing);
            return Ok(existing);
        }

        // Genuinely new: mint a code and persist. Losing the UNIQUE race on
        // `code` to a concurrent insert just means drawing a fresh code.
        let mut attempt = 0;
        loop {
            let code = generator::generate_unique_code(&self.db).await?;
            let record = ShortenedUrl {
                id: Uuid::new_v4(),
                long_url: long_url.to_owned(),
                short_url: format!("{}/{}", self.base_url, code),
                code,
                created_at: Utc::now(),
                expires_at: None,
                visit_count: 0,
                visits: Vec::new(),
            };

            match db::insert_url(&self.db, &record).await {
                Ok(()) => {
                    self.cache_record(&long_key, &record);
                    tracing::info!("shortened '{}' as '{}'", record.long_url, record.code);
                    return Ok(record);
                }
                Err(e) if db::is_unique_violation(&e) && attempt < INSERT_RETRIES => {
                    attempt += 1;
                    tracing::warn!(
                        "code '{}' was taken in an insert race, retrying ({}/{})",
                        record.code,
                        attempt,
                        INSERT_RETRIES
                    );
                }
                Err(e) => return Err(ServiceError::persistence("shortened URL insert", e)),
            }
        }
    }

    /// Cache-then-store lookup by short code, populating the cache on a
    /// store hit.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<ShortenedUrl>> {
        if code.is_empty() {
            return Err(ServiceError::InvalidInput(
                "please enter the unique code".into(),
            ));
        }

        let key = code_key(code);
        if let Some(hit) = self.urls.get(&key) {
            return Ok(Some(hit));
        }

        let found = db::find_url_by_code(&self.db, code)
            .await
            .map_err(|e| ServiceError::persistence("code lookup", e))?;

        if let Some(record) = &found {
            self.urls.set(key, record.clone(), Some(URL_CACHE_TTL));
        }

        Ok(found)
    }

    // ── Visit tracking & history ───────────────────────────────────────────

    /// Record one visit: resolve the visitor's location, persist the visit,
    /// and bump the record's counter in the same transaction.
    ///
    /// Returns `Err` when persistence fails so callers can tell "tracked"
    /// from "tracking failed"; the redirect path logs the failure and moves
    /// on, because tracking must never block the redirect that caused it.
    pub async fn track_visit(&self, url: &ShortenedUrl, ip: &str) -> Result<UrlVisit> {
        let location = self.geo.resolve(ip).await;

        let visit = UrlVisit {
            id: Uuid::new_v4(),
            shortened_url_id: url.id,
            // The column holds IPv4/IPv6; anything longer is proxy garbage
            ip_address: ip.chars().take(MAX_IP_LEN).collect(),
            virtual_location: geo::format_location(location.as_ref()),
            visited_at: Utc::now(),
        };

        db::record_visit(&self.db, &visit)
            .await
            .map_err(|e| ServiceError::persistence("visit insert", e))?;

        Ok(visit)
    }

    /// Load the record for `code` with its visits materialized newest-first.
    ///
    /// The cache key embeds the current visit counter, so any tracked visit
    /// changes the key and the next read rebuilds from the store instead of
    /// serving a stale snapshot. Old counter-keyed entries are left to age
    /// out on their own TTL.
    pub async fn get_history(&self, code: &str) -> Result<Option<ShortenedUrl>> {
        if code.is_empty() {
            return Err(ServiceError::InvalidInput(
                "please enter the unique code".into(),
            ));
        }

        // The counter must come from the store, not the record cache — a
        // cached count would defeat the counter-keyed invalidation.
        let Some(current) = db::find_url_by_code(&self.db, code)
            .await
            .map_err(|e| ServiceError::persistence("history lookup", e))?
        else {
            return Ok(None);
        };

        let key = history_key(code, current.visit_count);
        let pool = self.db.clone();
        self.urls
            .get_or_create(&key, Some(HISTORY_CACHE_TTL), move || async move {
                let visits = db::visits_for_url(&pool, current.id)
                    .await
                    .map_err(|e| ServiceError::persistence("visit history load", e))?;
                Ok(Some(ShortenedUrl {
                    visits,
                    ..current
                }))
            })
            .await
    }

    /// Cache-then-resolve lookup of a visitor's formatted location, keyed
    /// purely by IP — there is no counter to version this by.
    pub async fn get_visitor_details(&self, ip: &str) -> Result<Option<VisitorAddress>> {
        let key = format!("details_{ip}_visits");
        let ip = ip.to_owned();
        let geo = &self.geo;
        self.visitors
            .get_or_create(&key, Some(VISITOR_CACHE_TTL), move || async move {
                let location = geo.resolve(&ip).await;
                Ok(Some(VisitorAddress {
                    virtual_location: geo::format_location(location.as_ref()),
                    ip_address: ip,
                }))
            })
            .await
    }

    /// Populate the record cache from a freshly resolved record, keyed both
    /// by its long-URL dedup key and by its short code so either lookup path
    /// hits warm.
    fn cache_record(&self, long_key: &str, record: &ShortenedUrl) {
        self.urls
            .set(long_key.to_owned(), record.clone(), Some(URL_CACHE_TTL));
        self.urls
            .set(code_key(&record.code), record.clone(), Some(URL_CACHE_TTL));
    }

    // ── Cache administration ───────────────────────────────────────────────

    /// Snapshot of every live key across all cache instances.
    pub fn cache_keys(&self) -> Vec<String> {
        let mut keys = self.urls.list_keys();
        keys.extend(self.geo.cache().list_keys());
        keys.extend(self.visitors.list_keys());
        keys
    }

    /// Drop every cached entry. Idempotent.
    pub fn clear_caches(&self) {
        self.urls.clear_all();
        self.geo.cache().clear_all();
        self.visitors.clear_all();
        tracing::info!("all caches cleared");
    }

    /// Evict one key. A key lives in exactly one cache, but trying all of
    /// them keeps the admin surface ignorant of the layout.
    pub fn remove_cache_key(&self, key: &str) -> bool {
        let removed_url = self.urls.remove(key);
        let removed_geo = self.geo.cache().remove(key);
        let removed_visitor = self.visitors.remove(key);
        removed_url || removed_geo || removed_visitor
    }
}

// ── Key derivation ─────────────────────────────────────────────────────────

fn code_key(code: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{code}")
}

/// Dedup entries are keyed by a hash of the long URL rather than the URL
/// itself, keeping keys short and uniform for the admin listing.
fn long_url_key(long_url: &str) -> String {
    let mut hasher = DefaultHasher::new();
    long_url.hash(&mut hasher);
    format!("{CACHE_KEY_PREFIX}long_{:x}", hasher.finish())
}

/// Tagged cache key: `base + version`. Embedding the visit counter means a
/// new visit changes the key, which is what invalidates stale snapshots.
fn history_key(code: &str, visit_count: i64) -> String {
    format!("history_{code}_visits_{visit_count}")
}

// ── Validation ─────────────────────────────────────────────────────────────

fn validate_long_url(long_url: &str) -> Result<()> {
    if long_url.is_empty() {
        return Err(ServiceError::InvalidInput("please enter the URL".into()));
    }
    if long_url.len() > MAX_URL_LEN {
        return Err(ServiceError::InvalidInput(format!(
            "URL must not exceed {MAX_URL_LEN} characters"
        )));
    }
    match Url::parse(long_url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(ServiceError::InvalidInput(
            "please enter a valid URL".into(),
        )),
    }
}
