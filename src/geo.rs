use serde::Deserialize;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::TtlCache;

/// How long a confirmed lookup stays cached; ip-api data is stable enough
/// to hold for a day.
const GEO_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ── Types ──────────────────────────────────────────────────────────────────

/// Geolocation data for a single IP address. Ephemeral: only the formatted
/// projection from [`format_location`] is ever persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationInfo {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
}

/// Wraps the external ip-api.com lookup behind a TTL cache keyed by IP.
///
/// Failed lookups are NOT cached, so a later call for the same address
/// retries instead of pinning a transient outage for a day.
#[derive(Clone, Debug)]
pub struct GeoResolver {
    base_url: String,
    cache: TtlCache<LocationInfo>,
}

// ── ip-api.com response shape ──────────────────────────────────────────────

#[derive(Deserialize)]
struct IpApiResponse {
    status: String,
    country: Option<String>,
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
    #[serde(rename = "regionName")]
    region_name: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    timezone: Option<String>,
}

// ── Public API ─────────────────────────────────────────────────────────────

impl GeoResolver {
    /// `base_url` is the lookup endpoint without a trailing slash,
    /// e.g. "http://ip-api.com/json".
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            cache: TtlCache::new(),
        }
    }

    /// Look up geolocation for `ip`.
    ///
    /// Loopback and empty addresses short-circuit to a "localhost" sentinel
    /// without any network call. Otherwise the cache is consulted first;
    /// a miss triggers one external request with a 3-second timeout.
    /// Returns `None` on network errors, rate-limited or non-success
    /// responses, and unparseable payloads.
    pub async fn resolve(&self, ip: &str) -> Option<LocationInfo> {
        if is_local(ip) {
            return Some(LocationInfo {
                city: Some("localhost".into()),
                ..Default::default()
            });
        }

        let cache_key = format!("geo_{ip}");
        if let Some(hit) = self.cache.get(&cache_key) {
            return Some(hit);
        }

        let info = self.fetch(ip).await?;

        // Cache only after the response reported success
        self.cache.set(cache_key, info.clone(), Some(GEO_CACHE_TTL));
        Some(info)
    }

    /// The cache instance, exposed for the admin introspection surface.
    pub fn cache(&self) -> &TtlCache<LocationInfo> {
        &self.cache
    }

    // ── Internal helpers ───────────────────────────────────────────────────

    async fn fetch(&self, ip: &str) -> Option<LocationInfo> {
        // Build a lightweight client with a strict timeout
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .ok()?;

        let url = format!(
            "{}/{}?fields=status,country,countryCode,regionName,city,lat,lon,timezone",
            self.base_url, ip
        );

        let resp = client
            .get(&url)
            .send()
            .await
            .map_err(|e| tracing::debug!("geo lookup network error for {}: {}", ip, e))
            .ok()?;

        let body: IpApiResponse = resp
            .json()
            .await
            .map_err(|e| tracing::debug!("geo lookup parse error for {}: {}", ip, e))
            .ok()?;

        if body.status != "success" {
            tracing::debug!("geo lookup returned non-success status for {}", ip);
            return None;
        }

        Some(LocationInfo {
            city: body.city.filter(|s| !s.is_empty()),
            state: body.region_name.filter(|s| !s.is_empty()),
            country: body.country.filter(|s| !s.is_empty()),
            country_code: body.country_code.filter(|s| !s.is_empty()),
            latitude: body.lat,
            longitude: body.lon,
            timezone: body.timezone.filter(|s| !s.is_empty()),
        })
    }
}

/// Project a location onto the human-readable string stored with each
/// visit: "city, state, country" with absent parts skipped, or "Unknown"
/// when nothing useful resolved.
pub fn format_location(location: Option<&LocationInfo>) -> String {
    let Some(location) = location else {
        return "Unknown".to_owned();
    };

    let parts: Vec<&str> = [&location.city, &location.state, &location.country]
        .into_iter()
        .filter_map(|part| part.as_deref())
        .filter(|part| !part.is_empty())
        .collect();

    if parts.is_empty() {
        "Unknown".to_owned()
    } else {
        parts.join(", ")
    }
}

/// Return `true` for addresses that must never be sent to the public
/// geolocation API: empty strings and loopback in either family.
fn is_local(ip_str: &str) -> bool {
    let ip_str = ip_str.trim();
    if ip_str.is_empty() {
        return true;
    }

    // Strip IPv6-mapped IPv4 prefix: "::ffff:127.0.0.1" → "127.0.0.1"
    let ip_str = ip_str.strip_prefix("::ffff:").unwrap_or(ip_str);

    match IpAddr::from_str(ip_str) {
        Ok(addr) => addr.is_loopback(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_addresses_resolve_locally() {
        // Unroutable base URL: any network call would fail loudly
        let resolver = GeoResolver::new("http://127.0.0.1:1/json");

        for ip in ["127.0.0.1", "::1", "", "   ", "::ffff:127.0.0.1"] {
            let location = resolver.resolve(ip).await;
            assert_eq!(
                location,
                Some(LocationInfo {
                    city: Some("localhost".into()),
                    ..Default::default()
                }),
                "expected localhost sentinel for {ip:?}"
            );
        }
    }

    #[tokio::test]
    async fn failed_lookups_are_not_cached() {
        let resolver = GeoResolver::new("http://127.0.0.1:1/json");

        assert_eq!(resolver.resolve("8.8.8.8").await, None);
        assert!(
            resolver.cache().list_keys().is_empty(),
            "a failed lookup must leave no cache entry"
        );
    }

    #[test]
    fn is_local_spots_loopback_only() {
        assert!(is_local("127.0.0.1"));
        assert!(is_local("::1"));
        assert!(is_local(""));
        assert!(!is_local("8.8.8.8"));
        assert!(!is_local("2001:4860:4860::8888"));
        assert!(!is_local("not-an-ip"));
    }

    #[test]
    fn format_location_joins_present_parts() {
        let location = LocationInfo {
            city: Some("Mountain View".into()),
            state: Some("California".into()),
            country: Some("United States".into()),
            ..Default::default()
        };
        assert_eq!(
            format_location(Some(&location)),
            "Mountain View, California, United States"
        );

        let city_only = LocationInfo {
            city: Some("localhost".into()),
            ..Default::default()
        };
        assert_eq!(format_location(Some(&city_only)), "localhost");
    }

    #[test]
    fn format_location_falls_back_to_unknown() {
        assert_eq!(format_location(None), "Unknown");
        assert_eq!(format_location(Some(&LocationInfo::default())), "Unknown");
    }
}
