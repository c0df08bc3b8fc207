use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::error::{RelayError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::source::types::{PriceRecord, RawPriceSnapshot, SiteId};

/// A site as listed by the upstream account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteInfo {
    pub id: SiteId,
    pub active: bool,
}

/// Upstream pricing service
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Every site visible to the configured credentials
    async fn list_sites(&self) -> Result<Vec<SiteInfo>>;

    /// All currently available records for `site`, across granularities
    async fn fetch_records(&self, site: &SiteId) -> Result<Vec<PriceRecord>>;
}

#[derive(Default)]
struct CacheState {
    snapshot: Option<Arc<RawPriceSnapshot>>,
    last_success: Option<Instant>,
}

impl CacheState {
    /// Last-write-wins by fetch timestamp; an older snapshot never replaces a
    /// newer one. Returns whichever snapshot is retained.
    fn store(&mut self, snapshot: Arc<RawPriceSnapshot>) -> Arc<RawPriceSnapshot> {
        match &self.snapshot {
            Some(existing) if existing.fetched_at > snapshot.fetched_at => existing.clone(),
            _ => {
                self.snapshot = Some(snapshot.clone());
                self.last_success = Some(Instant::now());
                snapshot
            }
        }
    }
}

/// Caching, debouncing front for a [`PriceSource`] bound to one site
pub struct PriceSourceClient<S> {
    source: S,
    site: SiteId,
    min_poll_interval: Duration,
    cache: Mutex<CacheState>,
    logger: StructuredLogger,
}

impl<S: PriceSource> PriceSourceClient<S> {
    /// Resolve the site once and build the client.
    ///
    /// With `configured_site` set, that site must exist upstream. Otherwise
    /// the first active site (or the first site at all) is used.
    pub async fn connect(
        source: S,
        configured_site: Option<&str>,
        min_poll_interval: Duration,
    ) -> Result<Self> {
        let sites = source
            .list_sites()
            .await
            .map_err(|e| RelayError::site_resolution(format!("could not list sites: {}", e)))?;
        let site = select_site(&sites, configured_site)?;
        let client = Self::with_site(source, site, min_poll_interval);
        client
            .logger
            .info(&format!("Resolved site ({} listed)", sites.len()));
        Ok(client)
    }

    /// Build a client for an already known site
    pub fn with_site(source: S, site: SiteId, min_poll_interval: Duration) -> Self {
        let logger =
            get_logger_with_context(LogContext::new("source").with_field("site", site.to_string()));
        Self {
            source,
            site,
            min_poll_interval,
            cache: Mutex::new(CacheState::default()),
            logger,
        }
    }

    pub fn site(&self) -> &SiteId {
        &self.site
    }

    /// Latest snapshot, refetching only when the debounce window has passed
    /// or `force` is set.
    ///
    /// Callers serialize on the cache lock, so cadences waking together cause
    /// a single upstream request. A failed fetch leaves the cache untouched.
    pub async fn fetch_latest(&self, force: bool) -> Result<Arc<RawPriceSnapshot>> {
        let mut cache = self.cache.lock().await;

        if !force
            && let (Some(snapshot), Some(at)) = (&cache.snapshot, cache.last_success)
            && at.elapsed() < self.min_poll_interval
        {
            self.logger.debug(&format!(
                "Reusing snapshot fetched at {} ({} records)",
                snapshot.fetched_at,
                snapshot.records.len()
            ));
            return Ok(snapshot.clone());
        }

        let issued_at = Utc::now();
        let records = self.source.fetch_records(&self.site).await?;
        self.logger.debug(&format!(
            "Fetched {} records (issued {})",
            records.len(),
            issued_at
        ));
        Ok(cache.store(Arc::new(RawPriceSnapshot::new(issued_at, records))))
    }

    /// Snapshot currently held, without touching the network
    pub async fn cached(&self) -> Option<Arc<RawPriceSnapshot>> {
        self.cache.lock().await.snapshot.clone()
    }
}

fn select_site(sites: &[SiteInfo], configured: Option<&str>) -> Result<SiteId> {
    if let Some(wanted) = configured.map(str::trim).filter(|s| !s.is_empty()) {
        return sites
            .iter()
            .find(|s| s.id.as_str() == wanted)
            .map(|s| s.id.clone())
            .ok_or_else(|| {
                RelayError::site_resolution(format!("configured site {} not found", wanted))
            });
    }
    sites
        .iter()
        .find(|s| s.active)
        .or_else(|| sites.first())
        .map(|s| s.id.clone())
        .ok_or_else(|| RelayError::site_resolution("account has no sites"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn site(id: &str, active: bool) -> SiteInfo {
        SiteInfo {
            id: SiteId(id.to_string()),
            active,
        }
    }

    #[test]
    fn selects_first_active_site() {
        let sites = vec![site("closed", false), site("live", true)];
        assert_eq!(select_site(&sites, None).unwrap().as_str(), "live");
        assert_eq!(select_site(&sites, Some("  ")).unwrap().as_str(), "live");
    }

    #[test]
    fn configured_site_must_exist() {
        let sites = vec![site("a", true)];
        assert_eq!(select_site(&sites, Some("a")).unwrap().as_str(), "a");
        assert!(matches!(
            select_site(&sites, Some("b")),
            Err(RelayError::SiteResolution { .. })
        ));
        assert!(matches!(
            select_site(&[], None),
            Err(RelayError::SiteResolution { .. })
        ));
    }

    #[test]
    fn older_snapshot_does_not_overwrite_newer() {
        let newer = Arc::new(RawPriceSnapshot::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 10).unwrap(),
            Vec::new(),
        ));
        let older = Arc::new(RawPriceSnapshot::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 10).unwrap(),
            Vec::new(),
        ));
        let mut cache = CacheState::default();
        cache.store(newer.clone());
        let kept = cache.store(older);
        assert_eq!(kept.fetched_at, newer.fetched_at);
        assert_eq!(
            cache.snapshot.as_ref().map(|s| s.fetched_at),
            Some(newer.fetched_at)
        );
    }
}
