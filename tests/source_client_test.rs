use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pricerelay::error::{RelayError, Result};
use pricerelay::source::{
    ChannelType, PeriodSource, PeriodType, PriceRecord, PriceSource, PriceSourceClient, SiteId,
    SiteInfo,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct ScriptedSource {
    sites: Vec<SiteInfo>,
    sites_fail: bool,
    calls: Arc<AtomicUsize>,
    fail_next: Arc<AtomicBool>,
    price: Arc<Mutex<f64>>,
}

impl ScriptedSource {
    fn with_sites(ids: &[&str]) -> Self {
        Self {
            sites: ids
                .iter()
                .map(|id| SiteInfo {
                    id: SiteId((*id).to_string()),
                    active: true,
                })
                .collect(),
            ..Self::default()
        }
    }

    fn set_price(&self, price: f64) {
        *self.price.lock().unwrap() = price;
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    async fn list_sites(&self) -> Result<Vec<SiteInfo>> {
        if self.sites_fail {
            return Err(RelayError::upstream_unavailable("dns failure"));
        }
        Ok(self.sites.clone())
    }

    async fn fetch_records(&self, site: &SiteId) -> Result<Vec<PriceRecord>> {
        assert_eq!(site.as_str(), "site-1");
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(RelayError::upstream_unavailable("503"));
        }
        Ok(vec![PriceRecord {
            period: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            period_type: PeriodType::Actual,
            period_source: PeriodSource::ThirtyMinute,
            wholesale_per_kwh: *self.price.lock().unwrap(),
            channel_type: ChannelType::General,
        }])
    }
}

#[tokio::test]
async fn fetches_inside_debounce_window_hit_upstream_once() {
    let source = ScriptedSource::with_sites(&["site-1"]);
    let client = PriceSourceClient::connect(source.clone(), None, Duration::from_secs(60))
        .await
        .unwrap();

    let first = client.fetch_latest(false).await.unwrap();
    source.set_price(0.5);
    let second = client.fetch_latest(false).await.unwrap();

    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);
}

#[tokio::test]
async fn forced_fetch_bypasses_debounce() {
    let source = ScriptedSource::with_sites(&["site-1"]);
    let client = PriceSourceClient::connect(source.clone(), None, Duration::from_secs(60))
        .await
        .unwrap();

    client.fetch_latest(false).await.unwrap();
    source.set_price(0.5);
    let forced = client.fetch_latest(true).await.unwrap();

    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    assert!((forced.records[0].wholesale_per_kwh - 0.5).abs() < 1e-12);
}

#[tokio::test]
async fn elapsed_window_triggers_new_fetch() {
    let source = ScriptedSource::with_sites(&["site-1"]);
    let client = PriceSourceClient::connect(source.clone(), None, Duration::from_millis(20))
        .await
        .unwrap();

    let first = client.fetch_latest(false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    let second = client.fetch_latest(false).await.unwrap();

    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    assert!(second.fetched_at >= first.fetched_at);
}

#[tokio::test]
async fn concurrent_callers_share_one_request() {
    let source = ScriptedSource::with_sites(&["site-1"]);
    let client = Arc::new(
        PriceSourceClient::connect(source.clone(), None, Duration::from_secs(60))
            .await
            .unwrap(),
    );

    let (a, b) = tokio::join!(client.fetch_latest(false), client.fetch_latest(false));
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_fetch_keeps_previous_snapshot() {
    let source = ScriptedSource::with_sites(&["site-1"]);
    let client = PriceSourceClient::connect(source.clone(), None, Duration::ZERO)
        .await
        .unwrap();

    let good = client.fetch_latest(false).await.unwrap();
    source.fail_next.store(true, Ordering::SeqCst);
    let err = client.fetch_latest(false).await.unwrap_err();

    assert!(matches!(err, RelayError::UpstreamUnavailable { .. }));
    assert_eq!(client.cached().await, Some(good));
}

#[tokio::test]
async fn site_resolution_failures_are_fatal_errors() {
    let mut source = ScriptedSource::with_sites(&["site-1"]);
    source.sites_fail = true;
    let err = PriceSourceClient::connect(source, None, Duration::ZERO)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RelayError::SiteResolution { .. }));
    assert!(!err.is_recoverable());

    let empty = ScriptedSource::default();
    let err = PriceSourceClient::connect(empty, None, Duration::ZERO)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RelayError::SiteResolution { .. }));
}

#[tokio::test]
async fn configured_site_is_selected() {
    let source = ScriptedSource::with_sites(&["site-0", "site-1"]);
    let client = PriceSourceClient::connect(source, Some("site-1"), Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(client.site().as_str(), "site-1");
}
