//! Amber Electric REST client
//!
//! Prices arrive in cents per kWh and are converted to dollars per kWh here,
//! once, so everything downstream works in a single unit.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;

use crate::config::AmberConfig;
use crate::error::{RelayError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::source::client::{PriceSource, SiteInfo};
use crate::source::types::{ChannelType, PeriodSource, PeriodType, PriceRecord, SiteId};

const CENTS_PER_DOLLAR: f64 = 100.0;

/// Resolutions requested on every poll, in minutes
const RESOLUTIONS: [u32; 2] = [5, 30];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SiteDto {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntervalDto {
    #[serde(rename = "type")]
    kind: String,
    duration: u64,
    spot_per_kwh: f64,
    channel_type: String,
    end_time: String,
}

pub struct AmberApi {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    previous_intervals: u32,
    logger: StructuredLogger,
}

impl AmberApi {
    pub fn new(cfg: &AmberConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_seconds))
            .build()
            .map_err(|e| RelayError::config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_token: cfg.api_token.trim().to_string(),
            previous_intervals: cfg.previous_intervals,
            logger: get_logger("amber"),
        })
    }

    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let resp = self
            .http
            .get(url)
            .query(query)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_token))
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("pricerelay/", env!("APP_VERSION")))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            self.logger
                .warn(&format!("Pricing API error: {} for {}", status, url));
            return Err(RelayError::upstream_unavailable(format!(
                "HTTP {} from {}",
                status, url
            )));
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl PriceSource for AmberApi {
    async fn list_sites(&self) -> Result<Vec<SiteInfo>> {
        let body = self.get_text(&format!("{}/sites", self.base_url), &[]).await?;
        parse_sites(&body)
    }

    async fn fetch_records(&self, site: &SiteId) -> Result<Vec<PriceRecord>> {
        let url = format!("{}/sites/{}/prices/current", self.base_url, site);
        let mut bodies = Vec::with_capacity(RESOLUTIONS.len());
        for resolution in RESOLUTIONS {
            let query = [
                ("previous", self.previous_intervals.to_string()),
                ("next", "0".to_string()),
                ("resolution", resolution.to_string()),
            ];
            bodies.push((resolution, self.get_text(&url, &query).await?));
        }

        let (records, mut failures) =
            parse_resolutions(bodies.iter().map(|(res, body)| (*res, body.as_str())));
        for (resolution, e) in &failures {
            self.logger
                .warn(&format!("Discarding {}m prices: {}", resolution, e));
        }
        if records.is_empty() && !failures.is_empty() {
            return Err(failures.swap_remove(0).1);
        }
        Ok(records)
    }
}

/// Parse one body per resolution. A bad payload for one resolution does not
/// discard the records of the others.
pub fn parse_resolutions<'a>(
    bodies: impl IntoIterator<Item = (u32, &'a str)>,
) -> (Vec<PriceRecord>, Vec<(u32, RelayError)>) {
    let mut records = Vec::new();
    let mut failures = Vec::new();
    for (resolution, body) in bodies {
        match parse_intervals(body) {
            Ok(parsed) => records.extend(parsed),
            Err(e) => failures.push((resolution, e)),
        }
    }
    (records, failures)
}

pub fn parse_sites(body: &str) -> Result<Vec<SiteInfo>> {
    let sites: Vec<SiteDto> = serde_json::from_str(body)?;
    Ok(sites
        .into_iter()
        .map(|s| SiteInfo {
            active: s
                .status
                .as_deref()
                .is_none_or(|st| st.eq_ignore_ascii_case("active")),
            id: SiteId(s.id),
        })
        .collect())
}

/// Parse a `prices/current` payload into records.
///
/// Intervals of unknown type, channel or duration are skipped; a payload that
/// is not an interval array, or has missing fields, is an error.
pub fn parse_intervals(body: &str) -> Result<Vec<PriceRecord>> {
    let intervals: Vec<IntervalDto> = serde_json::from_str(body)?;
    let mut records = Vec::with_capacity(intervals.len());
    for iv in intervals {
        let (Some(period_type), Some(period_source), Some(channel_type)) = (
            PeriodType::from_label(&iv.kind),
            PeriodSource::from_minutes(iv.duration),
            ChannelType::from_label(&iv.channel_type),
        ) else {
            continue;
        };
        if !iv.spot_per_kwh.is_finite() {
            return Err(RelayError::upstream_data(format!(
                "non-finite spot price ending {}",
                iv.end_time
            )));
        }
        // startTime is offset by one second upstream; the end is exact
        let end = DateTime::parse_from_rfc3339(&iv.end_time)?.with_timezone(&Utc);
        records.push(PriceRecord {
            period: end - Duration::minutes(i64::from(period_source.minutes())),
            period_type,
            period_source,
            wholesale_per_kwh: iv.spot_per_kwh / CENTS_PER_DOLLAR,
            channel_type,
        });
    }
    Ok(records)
}
