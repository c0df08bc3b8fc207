//! Relay orchestration
//!
//! A [`Relay`] owns the price client, the publisher and one [`ScheduleState`]
//! per cadence. A single loop wakes on the earliest cadence, services every
//! cadence that is due, and goes back to sleep. Cadences due together share
//! one upstream fetch and then finish concurrently. Cadences never share a
//! failure: each one is rescheduled from its own grid whatever happened
//! during its cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures::future::join_all;

use crate::error::{RelayError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger, get_logger_with_context};
use crate::pricing::{DerivedPrice, TariffSet};
use crate::publish::Publisher;
use crate::schedule::ScheduleState;
use crate::shutdown::Shutdown;
use crate::source::{PriceRecord, PriceSource, PriceSourceClient, RawPriceSnapshot};

/// What a cadence publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceKind {
    /// Near-real-time five minute price, falling back to the settled price
    Bid,
    /// Settled thirty minute price
    Settled,
}

impl CadenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bid => "bid",
            Self::Settled => "settled",
        }
    }

    /// Granularity segment of the output topics
    pub fn granularity(&self) -> &'static str {
        match self {
            Self::Bid => "5m_bid",
            Self::Settled => "30m",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cadence<Tz: TimeZone> {
    pub kind: CadenceKind,
    pub schedule: ScheduleState<Tz>,
}

/// Result of servicing one cadence once
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Published {
        record: PriceRecord,
        fallback: bool,
        failed_publishes: usize,
    },
    NoData,
    FetchFailed,
}

/// Builds `<prefix>/<direction>/<granularity>[_raw]`
#[derive(Debug, Clone)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn import(&self, granularity: &str) -> String {
        format!("{}/import/{}", self.prefix, granularity)
    }

    pub fn export(&self, granularity: &str) -> String {
        format!("{}/export/{}", self.prefix, granularity)
    }

    pub fn import_raw(&self, granularity: &str) -> String {
        format!("{}/import/{}_raw", self.prefix, granularity)
    }
}

pub struct Relay<S, P, Tz: TimeZone> {
    client: PriceSourceClient<S>,
    publisher: P,
    tariffs: TariffSet,
    topics: Topics,
    tz: Tz,
    cadences: Vec<Cadence<Tz>>,
    wait_granularity: Duration,
    logger: StructuredLogger,
}

impl<S, P, Tz> Relay<S, P, Tz>
where
    S: PriceSource,
    P: Publisher,
    Tz: TimeZone,
{
    pub fn new(
        client: PriceSourceClient<S>,
        publisher: P,
        tariffs: TariffSet,
        topics: Topics,
        tz: Tz,
    ) -> Self {
        Self {
            client,
            publisher,
            tariffs,
            topics,
            tz,
            cadences: Vec::new(),
            wait_granularity: Duration::from_secs(1),
            logger: get_logger("relay"),
        }
    }

    /// Longest single sleep between shutdown checks and clock re-reads
    pub fn with_wait_granularity(mut self, granularity: Duration) -> Self {
        self.wait_granularity = granularity.max(Duration::from_millis(10));
        self
    }

    /// Register a cadence whose first wake is the next aligned time after `now`
    pub fn add_cadence(
        &mut self,
        kind: CadenceKind,
        cadence_minutes: u32,
        lag_seconds: u32,
        now: DateTime<Utc>,
    ) {
        let local = now.with_timezone(&self.tz);
        let schedule = ScheduleState::new(&local, cadence_minutes, lag_seconds);
        self.logger.info(&format!(
            "Cadence {} every {} min (+{}s), first wake {}",
            kind.as_str(),
            cadence_minutes,
            lag_seconds,
            schedule.next_wake.with_timezone(&Utc)
        ));
        self.cadences.push(Cadence { kind, schedule });
    }

    pub fn cadences(&self) -> &[Cadence<Tz>] {
        &self.cadences
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn client(&self) -> &PriceSourceClient<S> {
        &self.client
    }

    /// Earliest pending wake across all cadences
    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        self.cadences
            .iter()
            .map(|c| c.schedule.next_wake.with_timezone(&Utc))
            .min()
    }

    /// Service every cadence due at `now` and reschedule each one.
    ///
    /// Due cadences share a single fetch and then derive and publish
    /// concurrently, so a slow publish on one never holds back another.
    pub async fn service_due(&mut self, now: DateTime<Utc>) -> Vec<(CadenceKind, CycleOutcome)> {
        let local = now.with_timezone(&self.tz);
        let due: Vec<usize> = (0..self.cadences.len())
            .filter(|&idx| self.cadences[idx].schedule.is_due(&local))
            .collect();
        if due.is_empty() {
            return Vec::new();
        }

        let fetched = self.client.fetch_latest(false).await;
        let outcomes = join_all(
            due.iter()
                .map(|&idx| self.complete_cycle(self.cadences[idx].kind, now, &fetched)),
        )
        .await;

        let mut serviced = Vec::with_capacity(due.len());
        for (idx, outcome) in due.into_iter().zip(outcomes) {
            let kind = self.cadences[idx].kind;
            let next = self.cadences[idx].schedule.advance(&local);
            self.logger.debug(&format!(
                "Cadence {} next wake {}",
                kind.as_str(),
                next.with_timezone(&Utc)
            ));
            serviced.push((kind, outcome));
        }
        serviced
    }

    /// One fetch → derive → publish pass for `kind`
    pub async fn service_cadence(&self, kind: CadenceKind, now: DateTime<Utc>) -> CycleOutcome {
        let fetched = self.client.fetch_latest(false).await;
        self.complete_cycle(kind, now, &fetched).await
    }

    async fn complete_cycle(
        &self,
        kind: CadenceKind,
        now: DateTime<Utc>,
        fetched: &Result<Arc<RawPriceSnapshot>>,
    ) -> CycleOutcome {
        let logger = get_logger_with_context(cycle_context(kind, now));

        let snapshot = match fetched {
            Ok(snapshot) => snapshot.clone(),
            // An unusable payload means no fresh data; selection falls back
            // to whatever the last good poll held.
            Err(e) if matches!(e, RelayError::UpstreamData { .. }) => {
                logger.warn(&format!(
                    "Unusable upstream data, treating as no data (recoverable={}): {}",
                    e.is_recoverable(),
                    e
                ));
                self.client
                    .cached()
                    .await
                    .unwrap_or_else(|| Arc::new(RawPriceSnapshot::new(now, Vec::new())))
            }
            Err(e) => {
                logger.error(&format!(
                    "Fetch failed, skipping cycle (recoverable={}): {}",
                    e.is_recoverable(),
                    e
                ));
                return CycleOutcome::FetchFailed;
            }
        };

        let (record, fallback) = match kind {
            CadenceKind::Bid => match snapshot.latest_fine(&now) {
                Some(record) => (record, false),
                None => match snapshot.latest_settled() {
                    Some(record) => {
                        logger.info(&format!(
                            "No 5m record for current period, using settled price from {}",
                            record.period
                        ));
                        (record, true)
                    }
                    None => {
                        logger.warn("No 5m or settled record available");
                        return CycleOutcome::NoData;
                    }
                },
            },
            CadenceKind::Settled => match snapshot.latest_settled() {
                Some(record) => (record, false),
                None => {
                    logger.warn("No settled record available");
                    return CycleOutcome::NoData;
                }
            },
        };

        let derived = DerivedPrice::derive(record, &self.tariffs);
        let failed_publishes = self.publish_derived(kind, &derived, &logger).await;
        logger.info(&format!(
            "Published {} import={:.4} export={:.4} wholesale={:.4} period={} type={} source={}{}",
            kind.granularity(),
            derived.import_price,
            derived.export_price,
            derived.wholesale_price,
            record.period,
            record.period_type.as_str(),
            record.period_source.as_str(),
            if fallback { " (fallback)" } else { "" }
        ));

        CycleOutcome::Published {
            record: record.clone(),
            fallback,
            failed_publishes,
        }
    }

    /// Publish each value independently; returns how many failed
    async fn publish_derived(
        &self,
        kind: CadenceKind,
        derived: &DerivedPrice,
        logger: &StructuredLogger,
    ) -> usize {
        let granularity = kind.granularity();
        let mut values = vec![
            (self.topics.import(granularity), derived.import_price),
            (self.topics.export(granularity), derived.export_price),
        ];
        if kind == CadenceKind::Bid {
            values.push((self.topics.import_raw(granularity), derived.wholesale_price));
        }

        let mut failed = 0;
        for (topic, value) in values {
            if let Err(e) = self.publisher.publish(&topic, value).await {
                failed += 1;
                logger.warn(&format!("Publish failed: {}", e));
            }
        }
        failed
    }

    /// Run until `shutdown` fires.
    ///
    /// Sleeps are capped at the wait granularity so shutdown stays prompt and
    /// wall-clock jumps are noticed. An in-flight cycle is abandoned when
    /// shutdown fires.
    pub async fn run(&mut self, mut shutdown: Shutdown) -> Result<()> {
        self.logger
            .info(&format!("Relay running for site {}", self.client.site()));
        while !shutdown.is_triggered() {
            tokio::select! {
                _ = self.service_due(Utc::now()) => {}
                _ = shutdown.wait() => break,
            }

            let Some(wake) = self.next_wake() else {
                self.logger.warn("No cadences configured, stopping");
                break;
            };
            let remaining = (wake - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            let nap = remaining.min(self.wait_granularity);
            if nap.is_zero() {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                _ = shutdown.wait() => break,
            }
        }
        self.logger.info("Relay stopped");
        Ok(())
    }
}

/// Fields attached to every log line of one cycle
fn cycle_context(kind: CadenceKind, now: DateTime<Utc>) -> LogContext {
    LogContext::new("relay")
        .with_field("cadence", kind.as_str().to_string())
        .with_field("granularity", kind.granularity().to_string())
        .with_field("at", now.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_logs_carry_cadence_granularity_and_time() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 10).unwrap();
        let ctx = cycle_context(CadenceKind::Bid, now);
        assert_eq!(ctx.component, "relay");
        assert_eq!(ctx.extra_fields["cadence"], "bid");
        assert_eq!(ctx.extra_fields["granularity"], "5m_bid");
        assert_eq!(ctx.extra_fields["at"], "2024-03-01T10:05:10+00:00");
    }

    #[test]
    fn topic_names_are_stable() {
        let topics = Topics::new("amber/");
        assert_eq!(topics.import("5m_bid"), "amber/import/5m_bid");
        assert_eq!(topics.export("5m_bid"), "amber/export/5m_bid");
        assert_eq!(topics.import_raw("5m_bid"), "amber/import/5m_bid_raw");
        assert_eq!(
            topics.import(CadenceKind::Settled.granularity()),
            "amber/import/30m"
        );
    }
}
