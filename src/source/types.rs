use chrono::{DateTime, Duration, Utc};

/// Whether a record is settled, in progress, or a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodType {
    Actual,
    Current,
    Forecast,
}

impl PeriodType {
    /// Map the upstream interval `type` label
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "ActualInterval" => Some(Self::Actual),
            "CurrentInterval" => Some(Self::Current),
            "ForecastInterval" => Some(Self::Forecast),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Actual => "ACTUAL",
            Self::Current => "CURRENT",
            Self::Forecast => "FORECAST",
        }
    }
}

/// Granularity of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodSource {
    FiveMinute,
    ThirtyMinute,
}

impl PeriodSource {
    pub fn from_minutes(minutes: u64) -> Option<Self> {
        match minutes {
            5 => Some(Self::FiveMinute),
            30 => Some(Self::ThirtyMinute),
            _ => None,
        }
    }

    pub fn minutes(&self) -> u32 {
        match self {
            Self::FiveMinute => 5,
            Self::ThirtyMinute => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FiveMinute => "5m",
            Self::ThirtyMinute => "30m",
        }
    }
}

/// Metering channel a record was priced for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    General,
    FeedIn,
    ControlledLoad,
}

impl ChannelType {
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "general" => Some(Self::General),
            "feedIn" => Some(Self::FeedIn),
            "controlledLoad" => Some(Self::ControlledLoad),
            _ => None,
        }
    }
}

/// One upstream price observation; prices are in $/kWh
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    /// Start of the interval
    pub period: DateTime<Utc>,
    pub period_type: PeriodType,
    pub period_source: PeriodSource,
    pub wholesale_per_kwh: f64,
    pub channel_type: ChannelType,
}

impl PriceRecord {
    pub fn period_end(&self) -> DateTime<Utc> {
        self.period + Duration::minutes(i64::from(self.period_source.minutes()))
    }

    pub fn covers(&self, at: &DateTime<Utc>) -> bool {
        self.period <= *at && *at < self.period_end()
    }
}

/// Everything one poll returned, stamped with when the poll was issued
#[derive(Debug, Clone, PartialEq)]
pub struct RawPriceSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub records: Vec<PriceRecord>,
}

impl RawPriceSnapshot {
    pub fn new(fetched_at: DateTime<Utc>, records: Vec<PriceRecord>) -> Self {
        Self {
            fetched_at,
            records,
        }
    }

    /// Freshest non-forecast fine-grained record whose interval contains `now`
    pub fn latest_fine(&self, now: &DateTime<Utc>) -> Option<&PriceRecord> {
        self.pick(|r| {
            r.period_source == PeriodSource::FiveMinute
                && r.period_type != PeriodType::Forecast
                && r.covers(now)
        })
    }

    /// Most recent settled (actual) coarse record
    pub fn latest_settled(&self) -> Option<&PriceRecord> {
        self.pick(|r| {
            r.period_source == PeriodSource::ThirtyMinute && r.period_type == PeriodType::Actual
        })
    }

    /// Latest `period` among matching records. The general channel carries
    /// the import wholesale figure, so it wins over other channels.
    fn pick<F>(&self, filter: F) -> Option<&PriceRecord>
    where
        F: Fn(&PriceRecord) -> bool,
    {
        let general = self
            .records
            .iter()
            .filter(|r| filter(*r) && r.channel_type == ChannelType::General)
            .max_by_key(|r| r.period);
        general.or_else(|| {
            self.records
                .iter()
                .filter(|r| filter(*r))
                .max_by_key(|r| r.period)
        })
    }
}

/// Opaque upstream site id, resolved once per process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteId(pub String);

impl SiteId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    fn rec(
        period: DateTime<Utc>,
        period_type: PeriodType,
        period_source: PeriodSource,
        channel_type: ChannelType,
        price: f64,
    ) -> PriceRecord {
        PriceRecord {
            period,
            period_type,
            period_source,
            wholesale_per_kwh: price,
            channel_type,
        }
    }

    #[test]
    fn settled_selection_skips_forecasts_and_takes_latest() {
        use ChannelType::General;
        use PeriodSource::ThirtyMinute;
        let snap = RawPriceSnapshot::new(
            at(10, 31),
            vec![
                rec(at(9, 30), PeriodType::Actual, ThirtyMinute, General, 0.07),
                rec(at(10, 0), PeriodType::Actual, ThirtyMinute, General, 0.08),
                rec(at(10, 30), PeriodType::Current, ThirtyMinute, General, 0.09),
                rec(at(11, 0), PeriodType::Forecast, ThirtyMinute, General, 0.10),
            ],
        );
        let picked = snap.latest_settled().unwrap();
        assert_eq!(picked.period, at(10, 0));
        assert!((picked.wholesale_per_kwh - 0.08).abs() < 1e-12);
    }

    #[test]
    fn fine_selection_requires_current_period() {
        use ChannelType::General;
        use PeriodSource::FiveMinute;
        let snap = RawPriceSnapshot::new(
            at(10, 7),
            vec![
                rec(at(10, 0), PeriodType::Actual, FiveMinute, General, 0.05),
                rec(at(10, 5), PeriodType::Current, FiveMinute, General, 0.06),
            ],
        );
        assert_eq!(snap.latest_fine(&at(10, 7)).unwrap().period, at(10, 5));
        assert!(snap.latest_fine(&at(10, 10)).is_none());
    }

    #[test]
    fn general_channel_preferred_over_feed_in() {
        use PeriodSource::ThirtyMinute;
        let snap = RawPriceSnapshot::new(
            at(10, 31),
            vec![
                rec(at(10, 0), PeriodType::Actual, ThirtyMinute, ChannelType::FeedIn, -0.02),
                rec(at(9, 30), PeriodType::Actual, ThirtyMinute, ChannelType::General, 0.04),
            ],
        );
        assert_eq!(snap.latest_settled().unwrap().channel_type, ChannelType::General);
    }

    #[test]
    fn falls_back_to_any_channel_without_general() {
        let snap = RawPriceSnapshot::new(
            at(10, 31),
            vec![rec(
                at(10, 0),
                PeriodType::Actual,
                PeriodSource::ThirtyMinute,
                ChannelType::FeedIn,
                -0.02,
            )],
        );
        assert_eq!(snap.latest_settled().unwrap().channel_type, ChannelType::FeedIn);
    }

    #[test]
    fn labels_map() {
        assert_eq!(PeriodType::from_label("ActualInterval"), Some(PeriodType::Actual));
        assert_eq!(PeriodType::from_label("bogus"), None);
        assert_eq!(PeriodSource::from_minutes(30), Some(PeriodSource::ThirtyMinute));
        assert_eq!(PeriodSource::from_minutes(15), None);
        assert_eq!(ChannelType::from_label("feedIn"), Some(ChannelType::FeedIn));
    }
}
