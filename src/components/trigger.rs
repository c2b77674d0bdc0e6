// Trigger descriptions and the persisted trigger record

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{NotificationError, NotificationResult};

/// When a notification should be delivered in the future
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TriggerSpec {
    /// Fire once after the delay, or repeatedly when a repeat interval is set
    Timestamp {
        fire_delay_seconds: u64,
        #[serde(default, deserialize_with = "repeat_sentinel")]
        repeat_interval_seconds: Option<u64>,
    },
    /// Fire every `interval` units, starting as soon as the work is picked up
    Interval { interval: u64, time_unit: TimeUnit },
}

/// Older payloads encode "no repeat" as -1
fn repeat_sentinel<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| u64::try_from(value).ok()))
}

impl TriggerSpec {
    pub fn once_after(delay: Duration) -> Self {
        TriggerSpec::Timestamp {
            fire_delay_seconds: delay.as_secs(),
            repeat_interval_seconds: None,
        }
    }

    pub fn interval(interval: u64, time_unit: TimeUnit) -> Self {
        TriggerSpec::Interval { interval, time_unit }
    }

    /// Timestamp trigger for an absolute instant, optionally repeating.
    ///
    /// Instants in the past fire immediately.
    pub fn at(fire_at: DateTime<Utc>, repeat: Option<RepeatFrequency>) -> Self {
        Self::at_from(fire_at, repeat, Utc::now())
    }

    pub fn at_from(fire_at: DateTime<Utc>, repeat: Option<RepeatFrequency>, now: DateTime<Utc>) -> Self {
        let delay = (fire_at - now).num_seconds().max(0) as u64;
        TriggerSpec::Timestamp {
            fire_delay_seconds: delay,
            repeat_interval_seconds: repeat.map(|frequency| frequency.interval().as_secs()),
        }
    }

    /// Delay before the first firing
    pub fn initial_delay(&self) -> Duration {
        match self {
            TriggerSpec::Timestamp {
                fire_delay_seconds, ..
            } => Duration::from_secs(*fire_delay_seconds),
            TriggerSpec::Interval { .. } => Duration::ZERO,
        }
    }

    /// Period between firings, `None` for one-shot triggers
    pub fn repeat_interval(&self) -> Option<Duration> {
        match self {
            TriggerSpec::Timestamp {
                repeat_interval_seconds,
                ..
            } => repeat_interval_seconds.map(Duration::from_secs),
            TriggerSpec::Interval { interval, time_unit } => Some(time_unit.duration(*interval)),
        }
    }

    pub fn work_kind(&self) -> WorkKind {
        match self.repeat_interval() {
            Some(_) => WorkKind::Periodic,
            None => WorkKind::OneTime,
        }
    }

    pub fn validate(&self) -> NotificationResult<()> {
        if let Some(period) = self.repeat_interval()
            && period.is_zero()
        {
            return Err(NotificationError::Validation {
                field: "trigger".to_string(),
                message: "Repeat interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> NotificationResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> NotificationResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn duration(&self, amount: u64) -> Duration {
        let seconds = match self {
            TimeUnit::Seconds => amount,
            TimeUnit::Minutes => amount.saturating_mul(60),
            TimeUnit::Hours => amount.saturating_mul(60 * 60),
            TimeUnit::Days => amount.saturating_mul(24 * 60 * 60),
        };
        Duration::from_secs(seconds)
    }
}

/// Calendar-style repetition for timestamp triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatFrequency {
    Hourly,
    Daily,
    Weekly,
}

impl RepeatFrequency {
    pub fn interval(&self) -> Duration {
        match self {
            RepeatFrequency::Hourly => TimeUnit::Hours.duration(1),
            RepeatFrequency::Daily => TimeUnit::Days.duration(1),
            RepeatFrequency::Weekly => TimeUnit::Days.duration(7),
        }
    }
}

/// Kind of durable work request backing a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkKind {
    #[serde(rename = "one-time")]
    OneTime,
    #[serde(rename = "periodic")]
    Periodic,
}

impl WorkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkKind::OneTime => "one-time",
            WorkKind::Periodic => "periodic",
        }
    }
}

impl std::fmt::Display for WorkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkKind {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one-time" => Ok(WorkKind::OneTime),
            "periodic" => Ok(WorkKind::Periodic),
            other => Err(NotificationError::Serialization(format!(
                "Unknown work request kind '{}'",
                other
            ))),
        }
    }
}

/// Persisted pairing of a spec and its trigger, keyed by notification id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRecord {
    pub notification_id: String,
    /// Serialized spec; may be missing in rows written by older versions
    pub notification: Option<Vec<u8>>,
    pub trigger: Vec<u8>,
    pub work_kind: WorkKind,
    pub created_at: DateTime<Utc>,
}

impl TriggerRecord {
    pub fn decode_trigger(&self) -> NotificationResult<TriggerSpec> {
        TriggerSpec::from_bytes(&self.trigger)
    }

    /// Delay until the next firing due as of `now`, counted from when the
    /// record was scheduled.
    ///
    /// A one-shot whose time has passed is due immediately. Periodic triggers
    /// keep their phase: the next run is the first `first + k * period` after
    /// `now`, so runs missed while nothing was scheduled collapse into none.
    pub fn next_run_delay(&self, now: DateTime<Utc>) -> NotificationResult<Duration> {
        let trigger = self.decode_trigger()?;
        let elapsed = (now - self.created_at).to_std().unwrap_or(Duration::ZERO);
        let first = trigger.initial_delay();
        if elapsed < first {
            return Ok(first - elapsed);
        }

        match trigger.repeat_interval() {
            Some(period) if !period.is_zero() => {
                let into_period = (elapsed - first).as_nanos() % period.as_nanos();
                let into_period = Duration::from_nanos(u64::try_from(into_period).unwrap_or(u64::MAX));
                Ok(period.saturating_sub(into_period))
            },
            _ => Ok(Duration::ZERO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_repeat_sentinel_means_one_shot() {
        let trigger: TriggerSpec = serde_json::from_str(
            r#"{"type":"timestamp","fireDelaySeconds":5,"repeatIntervalSeconds":-1}"#,
        )
        .unwrap();
        assert_eq!(trigger, TriggerSpec::once_after(Duration::from_secs(5)));
        assert_eq!(trigger.work_kind(), WorkKind::OneTime);

        let missing: TriggerSpec =
            serde_json::from_str(r#"{"type":"timestamp","fireDelaySeconds":5}"#).unwrap();
        assert_eq!(missing.work_kind(), WorkKind::OneTime);
    }

    #[test]
    fn repeating_and_interval_triggers_are_periodic() {
        let repeating: TriggerSpec = serde_json::from_str(
            r#"{"type":"timestamp","fireDelaySeconds":5,"repeatIntervalSeconds":3600}"#,
        )
        .unwrap();
        assert_eq!(repeating.work_kind(), WorkKind::Periodic);
        assert_eq!(repeating.repeat_interval(), Some(Duration::from_secs(3600)));
        assert_eq!(repeating.initial_delay(), Duration::from_secs(5));

        let interval = TriggerSpec::interval(15, TimeUnit::Minutes);
        assert_eq!(interval.work_kind(), WorkKind::Periodic);
        assert_eq!(interval.repeat_interval(), Some(Duration::from_secs(900)));
        assert_eq!(interval.initial_delay(), Duration::ZERO);
    }

    #[test]
    fn absolute_instant_in_past_fires_immediately() {
        let now = Utc::now();
        let past = TriggerSpec::at_from(now - chrono::Duration::seconds(30), None, now);
        assert_eq!(past.initial_delay(), Duration::ZERO);

        let future = TriggerSpec::at_from(
            now + chrono::Duration::seconds(90),
            Some(RepeatFrequency::Daily),
            now,
        );
        assert_eq!(future.initial_delay(), Duration::from_secs(90));
        assert_eq!(future.repeat_interval(), Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn zero_period_is_rejected() {
        assert!(TriggerSpec::interval(0, TimeUnit::Hours).validate().is_err());
        assert!(TriggerSpec::once_after(Duration::ZERO).validate().is_ok());
    }

    fn record(trigger: TriggerSpec, created_at: DateTime<Utc>) -> TriggerRecord {
        TriggerRecord {
            notification_id: "n1".to_string(),
            notification: None,
            trigger: trigger.to_bytes().unwrap(),
            work_kind: trigger.work_kind(),
            created_at,
        }
    }

    #[test]
    fn one_shot_delay_accounts_for_elapsed_time() {
        let created_at = Utc::now();
        let record = record(TriggerSpec::once_after(Duration::from_secs(60)), created_at);
        let later = created_at + chrono::Duration::seconds(45);
        assert_eq!(record.next_run_delay(later).unwrap(), Duration::from_secs(15));
        let much_later = created_at + chrono::Duration::seconds(600);
        assert_eq!(record.next_run_delay(much_later).unwrap(), Duration::ZERO);
    }

    #[test]
    fn interval_delay_keeps_phase() {
        let created_at = Utc::now();
        let record = record(TriggerSpec::interval(1, TimeUnit::Hours), created_at);
        let later = created_at + chrono::Duration::minutes(90);
        assert_eq!(record.next_run_delay(later).unwrap(), Duration::from_secs(30 * 60));
        let days_later = created_at + chrono::Duration::hours(49) + chrono::Duration::minutes(45);
        assert_eq!(record.next_run_delay(days_later).unwrap(), Duration::from_secs(15 * 60));
    }

    #[test]
    fn repeating_timestamp_delay_counts_from_first_firing() {
        let created_at = Utc::now();
        let daily = TriggerSpec::Timestamp {
            fire_delay_seconds: 3600,
            repeat_interval_seconds: Some(86_400),
        };
        let record = record(daily, created_at);
        // first firing still ahead
        let soon = created_at + chrono::Duration::minutes(20);
        assert_eq!(record.next_run_delay(soon).unwrap(), Duration::from_secs(40 * 60));
        // three days in, two hours after the third firing
        let later = created_at + chrono::Duration::hours(3 * 24 + 3);
        assert_eq!(record.next_run_delay(later).unwrap(), Duration::from_secs(22 * 3600));
    }

    #[test]
    fn work_kind_strings() {
        assert_eq!(WorkKind::OneTime.as_str(), "one-time");
        assert_eq!("periodic".parse::<WorkKind>().unwrap(), WorkKind::Periodic);
        assert!("weekly".parse::<WorkKind>().is_err());
    }
}
