//! Amplitude record -> PostHog messages.
//!
//! See https://posthog.com/docs/migrate/migrate-from-amplitude for the field
//! mapping.

use crate::alias_ledger::AliasLedger;
use crate::error::TranslationError;
use crate::event_rules::EventNameRules;
use crate::types::{AliasMessage, EventMessage, Message, SourceEvent};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Epoch values at or above this are milliseconds, below are seconds.
const EPOCH_MILLIS_THRESHOLD: u64 = 100_000_000_000;

const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// The PostHog messages produced for one Amplitude record. Aliases come
/// first so they reach PostHog ahead of the event that revealed them.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub aliases: Vec<AliasMessage>,
    pub event: EventMessage,
}

impl Translation {
    pub fn into_messages(self) -> impl Iterator<Item = Message> {
        self.aliases
            .into_iter()
            .map(Message::from)
            .chain(std::iter::once(Message::from(self.event)))
    }
}

pub struct Translator {
    rules: EventNameRules,
    lib_name: String,
    lib_version: String,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(EventNameRules::default())
    }
}

impl Translator {
    pub fn new(rules: EventNameRules) -> Self {
        Self {
            rules,
            lib_name: env!("CARGO_PKG_NAME").to_string(),
            lib_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Translate one record. A (user, device) pair the ledger hasn't seen
    /// yields one alias announcement and is registered immediately; a pair
    /// it has seen yields none. An unparsable timestamp fails before the
    /// ledger is touched.
    pub fn translate(
        &self,
        record: &SourceEvent,
        ledger: &mut AliasLedger,
    ) -> Result<Translation, TranslationError> {
        let timestamp = canonical_timestamp(&record.event_time)?;

        let mut aliases = Vec::new();
        if let (Some(primary), Some(secondary)) = (record.primary_id(), record.secondary_id()) {
            if ledger.register(primary, secondary) {
                aliases.push(AliasMessage::new(primary, secondary, &timestamp));
            }
        }

        let event = EventMessage {
            event: self.rules.rename(&record.event_type).to_string(),
            distinct_id: record
                .primary_id()
                .or(record.secondary_id())
                .map(str::to_string),
            timestamp,
            properties: self.properties(record),
            uuid: record
                .uuid
                .as_deref()
                .and_then(|raw| Uuid::parse_str(raw).ok()),
        };

        Ok(Translation { aliases, event })
    }

    fn properties(&self, record: &SourceEvent) -> Map<String, Value> {
        let mut properties = record.event_properties.clone();
        properties.insert("$lib".to_string(), Value::from(self.lib_name.as_str()));
        properties.insert(
            "$lib_version".to_string(),
            Value::from(self.lib_version.as_str()),
        );
        properties.insert("$geoip_disable".to_string(), Value::Bool(true));

        let mut set = record.user_properties.clone();
        set.extend(
            record
                .group_properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        properties.insert("$set".to_string(), Value::Object(set));

        properties
    }
}

/// Parse an Amplitude event time and render it as RFC 3339 UTC with
/// millisecond precision.
pub fn canonical_timestamp(raw: &Value) -> Result<String, TranslationError> {
    parse_event_time(raw)
        .map(|instant| instant.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or_else(|| TranslationError::InvalidTimestamp {
            value: match raw {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        })
}

fn parse_event_time(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => parse_time_str(s.trim()),
        Value::Number(n) => n.as_i64().and_then(from_epoch),
        _ => None,
    }
}

fn parse_time_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(s) {
        return Some(instant.with_timezone(&Utc));
    }
    // Amplitude exports naive UTC times
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse().ok().and_then(from_epoch);
    }
    None
}

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value.unsigned_abs() >= EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}
