use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const PAGEVIEW_EVENT: &str = "$pageview";
pub const CREATE_ALIAS_EVENT: &str = "$create_alias";

// ============================================================================
// Amplitude export records
// ============================================================================

/// One event as it appears in an Amplitude export shard.
/// Fields we don't translate are ignored on deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceEvent {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub event_type: String,
    /// ISO-8601 / Amplitude `YYYY-MM-DD HH:MM:SS.ffffff` string, or epoch.
    #[serde(default)]
    pub event_time: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub event_properties: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_properties: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub group_properties: Map<String, Value>,
    #[serde(default)]
    pub uuid: Option<String>,
}

impl SourceEvent {
    pub fn primary_id(&self) -> Option<&str> {
        non_empty(self.user_id.as_deref())
    }

    pub fn secondary_id(&self) -> Option<&str> {
        non_empty(self.device_id.as_deref())
    }
}

fn non_empty(id: Option<&str>) -> Option<&str> {
    id.filter(|s| !s.is_empty())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// PostHog batch messages
// ============================================================================

/// A capture event in the shape accepted by the PostHog `/batch` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distinct_id: Option<String>,
    pub timestamp: String,
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasProperties {
    pub distinct_id: String,
    pub alias: String,
}

/// Merges `alias` (the Amplitude device id) into the person identified by
/// `distinct_id` (the Amplitude user id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasMessage {
    pub event: String,
    pub distinct_id: String,
    pub timestamp: String,
    pub properties: AliasProperties,
}

impl AliasMessage {
    pub fn new(primary: &str, secondary: &str, timestamp: &str) -> Self {
        Self {
            event: CREATE_ALIAS_EVENT.to_string(),
            distinct_id: primary.to_string(),
            timestamp: timestamp.to_string(),
            properties: AliasProperties {
                distinct_id: primary.to_string(),
                alias: secondary.to_string(),
            },
        }
    }

    pub fn primary(&self) -> &str {
        &self.distinct_id
    }

    pub fn secondary(&self) -> &str {
        &self.properties.alias
    }
}

/// Anything that can go into a batch. Serialized without a tag so the batch
/// body is a plain array of PostHog messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    Alias(AliasMessage),
    Event(EventMessage),
}

impl Message {
    pub fn is_alias(&self) -> bool {
        matches!(self, Self::Alias(_))
    }
}

impl From<EventMessage> for Message {
    fn from(event: EventMessage) -> Self {
        Self::Event(event)
    }
}

impl From<AliasMessage> for Message {
    fn from(alias: AliasMessage) -> Self {
        Self::Alias(alias)
    }
}
