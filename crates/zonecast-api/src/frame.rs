// ── Wire types for the zone streams ──
//
// Main-stream frames are `{ "data": [ { "zoneName": "A01", ... }, ... ] }`.
// Dedicated zone streams send the zone's own object per frame.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One zone's slice of a main-stream frame.
///
/// Uses `#[serde(flatten)]` to keep every sensor/status field the server
/// sends, so re-serializing yields the original object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneUpdate {
    /// Zone identifier exactly as the server sent it, e.g. `"a01"`.
    #[serde(rename = "zoneName")]
    pub zone_name: String,

    /// All remaining fields of the update.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ZoneUpdate {
    /// Look up a payload field by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Re-assemble the update into the JSON object it came from.
    pub fn to_value(&self) -> Value {
        let mut obj = self.fields.clone();
        obj.insert("zoneName".into(), Value::String(self.zone_name.clone()));
        Value::Object(obj)
    }
}

/// A decoded main-stream frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MainFrame {
    pub updates: Vec<ZoneUpdate>,
    /// Elements of `data` that were not zone updates (no string `zoneName`).
    pub skipped: usize,
}

impl MainFrame {
    /// Extract the zone updates from a parsed frame.
    ///
    /// Returns `None` when `data` is missing or is not an array; such
    /// frames carry nothing to fan out.
    pub fn from_value(frame: &Value) -> Option<Self> {
        let items = frame.get("data")?.as_array()?;

        let mut out = Self::default();
        for item in items {
            match serde_json::from_value::<ZoneUpdate>(item.clone()) {
                Ok(update) => out.updates.push(update),
                Err(e) => {
                    tracing::trace!(error = %e, "skipping non-zone element in frame");
                    out.skipped += 1;
                }
            }
        }
        Some(out)
    }
}
