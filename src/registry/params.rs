//! Argument structs for every capability. The JSON schemas derived from these
//! are the single source of truth for argument names, their order (used for
//! positional calls from scripts), which are required, and the descriptions
//! shown to the agent.

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::Deserialize;

/// A color argument exactly as the caller sent it. Resolved (and rejected)
/// by [`super::validation::resolve_color`] so the error can name the field.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct ColorArg(pub serde_json::Value);

impl JsonSchema for ColorArg {
    fn schema_name() -> String {
        "Color".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        let schema = serde_json::json!({
            "description": "RGB triple of integers 0-255, e.g. [255, 0, 0], or a color name / \"#rrggbb\" string",
            "anyOf": [
                {
                    "type": "array",
                    "items": { "type": "integer", "minimum": 0, "maximum": 255 },
                    "minItems": 3,
                    "maxItems": 3
                },
                { "type": "string" }
            ]
        });
        serde_json::from_value(schema).unwrap_or(Schema::Bool(true))
    }
}

// ── Edit params ─────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSegmentParams {
    /// Ball timeline, 0-based, less than NUM_BALLS.
    pub timeline_index: i64,
    /// Segment start in seconds.
    pub start_time: f64,
    /// Segment end in seconds, greater than startTime.
    pub end_time: f64,
    pub color: ColorArg,
    /// Lit pixel count. Defaults to the show's default.
    #[serde(default)]
    pub pixel_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModifySegmentParams {
    pub timeline_index: i64,
    /// Index of the segment in start-time order.
    pub segment_index: i64,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub color: Option<ColorArg>,
    #[serde(default)]
    pub pixel_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SegmentRefParams {
    pub timeline_index: i64,
    /// Index of the segment in start-time order.
    pub segment_index: i64,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimelineParams {
    /// Ball timeline, 0-based, less than NUM_BALLS.
    pub timeline_index: i64,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct NoParams {}

// ── Query params ────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WordTimestampsParams {
    /// Word to look up. Case and surrounding punctuation are ignored.
    pub word: String,
    /// Only occurrences starting at or after this time.
    #[serde(default)]
    pub start_time: Option<f64>,
    /// Only occurrences starting at or before this time.
    #[serde(default)]
    pub end_time: Option<f64>,
    /// Maximum number of matches to return.
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BeatsInRangeParams {
    pub start_time: f64,
    pub end_time: f64,
}

// ── Script entry ────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RunScriptParams {
    /// Script source. See the script reference for syntax and available functions.
    pub code: String,
}
