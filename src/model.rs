//! Typed representations of Tuya Cloud entities used in automations
//!
//! These structs mirror the JSON shapes exchanged with the cloud platform:
//! device listings, shadow properties, and scene rule payloads. Unknown
//! fields are ignored at the deserialization boundary; optional fields stay
//! explicit `Option`s instead of silently defaulting.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entity type used for property-report conditions
pub const ENTITY_TYPE_DEVICE_REPORT: &str = "device_report";

/// Action executor used for device command actions
pub const ACTION_EXECUTOR_DEVICE_ISSUE: &str = "device_issue";

/// Scene rule type for condition-driven automations
pub const SCENE_TYPE_AUTOMATION: &str = "automation";

/// Scene rule type for manually triggered scenes; never auto-enabled
pub const SCENE_TYPE_TAP_TO_RUN: &str = "tap_to_run";

/// Minimal device snapshot returned by the space device listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    /// Opaque device id, stable identity
    pub id: String,

    /// Product id, used for registry-level property mapping
    #[serde(rename = "productId", default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    /// Tuya category code (e.g. `cz` for sockets)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Product name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// User-facing label assigned in the Tuya app
    #[serde(rename = "customName", default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,

    /// Online state at discovery time
    #[serde(rename = "isOnline", default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,

    /// LAN address, when the platform reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// Hardware model string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Device time zone
    #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl Device {
    /// Label preferred for user-facing lookups: custom name, then name, then id
    pub fn label(&self) -> &str {
        self.custom_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Last-reported value of a single data point from the device shadow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Property {
    /// Data-point code identifying the capability
    pub code: String,

    /// Reported value; bool, number, or string depending on the DP
    pub value: Value,

    /// Report timestamp in epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,

    /// User-facing label for the data point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,

    /// Numeric data-point id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp_id: Option<i64>,

    /// Data-point value type reported by the platform
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}

/// Condition expression inside a scene condition
///
/// Property conditions use `status_code`/`comparator`/`status_value`; the
/// remaining fields cover the timer and weather variants the platform
/// accepts in the same slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConditionExpr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<String>,

    /// One of `>`, `<`, `==`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparator: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loops: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_value: Option<Value>,
}

/// A single scene trigger condition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneCondition {
    /// Device id the condition observes
    pub entity_id: String,

    /// Condition entity type; `device_report` for property conditions
    pub entity_type: String,

    pub expr: ConditionExpr,

    /// 1-based position used by the decision expression; assigned at
    /// compile time and never left unset in a compiled rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
}

/// Function invocation carried by a scene action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorProperty {
    pub function_code: String,
    pub function_value: Value,
}

/// A single scene action issued to a device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneAction {
    /// Device id the action targets
    pub entity_id: String,

    /// Action executor type; `device_issue` for device commands
    pub action_executor: String,

    pub executor_property: ExecutorProperty,
}

/// Recurring daily time window restricting when a scene may fire
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EffectiveTime {
    /// Window start, HH:MM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    /// Window end, HH:MM; may wrap past midnight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    /// 7-character day-of-week bitmask, Monday first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loops: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone_id: Option<String>,
}

/// Server-side automation definition combining conditions and actions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneRule {
    pub space_id: String,
    pub name: String,

    /// Rule type; `automation` for compiled heuristic proposals
    #[serde(rename = "type")]
    pub rule_type: String,

    /// `and` or `or` over the numbered conditions
    pub decision_expr: String,

    pub conditions: Vec<SceneCondition>,
    pub actions: Vec<SceneAction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_time: Option<EffectiveTime>,
}

impl SceneRule {
    /// Serialize to the JSON payload shape the scene endpoints accept,
    /// with unset optional fields omitted
    pub fn as_payload(&self) -> Value {
        // skip_serializing_if attributes drop the None fields
        serde_json::to_value(self).expect("scene rule serialization is infallible")
    }

    /// Whether this rule should be enabled right after creation;
    /// tap-to-run scenes are triggered manually and must not be
    pub fn is_auto_enable_candidate(&self) -> bool {
        self.rule_type == SCENE_TYPE_AUTOMATION
    }
}
