//! Canonicalization of loosely-specified heuristic parameters
//!
//! Callers (config files, conversational tool calls) spell the same
//! intent many ways: `soc_threshold` vs `threshold`, `menor` vs `<`,
//! `desligar` vs `false`. One normalization pass turns the loose map into
//! a typed parameter set so the templates never see an alias. An explicit
//! canonical field is never overwritten by an alias.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Canonical comparator for property conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    GreaterThan,
    LessThan,
    Equal,
}

impl Comparator {
    /// Wire representation accepted by the scene endpoints
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::GreaterThan => ">",
            Comparator::LessThan => "<",
            Comparator::Equal => "==",
        }
    }

    /// Parse a comparator from symbols or English/Portuguese synonyms;
    /// unrecognized text containing a comparison symbol falls back to
    /// symbol detection, anything else yields `None`
    pub fn parse(text: &str) -> Option<Self> {
        let normalized = text.trim().to_lowercase();
        match normalized.as_str() {
            ">" | "gt" | "greater" | "greater_than" | "above" | "more" | "maior" | "acima" => {
                return Some(Comparator::GreaterThan)
            }
            "<" | "lt" | "less" | "less_than" | "below" | "under" | "menor" | "abaixo" => {
                return Some(Comparator::LessThan)
            }
            "==" | "=" | "eq" | "equal" | "equals" | "same" | "igual" => {
                return Some(Comparator::Equal)
            }
            _ => {}
        }
        // Mixed phrases like ">= 50" or "maior que >" still carry a symbol
        if normalized.contains('>') {
            Some(Comparator::GreaterThan)
        } else if normalized.contains('<') {
            Some(Comparator::LessThan)
        } else if normalized.contains('=') {
            Some(Comparator::Equal)
        } else {
            None
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One appended action on another device, validated at build time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraActionSpec {
    /// Target device id
    pub entity_id: String,
    /// Explicit function code, when supplied
    pub function_code: Option<String>,
    /// Logical function name to resolve (`switch`)
    pub function: Option<String>,
    /// Value to issue; boolean-coerced where possible, defaults to `true`
    pub value: Option<Value>,
}

/// Normalized, typed heuristic parameter set
#[derive(Debug, Clone, Default)]
pub struct HeuristicParams {
    pub name: Option<String>,
    pub inverter_device_id: Option<String>,
    pub load_device_id: Option<String>,
    pub sensor_device_id: Option<String>,
    /// Battery threshold (percent); also seeds `status_value`
    pub threshold: Option<Value>,
    /// PV generation threshold in watts
    pub pv_threshold_w: Option<Value>,
    /// Explicit condition value, wins over thresholds
    pub status_value: Option<Value>,
    pub comparator: Option<Comparator>,
    pub switch_value: Option<bool>,
    pub decision_expr: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub loops: Option<String>,
    pub time_zone_id: Option<String>,
    /// Per-call readable property overrides (logical key → DP code)
    pub property_codes: HashMap<String, String>,
    /// Per-call actuator function overrides (logical key → code)
    pub function_codes: HashMap<String, String>,
    pub extra_actions: Vec<ExtraActionSpec>,
}

const THRESHOLD_ALIASES: &[&str] = &["soc_threshold", "threshold_percent"];

const PV_THRESHOLD_ALIASES: &[&str] = &[
    "pv_threshold",
    "surplus_threshold",
    "surplus_threshold_w",
    "surplus_limit",
    "surplus_limit_w",
    "excess_threshold",
    "excess_threshold_w",
];

const COMPARATOR_KEYS: &[&str] = &["comparator", "comparison", "operator"];

const SWITCH_VALUE_KEYS: &[&str] = &["switch_value", "switch_state"];

const SWITCH_DP_ALIASES: &[&str] = &["load_dp_code", "switch_dp_code", "switch_dp"];

/// Coerce booleans, numeric truthiness, and bilingual on/off words;
/// unrecognized strings yield `None` rather than an error
pub fn coerce_switch_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "on" | "true" | "1" | "ligar" | "ativar" | "enable" | "enabled" | "yes" | "sim" => {
                Some(true)
            }
            "off" | "false" | "0" | "desligar" | "apagar" | "disable" | "disabled" | "no"
            | "nao" | "não" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn code_map(map: &Map<String, Value>, key: &str) -> HashMap<String, String> {
    match map.get(key) {
        Some(Value::Object(obj)) => obj
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        _ => HashMap::new(),
    }
}

fn first_present<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| map.get(*key))
}

fn extra_actions(map: &Map<String, Value>) -> Vec<ExtraActionSpec> {
    let Some(Value::Array(items)) = map.get("extra_actions") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let entity_id = obj.get("entity_id").and_then(Value::as_str)?.to_string();
            let function_code = obj
                .get("function_code")
                .and_then(Value::as_str)
                .or_else(|| obj.get("code").and_then(Value::as_str))
                .map(str::to_string);
            let function = obj.get("function").and_then(Value::as_str).map(str::to_string);
            let raw_value = obj
                .get("function_value")
                .or_else(|| obj.get("value"))
                .or_else(|| obj.get("state"));
            let value = raw_value.map(|v| match coerce_switch_value(v) {
                Some(b) => Value::Bool(b),
                None => v.clone(),
            });
            Some(ExtraActionSpec {
                entity_id,
                function_code,
                function,
                value,
            })
        })
        .collect()
}

/// Canonicalize a loose parameter map into a typed set
pub fn normalize(raw: &Map<String, Value>) -> HeuristicParams {
    let mut params = HeuristicParams {
        name: string_field(raw, "name"),
        inverter_device_id: string_field(raw, "inverter_device_id"),
        load_device_id: string_field(raw, "load_device_id"),
        sensor_device_id: string_field(raw, "sensor_device_id"),
        threshold: raw.get("threshold").cloned(),
        pv_threshold_w: raw.get("pv_threshold_w").cloned(),
        status_value: raw.get("status_value").cloned(),
        comparator: None,
        switch_value: None,
        decision_expr: string_field(raw, "decision_expr"),
        start: string_field(raw, "start"),
        end: string_field(raw, "end"),
        loops: string_field(raw, "loops"),
        time_zone_id: string_field(raw, "time_zone_id"),
        property_codes: code_map(raw, "property_codes"),
        function_codes: code_map(raw, "function_codes"),
        extra_actions: extra_actions(raw),
    };

    // Threshold aliases collapse into `threshold`
    if params.threshold.is_none() {
        params.threshold = first_present(raw, THRESHOLD_ALIASES).cloned();
    }
    // `threshold` seeds both the condition value and the PV threshold
    if params.status_value.is_none() {
        params.status_value = params.threshold.clone();
    }
    if params.pv_threshold_w.is_none() {
        params.pv_threshold_w = params
            .threshold
            .clone()
            .or_else(|| first_present(raw, PV_THRESHOLD_ALIASES).cloned());
    }

    // Comparator synonyms; an explicit `comparator` key is still parsed,
    // so `"comparator": "maior"` and `"comparison": ">"` both work
    if let Some(value) = first_present(raw, COMPARATOR_KEYS) {
        params.comparator = value.as_str().and_then(Comparator::parse);
    }

    // Switch value coercion; turn_on/turn_off hints apply only when truthy
    // and no explicit value exists
    if let Some(value) = first_present(raw, SWITCH_VALUE_KEYS) {
        params.switch_value = coerce_switch_value(value);
    }
    if params.switch_value.is_none() {
        if let Some(true) = raw.get("turn_on").and_then(coerce_switch_value) {
            params.switch_value = Some(true);
        }
    }
    if params.switch_value.is_none() {
        if let Some(true) = raw.get("turn_off").and_then(coerce_switch_value) {
            params.switch_value = Some(false);
        }
    }

    // DP-code aliases seed the switch function mapping, never overwriting
    // an explicit entry
    if !params.function_codes.contains_key("switch") {
        if let Some(code) = first_present(raw, SWITCH_DP_ALIASES).and_then(Value::as_str) {
            params
                .function_codes
                .insert("switch".to_string(), code.to_string());
        }
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn threshold_alias_seeds_status_and_pv_values() {
        let params = normalize(&raw(json!({"threshold": 150})));
        assert_eq!(params.threshold, Some(json!(150)));
        assert_eq!(params.status_value, Some(json!(150)));
        assert_eq!(params.pv_threshold_w, Some(json!(150)));
    }

    #[test]
    fn soc_threshold_collapses_without_clobbering_explicit() {
        let params = normalize(&raw(json!({"soc_threshold": 40})));
        assert_eq!(params.threshold, Some(json!(40)));

        let explicit = normalize(&raw(json!({"threshold": 90, "soc_threshold": 40})));
        assert_eq!(explicit.threshold, Some(json!(90)));
    }

    #[test]
    fn pv_aliases_yield_to_explicit_pv_threshold() {
        let params = normalize(&raw(json!({"surplus_threshold_w": 600})));
        assert_eq!(params.pv_threshold_w, Some(json!(600)));

        let explicit = normalize(&raw(json!({
            "pv_threshold_w": 800,
            "excess_threshold": 600,
        })));
        assert_eq!(explicit.pv_threshold_w, Some(json!(800)));
    }

    #[test]
    fn explicit_status_value_wins_over_threshold_seed() {
        let params = normalize(&raw(json!({"threshold": 90, "status_value": 85})));
        assert_eq!(params.status_value, Some(json!(85)));
    }

    #[rstest]
    #[case("menor", Comparator::LessThan)]
    #[case("abaixo", Comparator::LessThan)]
    #[case("lt", Comparator::LessThan)]
    #[case("maior", Comparator::GreaterThan)]
    #[case("acima", Comparator::GreaterThan)]
    #[case("gt", Comparator::GreaterThan)]
    #[case("igual", Comparator::Equal)]
    #[case("equal", Comparator::Equal)]
    #[case(">", Comparator::GreaterThan)]
    #[case("<", Comparator::LessThan)]
    #[case("==", Comparator::Equal)]
    #[case(">= 50", Comparator::GreaterThan)]
    fn comparator_synonyms(#[case] text: &str, #[case] expected: Comparator) {
        assert_eq!(Comparator::parse(text), Some(expected));
    }

    #[test]
    fn comparator_without_symbols_or_synonyms_is_absent() {
        assert_eq!(Comparator::parse("whenever"), None);
        let params = normalize(&raw(json!({"comparison": "whenever"})));
        assert!(params.comparator.is_none());
    }

    #[test]
    fn comparison_alias_key_is_recognized() {
        let params = normalize(&raw(json!({"comparison": "menor"})));
        assert_eq!(params.comparator, Some(Comparator::LessThan));
    }

    #[rstest]
    #[case(json!("desligar"), Some(false))]
    #[case(json!("ligar"), Some(true))]
    #[case(json!("off"), Some(false))]
    #[case(json!("sim"), Some(true))]
    #[case(json!("não"), Some(false))]
    #[case(json!(true), Some(true))]
    #[case(json!(0), Some(false))]
    #[case(json!(2), Some(true))]
    #[case(json!("sideways"), None)]
    fn switch_value_coercion(#[case] value: Value, #[case] expected: Option<bool>) {
        assert_eq!(coerce_switch_value(&value), expected);
    }

    #[test]
    fn switch_state_alias_sets_value() {
        let params = normalize(&raw(json!({"switch_state": "desligar"})));
        assert_eq!(params.switch_value, Some(false));
    }

    #[test]
    fn turn_hints_apply_only_when_truthy_and_unset() {
        let on = normalize(&raw(json!({"turn_on": true})));
        assert_eq!(on.switch_value, Some(true));

        let off = normalize(&raw(json!({"turn_off": "sim"})));
        assert_eq!(off.switch_value, Some(false));

        let ignored = normalize(&raw(json!({"turn_on": false})));
        assert_eq!(ignored.switch_value, None);

        let explicit = normalize(&raw(json!({"switch_value": false, "turn_on": true})));
        assert_eq!(explicit.switch_value, Some(false));
    }

    #[test]
    fn load_dp_code_seeds_switch_function() {
        let params = normalize(&raw(json!({"load_dp_code": "switch_led"})));
        assert_eq!(params.function_codes.get("switch").map(String::as_str), Some("switch_led"));
    }

    #[test]
    fn explicit_function_code_not_overwritten_by_alias() {
        let params = normalize(&raw(json!({
            "function_codes": {"switch": "switch_1"},
            "load_dp_code": "switch_led",
        })));
        assert_eq!(params.function_codes.get("switch").map(String::as_str), Some("switch_1"));
    }

    #[test]
    fn extra_actions_are_normalized() {
        let params = normalize(&raw(json!({
            "extra_actions": [
                {"entity_id": "plug-2", "function": "switch", "state": "ligar"},
                {"entity_id": "plug-3", "code": "switch_1", "value": "desligar"},
                {"no_entity": true},
            ],
        })));
        assert_eq!(params.extra_actions.len(), 2);
        assert_eq!(params.extra_actions[0].function.as_deref(), Some("switch"));
        assert_eq!(params.extra_actions[0].value, Some(json!(true)));
        assert_eq!(params.extra_actions[1].function_code.as_deref(), Some("switch_1"));
        assert_eq!(params.extra_actions[1].value, Some(json!(false)));
    }
}
