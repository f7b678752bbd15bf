//! Logical capability → data-point code resolution
//!
//! Heuristics talk about capabilities (`battery_soc`, `pv_power`, `switch`)
//! while the platform addresses device-specific DP codes. Resolution walks
//! a layered chain, first match wins: explicit per-call override, device-id
//! registry, product-id registry, category fallback. The registry is an
//! explicit value built from built-in tables plus config overrides; there
//! is no process-global mutable state.

use crate::config::AutomationConfig;
use crate::model::Property;
use std::collections::HashMap;

/// Logical key for battery state of charge
pub const KEY_BATTERY_SOC: &str = "battery_soc";

/// Logical key for instantaneous PV generation
pub const KEY_PV_POWER: &str = "pv_power";

/// Logical key for the main actuator switch
pub const KEY_SWITCH: &str = "switch";

type CodeTable = HashMap<String, HashMap<String, String>>;

/// Layered registries mapping logical keys to DP codes
#[derive(Debug, Clone, Default)]
pub struct MappingRegistry {
    /// Per-device readable property mappings (from config)
    device_properties: CodeTable,
    /// Per-device actuator function mappings (from config)
    device_functions: CodeTable,
    /// Built-in product-level property mappings
    product_properties: CodeTable,
    /// Built-in product-level function mappings
    product_functions: CodeTable,
    /// Category-level property fallbacks
    category_properties: CodeTable,
    /// Category-level function fallbacks
    category_functions: CodeTable,
}

fn table(entries: &[(&str, &[(&str, &str)])]) -> CodeTable {
    entries
        .iter()
        .map(|(outer, pairs)| {
            (
                outer.to_string(),
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        })
        .collect()
}

impl MappingRegistry {
    /// Registry with only the built-in product/category tables
    ///
    /// Extend these tables as new hardware is added.
    pub fn builtin() -> Self {
        Self {
            device_properties: HashMap::new(),
            device_functions: HashMap::new(),
            product_properties: table(&[(
                // GoodWe inverter bridged into Tuya
                "xxgnqyeyrzawwwtt",
                &[
                    (KEY_BATTERY_SOC, "Bateria"),
                    (KEY_PV_POWER, "Producao_Solar_Atual"),
                    ("status", "status"),
                ],
            )]),
            product_functions: table(&[("k43w32veclxmc9lb", &[(KEY_SWITCH, "switch_led")])]),
            category_properties: table(&[(
                "qt",
                &[(KEY_BATTERY_SOC, "Bateria"), (KEY_PV_POWER, "pv_power")],
            )]),
            category_functions: table(&[("cz", &[(KEY_SWITCH, "switch_led")])]),
        }
    }

    /// Built-in tables plus per-device overrides from the automation config
    pub fn from_config(config: &AutomationConfig) -> Self {
        let mut registry = Self::builtin();
        for (device_id, mapping) in &config.device_properties {
            registry
                .device_properties
                .entry(device_id.clone())
                .or_default()
                .extend(mapping.clone());
        }
        for (device_id, mapping) in &config.device_functions {
            registry
                .device_functions
                .entry(device_id.clone())
                .or_default()
                .extend(mapping.clone());
        }
        registry
    }

    /// DP code for a readable logical key: override → device id →
    /// product id → category, first match wins
    pub fn resolve_property_code(
        &self,
        device_id: &str,
        product_id: Option<&str>,
        category: Option<&str>,
        logical_key: &str,
        overrides: Option<&HashMap<String, String>>,
    ) -> Option<String> {
        Self::resolve(
            &self.device_properties,
            &self.product_properties,
            &self.category_properties,
            device_id,
            product_id,
            category,
            logical_key,
            overrides,
        )
    }

    /// Function code for an actuator logical key, same chain
    pub fn resolve_function_code(
        &self,
        device_id: &str,
        product_id: Option<&str>,
        category: Option<&str>,
        logical_key: &str,
        overrides: Option<&HashMap<String, String>>,
    ) -> Option<String> {
        Self::resolve(
            &self.device_functions,
            &self.product_functions,
            &self.category_functions,
            device_id,
            product_id,
            category,
            logical_key,
            overrides,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve(
        device_table: &CodeTable,
        product_table: &CodeTable,
        category_table: &CodeTable,
        device_id: &str,
        product_id: Option<&str>,
        category: Option<&str>,
        logical_key: &str,
        overrides: Option<&HashMap<String, String>>,
    ) -> Option<String> {
        if let Some(code) = overrides.and_then(|map| map.get(logical_key)) {
            return Some(code.clone());
        }
        if let Some(code) = device_table.get(device_id).and_then(|m| m.get(logical_key)) {
            return Some(code.clone());
        }
        if let Some(code) = product_id
            .and_then(|pid| product_table.get(pid))
            .and_then(|m| m.get(logical_key))
        {
            return Some(code.clone());
        }
        if let Some(code) = category
            .and_then(|cat| category_table.get(cat))
            .and_then(|m| m.get(logical_key))
        {
            return Some(code.clone());
        }
        None
    }
}

/// Best-effort switch code guess from a device's known shadow properties
///
/// Applies only when no registry entry resolved the `switch` logical key:
/// exact `switch`, `switch_1`, `switch_led` are preferred in that order,
/// then any code with a `switch` prefix. On multi-switch devices the prefix
/// scan may pick the wrong gang; the registries exist precisely so this
/// guess is the last resort.
pub fn switch_code_fallback(available: &HashMap<String, Property>) -> Option<String> {
    for candidate in [KEY_SWITCH, "switch_1", "switch_led"] {
        if available.contains_key(candidate) {
            return Some(candidate.to_string());
        }
    }
    // Sorted scan keeps the guess deterministic across runs
    let mut prefixed: Vec<&String> = available
        .keys()
        .filter(|code| code.starts_with(KEY_SWITCH))
        .collect();
    prefixed.sort();
    prefixed.first().map(|code| (*code).clone())
}
