//! Heuristic templates that turn automation intents into scene proposals
//!
//! Each heuristic is a pure function from resolved device/property context
//! plus normalized parameters to a [`HeuristicProposal`]. The set of
//! heuristics is a closed enum so dispatch is exhaustive at compile time.
//! Proposals compile into vendor scene payloads with stable condition
//! ordering.

pub mod params;

use crate::config::AutomationConfig;
use crate::error::{Result, TuyaError};
use crate::mapping::{self, MappingRegistry, KEY_BATTERY_SOC, KEY_PV_POWER, KEY_SWITCH};
use crate::model::{
    ConditionExpr, Device, EffectiveTime, ExecutorProperty, Property, SceneAction, SceneCondition,
    SceneRule, ACTION_EXECUTOR_DEVICE_ISSUE, ENTITY_TYPE_DEVICE_REPORT, SCENE_TYPE_AUTOMATION,
};
use params::{Comparator, ExtraActionSpec, HeuristicParams};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Closed set of automation templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeuristicKind {
    /// Shed a load when the battery drops below a threshold
    BatteryProtect,
    /// Run a load while the battery sits above a threshold
    BatterySurplus,
    /// Run a load while PV generation exceeds a wattage threshold
    SolarSurplus,
    /// Shed a load when PV generation falls below a threshold
    SolarDeficit,
    /// Shed a load at night while PV generation is zero
    NightGuard,
}

impl HeuristicKind {
    /// All known heuristics, in registry order
    pub const ALL: [HeuristicKind; 5] = [
        HeuristicKind::BatteryProtect,
        HeuristicKind::BatterySurplus,
        HeuristicKind::SolarSurplus,
        HeuristicKind::SolarDeficit,
        HeuristicKind::NightGuard,
    ];

    /// Registry key for the heuristic
    pub fn as_str(&self) -> &'static str {
        match self {
            HeuristicKind::BatteryProtect => "battery_protect",
            HeuristicKind::BatterySurplus => "battery_surplus",
            HeuristicKind::SolarSurplus => "solar_surplus",
            HeuristicKind::SolarDeficit => "solar_deficit",
            HeuristicKind::NightGuard => "night_guard",
        }
    }

    /// Default scene name for proposals that do not set one
    fn default_name(&self) -> &'static str {
        match self {
            HeuristicKind::BatteryProtect => "Battery Protect",
            HeuristicKind::BatterySurplus => "Battery Surplus",
            HeuristicKind::SolarSurplus => "Solar Surplus",
            HeuristicKind::SolarDeficit => "Solar Deficit",
            HeuristicKind::NightGuard => "Night Guard",
        }
    }
}

impl FromStr for HeuristicKind {
    type Err = TuyaError;

    fn from_str(s: &str) -> Result<Self> {
        HeuristicKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TuyaError::validation(format!("Unknown heuristic '{s}'")))
    }
}

impl fmt::Display for HeuristicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved context a heuristic consumes: discovered devices, their shadow
/// properties, and the active configuration
#[derive(Debug, Clone)]
pub struct HeuristicContext {
    pub space_id: String,
    pub devices: HashMap<String, Device>,
    pub properties: HashMap<String, HashMap<String, Property>>,
    pub config: AutomationConfig,
    pub registry: MappingRegistry,
}

impl HeuristicContext {
    pub fn new(
        space_id: impl Into<String>,
        devices: HashMap<String, Device>,
        properties: HashMap<String, HashMap<String, Property>>,
        config: AutomationConfig,
    ) -> Self {
        let registry = MappingRegistry::from_config(&config);
        Self {
            space_id: space_id.into(),
            devices,
            properties,
            config,
            registry,
        }
    }

    fn device(&self, device_id: &str, role: &str) -> Result<&Device> {
        self.devices.get(device_id).ok_or_else(|| {
            TuyaError::validation(format!("Unknown {role} device_id '{device_id}' for heuristic"))
        })
    }

    fn shadow(&self, device_id: &str) -> &HashMap<String, Property> {
        static EMPTY: std::sync::OnceLock<HashMap<String, Property>> = std::sync::OnceLock::new();
        self.properties
            .get(device_id)
            .unwrap_or_else(|| EMPTY.get_or_init(HashMap::new))
    }

    /// Resolve a readable property code and require it to exist in the
    /// device's shadow; failures name the logical key and device id
    fn property_code(
        &self,
        device: &Device,
        logical_key: &str,
        overrides: &HashMap<String, String>,
    ) -> Result<String> {
        let available = self.shadow(&device.id);
        let overrides = (!overrides.is_empty()).then_some(overrides);
        if let Some(code) = self.registry.resolve_property_code(
            &device.id,
            device.product_id.as_deref(),
            device.category.as_deref(),
            logical_key,
            overrides,
        ) {
            if available.contains_key(&code) {
                return Ok(code);
            }
            // An explicit override is trusted only if the shadow knows it
            if overrides.map_or(false, |m| m.get(logical_key) == Some(&code)) {
                return Err(TuyaError::validation(format!(
                    "Property code '{code}' not in device shadow for {}",
                    device.id
                )));
            }
        }
        Err(TuyaError::validation(format!(
            "Unable to resolve property code for logical key '{logical_key}' on device {}",
            device.id
        )))
    }

    /// Resolve an actuator function code; for the `switch` logical key a
    /// best-effort scan of shadow codes applies when no registry entry
    /// exists (may pick the wrong gang on multi-switch devices)
    fn function_code(
        &self,
        device: &Device,
        logical_key: &str,
        overrides: &HashMap<String, String>,
    ) -> Result<String> {
        let overrides = (!overrides.is_empty()).then_some(overrides);
        if let Some(code) = self.registry.resolve_function_code(
            &device.id,
            device.product_id.as_deref(),
            device.category.as_deref(),
            logical_key,
            overrides,
        ) {
            return Ok(code);
        }
        if logical_key == KEY_SWITCH {
            if let Some(code) = mapping::switch_code_fallback(self.shadow(&device.id)) {
                return Ok(code);
            }
        }
        Err(TuyaError::validation(format!(
            "Unable to resolve function code for logical key '{logical_key}' on device {}",
            device.id
        )))
    }
}

/// Uncompiled scene proposal produced by a heuristic
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicProposal {
    pub kind: HeuristicKind,
    pub name: String,
    pub conditions: Vec<SceneCondition>,
    pub actions: Vec<SceneAction>,
    pub decision_expr: String,
    pub effective_time: Option<EffectiveTime>,
}

impl HeuristicProposal {
    /// Compile into a scene rule payload for the given space
    ///
    /// Conditions get 1-based codes in declaration order; a condition that
    /// already carries an explicit code is never renumbered. Compilation is
    /// pure: identical proposals compile to identical rules.
    pub fn compile(&self, space_id: &str) -> SceneRule {
        let conditions = self
            .conditions
            .iter()
            .enumerate()
            .map(|(index, condition)| {
                let mut numbered = condition.clone();
                if numbered.code.is_none() {
                    numbered.code = Some(index as u32 + 1);
                }
                numbered
            })
            .collect();
        SceneRule {
            space_id: space_id.to_string(),
            name: self.name.clone(),
            rule_type: SCENE_TYPE_AUTOMATION.to_string(),
            decision_expr: self.decision_expr.clone(),
            conditions,
            actions: self.actions.clone(),
            effective_time: self.effective_time.clone(),
        }
    }
}

fn condition(entity_id: &str, status_code: String, comparator: Comparator, value: Value) -> SceneCondition {
    SceneCondition {
        entity_id: entity_id.to_string(),
        entity_type: ENTITY_TYPE_DEVICE_REPORT.to_string(),
        expr: ConditionExpr {
            status_code: Some(status_code),
            comparator: Some(comparator.as_str().to_string()),
            status_value: Some(value),
            ..Default::default()
        },
        code: None,
    }
}

fn action(entity_id: &str, function_code: String, function_value: Value) -> SceneAction {
    SceneAction {
        entity_id: entity_id.to_string(),
        action_executor: ACTION_EXECUTOR_DEVICE_ISSUE.to_string(),
        executor_property: ExecutorProperty {
            function_code,
            function_value,
        },
    }
}

/// Device pair every template starts from
struct DevicePair<'a> {
    inverter: &'a Device,
    load: &'a Device,
}

fn device_pair<'a>(
    context: &'a HeuristicContext,
    params: &HeuristicParams,
    kind: HeuristicKind,
) -> Result<DevicePair<'a>> {
    let inverter_id = params.inverter_device_id.as_deref().ok_or_else(|| {
        TuyaError::validation(format!("{kind} heuristic requires inverter_device_id"))
    })?;
    let load_id = params.load_device_id.as_deref().ok_or_else(|| {
        TuyaError::validation(format!("{kind} heuristic requires load_device_id"))
    })?;
    Ok(DevicePair {
        inverter: context.device(inverter_id, "inverter")?,
        load: context.device(load_id, "load")?,
    })
}

fn extra_action_list(
    context: &HeuristicContext,
    specs: &[ExtraActionSpec],
    function_overrides: &HashMap<String, String>,
) -> Result<Vec<SceneAction>> {
    let mut actions = Vec::new();
    for spec in specs {
        let device = context.device(&spec.entity_id, "action target")?;
        let function_code = match &spec.function_code {
            Some(code) => Some(code.clone()),
            None if spec.function.as_deref() == Some(KEY_SWITCH) => {
                context.function_code(device, KEY_SWITCH, function_overrides).ok()
            }
            None => None,
        };
        let Some(function_code) = function_code else {
            warn!(entity_id = %spec.entity_id, "skipping extra action without a function code");
            continue;
        };
        let value = spec.value.clone().unwrap_or(Value::Bool(true));
        actions.push(action(&spec.entity_id, function_code, value));
    }
    Ok(actions)
}

/// Per-template PV wattage threshold: explicit value, then the generic
/// condition value, then 800W
fn pv_threshold(params: &HeuristicParams) -> Value {
    params
        .pv_threshold_w
        .clone()
        .or_else(|| params.status_value.clone())
        .unwrap_or_else(|| json!(800))
}

fn battery_protect(context: &HeuristicContext, params: &HeuristicParams) -> Result<HeuristicProposal> {
    let pair = device_pair(context, params, HeuristicKind::BatteryProtect)?;
    let battery_code = context.property_code(pair.inverter, KEY_BATTERY_SOC, &params.property_codes)?;
    let switch_code = context.function_code(pair.load, KEY_SWITCH, &params.function_codes)?;

    let threshold = params
        .status_value
        .clone()
        .or_else(|| params.threshold.clone())
        .unwrap_or_else(|| json!(90));

    Ok(HeuristicProposal {
        kind: HeuristicKind::BatteryProtect,
        name: proposal_name(params, HeuristicKind::BatteryProtect),
        conditions: vec![condition(
            &pair.inverter.id,
            battery_code,
            params.comparator.unwrap_or(Comparator::LessThan),
            threshold,
        )],
        actions: vec![action(
            &pair.load.id,
            switch_code,
            json!(params.switch_value.unwrap_or(false)),
        )],
        decision_expr: decision_expr(params),
        effective_time: None,
    })
}

fn battery_surplus(context: &HeuristicContext, params: &HeuristicParams) -> Result<HeuristicProposal> {
    let pair = device_pair(context, params, HeuristicKind::BatterySurplus)?;
    let battery_code = context.property_code(pair.inverter, KEY_BATTERY_SOC, &params.property_codes)?;
    let switch_code = context.function_code(pair.load, KEY_SWITCH, &params.function_codes)?;

    let threshold = params
        .status_value
        .clone()
        .or_else(|| params.threshold.clone())
        .unwrap_or_else(|| json!(90));

    let mut actions = vec![action(
        &pair.load.id,
        switch_code,
        json!(params.switch_value.unwrap_or(true)),
    )];
    actions.extend(extra_action_list(context, &params.extra_actions, &params.function_codes)?);

    Ok(HeuristicProposal {
        kind: HeuristicKind::BatterySurplus,
        name: proposal_name(params, HeuristicKind::BatterySurplus),
        conditions: vec![condition(
            &pair.inverter.id,
            battery_code,
            params.comparator.unwrap_or(Comparator::GreaterThan),
            threshold,
        )],
        actions,
        decision_expr: decision_expr(params),
        effective_time: None,
    })
}

fn solar_surplus(context: &HeuristicContext, params: &HeuristicParams) -> Result<HeuristicProposal> {
    let pair = device_pair(context, params, HeuristicKind::SolarSurplus)?;
    let pv_code = context.property_code(pair.inverter, KEY_PV_POWER, &params.property_codes)?;
    let switch_code = context.function_code(pair.load, KEY_SWITCH, &params.function_codes)?;

    let mut actions = vec![action(
        &pair.load.id,
        switch_code,
        json!(params.switch_value.unwrap_or(true)),
    )];
    actions.extend(extra_action_list(context, &params.extra_actions, &params.function_codes)?);

    Ok(HeuristicProposal {
        kind: HeuristicKind::SolarSurplus,
        name: proposal_name(params, HeuristicKind::SolarSurplus),
        conditions: vec![condition(
            &pair.inverter.id,
            pv_code,
            params.comparator.unwrap_or(Comparator::GreaterThan),
            pv_threshold(params),
        )],
        actions,
        decision_expr: decision_expr(params),
        effective_time: None,
    })
}

fn solar_deficit(context: &HeuristicContext, params: &HeuristicParams) -> Result<HeuristicProposal> {
    let pair = device_pair(context, params, HeuristicKind::SolarDeficit)?;
    let pv_code = context.property_code(pair.inverter, KEY_PV_POWER, &params.property_codes)?;
    let switch_code = context.function_code(pair.load, KEY_SWITCH, &params.function_codes)?;

    let mut actions = vec![action(
        &pair.load.id,
        switch_code,
        json!(params.switch_value.unwrap_or(false)),
    )];
    actions.extend(extra_action_list(context, &params.extra_actions, &params.function_codes)?);

    Ok(HeuristicProposal {
        kind: HeuristicKind::SolarDeficit,
        name: proposal_name(params, HeuristicKind::SolarDeficit),
        conditions: vec![condition(
            &pair.inverter.id,
            pv_code,
            params.comparator.unwrap_or(Comparator::LessThan),
            pv_threshold(params),
        )],
        actions,
        decision_expr: decision_expr(params),
        effective_time: None,
    })
}

fn night_guard(context: &HeuristicContext, params: &HeuristicParams) -> Result<HeuristicProposal> {
    let pair = device_pair(context, params, HeuristicKind::NightGuard)?;
    let pv_code = context.property_code(pair.inverter, KEY_PV_POWER, &params.property_codes)?;
    let switch_code = context.function_code(pair.load, KEY_SWITCH, &params.function_codes)?;

    let effective_time = EffectiveTime {
        start: Some(params.start.clone().unwrap_or_else(|| "18:00".to_string())),
        end: Some(params.end.clone().unwrap_or_else(|| "06:00".to_string())),
        loops: Some(params.loops.clone().unwrap_or_else(|| "1111111".to_string())),
        time_zone_id: params
            .time_zone_id
            .clone()
            .or_else(|| context.config.time_zone_id.clone()),
    };

    Ok(HeuristicProposal {
        kind: HeuristicKind::NightGuard,
        name: proposal_name(params, HeuristicKind::NightGuard),
        conditions: vec![condition(
            &pair.inverter.id,
            pv_code,
            params.comparator.unwrap_or(Comparator::Equal),
            params.status_value.clone().unwrap_or_else(|| json!(0)),
        )],
        actions: vec![action(
            &pair.load.id,
            switch_code,
            json!(params.switch_value.unwrap_or(false)),
        )],
        decision_expr: decision_expr(params),
        effective_time: Some(effective_time),
    })
}

fn proposal_name(params: &HeuristicParams, kind: HeuristicKind) -> String {
    params
        .name
        .clone()
        .unwrap_or_else(|| kind.default_name().to_string())
}

fn decision_expr(params: &HeuristicParams) -> String {
    params
        .decision_expr
        .clone()
        .unwrap_or_else(|| "and".to_string())
}

/// Run one heuristic template against the context
pub fn build_proposal(
    kind: HeuristicKind,
    context: &HeuristicContext,
    params: &HeuristicParams,
) -> Result<HeuristicProposal> {
    match kind {
        HeuristicKind::BatteryProtect => battery_protect(context, params),
        HeuristicKind::BatterySurplus => battery_surplus(context, params),
        HeuristicKind::SolarSurplus => solar_surplus(context, params),
        HeuristicKind::SolarDeficit => solar_deficit(context, params),
        HeuristicKind::NightGuard => night_guard(context, params),
    }
}

/// Build proposals for the requested heuristic keys, normalizing each
/// key's configured parameters first
pub fn build_proposals(context: &HeuristicContext, keys: &[String]) -> Result<Vec<HeuristicProposal>> {
    let mut proposals = Vec::with_capacity(keys.len());
    for key in keys {
        let kind = HeuristicKind::from_str(key)?;
        let raw = context.config.heuristic_params(key);
        let params = params::normalize(&raw);
        proposals.push(build_proposal(kind, context, &params)?);
    }
    Ok(proposals)
}
