//! End-to-end automation workflow over the signed cloud client
//!
//! The orchestrator strings the pipeline together: discover devices in a
//! space, inspect their shadow properties, run the configured heuristics,
//! and manage the resulting scene rules. Mutating operations require an
//! explicit confirm flag from the caller so nothing touches the cloud by
//! accident.

use crate::cache::{ContextCache, SpaceSnapshot};
use crate::client::{SpaceDeviceQuery, TuyaClient};
use crate::config::AutomationConfig;
use crate::error::{Result, TuyaError};
use crate::heuristics::{self, HeuristicContext, HeuristicProposal};
use crate::model::{Device, Property, SceneRule};
use crate::redact::redact;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Result of creating one scene, including the enable follow-up
#[derive(Debug, Clone, PartialEq)]
pub struct SceneCreateOutcome {
    /// Rule id the cloud assigned, when the response carried one
    pub rule_id: Option<String>,
    /// Whether the post-create enable call succeeded
    pub enabled: bool,
    /// Enable failure detail; the scene itself was still created
    pub enable_error: Option<String>,
    /// Raw create response for callers that need the full payload
    pub response: Value,
}

/// Drives discovery, heuristics, and scene management for one space
pub struct WorkflowOrchestrator {
    client: TuyaClient,
    config: AutomationConfig,
    cache: ContextCache,
}

impl WorkflowOrchestrator {
    pub fn new(client: TuyaClient, config: AutomationConfig) -> Self {
        Self {
            client,
            config,
            cache: ContextCache::default(),
        }
    }

    /// Replace the snapshot cache, e.g. to change its TTL or clock
    pub fn with_cache(mut self, cache: ContextCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// List all devices of a space
    pub async fn discover_devices(&self, space_id: &str) -> Result<Vec<Device>> {
        let devices = self
            .client
            .list_space_devices(&[space_id.to_string()], &SpaceDeviceQuery::default())
            .await?;
        info!(space_id, count = devices.len(), "discovered devices");
        Ok(devices)
    }

    /// Fetch shadow properties for each device, keyed by DP code and
    /// optionally restricted to specific codes
    ///
    /// Devices are inspected one at a time; a large space stays within the
    /// cloud's per-second quota that way
    pub async fn inspect_properties(
        &self,
        device_ids: &[String],
        codes: Option<&[String]>,
    ) -> Result<HashMap<String, HashMap<String, Property>>> {
        let mut properties = HashMap::with_capacity(device_ids.len());
        for device_id in device_ids {
            let shadow = self.client.get_device_shadow(device_id, codes).await?;
            debug!(device_id = %device_id, codes = shadow.len(), "inspected shadow");
            properties.insert(
                device_id.clone(),
                shadow
                    .into_iter()
                    .map(|property| (property.code.clone(), property))
                    .collect(),
            );
        }
        Ok(properties)
    }

    /// Discover and inspect a whole space, reusing a fresh cached snapshot
    pub async fn snapshot_space(&self, space_id: &str) -> Result<SpaceSnapshot> {
        if let Some(snapshot) = self.cache.get(space_id).await {
            debug!(space_id, "snapshot served from cache");
            return Ok(snapshot);
        }
        let devices = self.discover_devices(space_id).await?;
        let device_ids: Vec<String> = devices.iter().map(|d| d.id.clone()).collect();
        let snapshot = SpaceSnapshot {
            devices: build_device_map(devices),
            properties: self.inspect_properties(&device_ids, None).await?,
            scenes: self.client.list_scenes(space_id).await?,
        };
        self.cache.insert(space_id, snapshot.clone()).await;
        Ok(snapshot)
    }

    /// Drop the cached snapshot for a space
    pub async fn invalidate_space(&self, space_id: &str) {
        self.cache.invalidate(space_id).await;
    }

    // ------------------------------------------------------------------
    // Heuristics
    // ------------------------------------------------------------------

    /// Device ids the configured heuristics reference; empty when none are
    /// named explicitly
    fn referenced_device_ids(&self, keys: &[String]) -> Vec<String> {
        let mut ids = BTreeSet::new();
        for key in keys {
            let raw = self.config.heuristic_params(key);
            let params = heuristics::params::normalize(&raw);
            for id in [
                params.inverter_device_id,
                params.load_device_id,
                params.sensor_device_id,
            ]
            .into_iter()
            .flatten()
            {
                ids.insert(id);
            }
            for extra in params.extra_actions {
                ids.insert(extra.entity_id);
            }
        }
        ids.into_iter().collect()
    }

    /// Run heuristics against the space and return uncompiled proposals
    ///
    /// Only devices a heuristic references get their shadow inspected;
    /// when the configuration names none, every discovered device does.
    pub async fn propose_scenes(
        &self,
        space_id: &str,
        heuristic_keys: Option<&[String]>,
    ) -> Result<Vec<HeuristicProposal>> {
        let keys: Vec<String> = match heuristic_keys {
            Some(keys) => keys.to_vec(),
            None => self.config.selected_heuristics(),
        };
        if keys.is_empty() {
            return Err(TuyaError::validation(
                "No heuristics selected; pass keys or set enabled_heuristics",
            ));
        }

        let devices = self.discover_devices(space_id).await?;
        let device_map = build_device_map(devices);

        let mut wanted = self.referenced_device_ids(&keys);
        if wanted.is_empty() {
            wanted = device_map.keys().cloned().collect();
            wanted.sort();
        }
        let known: Vec<String> = wanted
            .into_iter()
            .filter(|id| {
                let present = device_map.contains_key(id);
                if !present {
                    warn!(device_id = %id, "configured device not found in space");
                }
                present
            })
            .collect();
        let properties = self.inspect_properties(&known, None).await?;

        let context =
            HeuristicContext::new(space_id, device_map, properties, self.config.clone());
        heuristics::build_proposals(&context, &keys)
    }

    /// Compile proposals into scene rule payloads for the space
    pub fn build_scene_payloads(
        &self,
        proposals: &[HeuristicProposal],
        space_id: &str,
    ) -> Vec<SceneRule> {
        proposals
            .iter()
            .map(|proposal| proposal.compile(space_id))
            .collect()
    }

    // ------------------------------------------------------------------
    // Scene management (confirm-gated)
    // ------------------------------------------------------------------

    fn require_confirm(confirm: bool, operation: &str) -> Result<()> {
        if confirm {
            Ok(())
        } else {
            Err(TuyaError::permission_denied(format!(
                "{operation} requires confirm=true"
            )))
        }
    }

    /// Create a scene rule; with `enable` set, automations are switched on
    /// right after creation
    ///
    /// An enable failure does not roll back the created scene; the outcome
    /// reports the rule id together with the enable error.
    pub async fn create_scene(
        &self,
        rule: &SceneRule,
        confirm: bool,
        enable: bool,
    ) -> Result<SceneCreateOutcome> {
        Self::require_confirm(confirm, "create_scene")?;
        let response = self.client.create_scene(rule).await?;
        self.cache.invalidate(&rule.space_id).await;
        let rule_id = extract_rule_id(&response);
        info!(name = %rule.name, rule_id = ?rule_id, "scene created");

        let mut enabled = false;
        let mut enable_error = None;
        if enable && rule.is_auto_enable_candidate() {
            match &rule_id {
                Some(id) => match self.client.set_scene_state(id, true).await {
                    Ok(_) => enabled = true,
                    Err(err) => {
                        warn!(rule_id = %id, error = %err, "scene created but enable failed");
                        enable_error = Some(err.to_string());
                    }
                },
                None => {
                    enable_error =
                        Some("create response carried no rule id to enable".to_string());
                }
            }
        }

        Ok(SceneCreateOutcome {
            rule_id,
            enabled,
            enable_error,
            response,
        })
    }

    pub async fn update_scene(
        &self,
        rule_id: &str,
        rule: &SceneRule,
        confirm: bool,
    ) -> Result<Value> {
        Self::require_confirm(confirm, "update_scene")?;
        let result = self.client.update_scene(rule_id, rule).await?;
        self.cache.invalidate(&rule.space_id).await;
        Ok(result)
    }

    pub async fn delete_scenes(
        &self,
        rule_ids: &[String],
        space_id: &str,
        confirm: bool,
    ) -> Result<Value> {
        Self::require_confirm(confirm, "delete_scenes")?;
        let result = self.client.delete_scenes(rule_ids, space_id).await?;
        self.cache.invalidate(space_id).await;
        Ok(result)
    }

    /// Enable or disable scene rules in bulk
    ///
    /// The rule ids carry no space association, so every cached snapshot
    /// is dropped.
    pub async fn set_scenes_state(
        &self,
        rule_ids: &[String],
        is_enable: bool,
        confirm: bool,
    ) -> Result<Value> {
        Self::require_confirm(confirm, "set_scenes_state")?;
        let result = self.client.set_scenes_state(rule_ids, is_enable).await?;
        self.cache.clear().await;
        Ok(result)
    }

    pub async fn set_scene_state(
        &self,
        rule_id: &str,
        is_enable: bool,
        confirm: bool,
    ) -> Result<Value> {
        self.set_scenes_state(&[rule_id.to_string()], is_enable, confirm)
            .await
    }

    pub async fn trigger_scene(&self, rule_id: &str, confirm: bool) -> Result<Value> {
        Self::require_confirm(confirm, "trigger_scene")?;
        let result = self.client.trigger_scene(rule_id).await?;
        self.cache.clear().await;
        Ok(result)
    }

    /// List the scene rules of a space
    pub async fn list_scenes(&self, space_id: &str) -> Result<Vec<Value>> {
        self.client.list_scenes(space_id).await
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    /// Human-oriented space summary with sensitive fields masked
    pub async fn describe_space(&self, space_id: &str) -> Result<Value> {
        let snapshot = self.snapshot_space(space_id).await?;
        let mut devices: Vec<Value> = Vec::with_capacity(snapshot.devices.len());
        let mut ordered: Vec<&Device> = snapshot.devices.values().collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));
        for device in ordered {
            let properties: Value = snapshot
                .properties
                .get(&device.id)
                .map(|shadow| {
                    let mut codes: Vec<&String> = shadow.keys().collect();
                    codes.sort();
                    Value::Object(
                        codes
                            .into_iter()
                            .map(|code| (code.clone(), shadow[code].value.clone()))
                            .collect(),
                    )
                })
                .unwrap_or_else(|| json!({}));
            devices.push(json!({
                "id": device.id,
                "name": device.label(),
                "product_id": device.product_id,
                "category": device.category,
                "online": device.is_online,
                "properties": properties,
            }));
        }
        Ok(redact(&json!({
            "space_id": space_id,
            "device_count": devices.len(),
            "devices": devices,
            "scenes": snapshot.scenes,
        })))
    }
}

/// Index devices by id
pub fn build_device_map(devices: Vec<Device>) -> HashMap<String, Device> {
    devices.into_iter().map(|d| (d.id.clone(), d)).collect()
}

/// Pull a rule id out of the create response; the cloud has returned both
/// object and bare-scalar shapes for this
pub fn extract_rule_id(result: &Value) -> Option<String> {
    match result {
        Value::Object(map) => map
            .get("rule_id")
            .or_else(|| map.get("id"))
            .and_then(scalar_to_string),
        other => scalar_to_string(other),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
