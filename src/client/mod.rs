//! Signed HTTP client for the Tuya Cloud Open API
//!
//! Owns the token lifecycle and the transient-failure retry policy so
//! callers only see typed results or terminal errors:
//! - 401/403 clears the cached token, forces exactly one refresh, and
//!   retries the request once; a second 401/403 is a hard failure
//! - 429 retries up to 3 times with exponential backoff (base 1.5s,
//!   doubling), then fails
//! - any other 4xx/5xx fails immediately with the response body surfaced

pub mod sign;
pub mod token;

use crate::config::TuyaCredentials;
use crate::error::{Result, TuyaError};
use crate::model::{Device, Property, SceneRule};
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use token::{CachedToken, TokenCache, TokenGrant};
use tracing::{debug, warn};

/// Bounded timeout applied to every request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum retries after a 429 response
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// First backoff delay after a 429; doubles per attempt
const RATE_LIMIT_BACKOFF_BASE: Duration = Duration::from_millis(1500);

/// Options for the paginated space device listing
#[derive(Debug, Clone)]
pub struct SpaceDeviceQuery {
    /// Include devices of child spaces
    pub is_recursion: bool,
    /// Page size per cursor fetch
    pub page_size: u32,
    /// Resume cursor from a previous listing
    pub last_id: Option<String>,
}

impl Default for SpaceDeviceQuery {
    fn default() -> Self {
        Self {
            is_recursion: false,
            page_size: 20,
            last_id: None,
        }
    }
}

/// Signed Tuya Cloud client supporting device discovery, shadow
/// properties, and scene automation CRUD
pub struct TuyaClient {
    http: reqwest::Client,
    credentials: TuyaCredentials,
    base_url: String,
    tokens: TokenCache,
    backoff_base: Duration,
}

impl TuyaClient {
    /// Create a client against the given API base URL
    pub fn new(credentials: TuyaCredentials, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            credentials,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens: TokenCache::new(),
            backoff_base: RATE_LIMIT_BACKOFF_BASE,
        })
    }

    /// Override the rate-limit backoff base; tests use millisecond bases
    pub fn with_rate_limit_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// API base URL this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ------------------------------------------------------------------
    // Device and shadow reads
    // ------------------------------------------------------------------

    /// Devices attached to the supplied space ids, following pagination
    /// cursors until exhausted
    pub async fn list_space_devices(
        &self,
        space_ids: &[String],
        options: &SpaceDeviceQuery,
    ) -> Result<Vec<Device>> {
        let joined: String = space_ids
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>()
            .join(",");
        if joined.is_empty() {
            return Err(TuyaError::validation(
                "at least one space id is required to list devices",
            ));
        }

        let mut devices = Vec::new();
        let mut cursor = options.last_id.clone();
        loop {
            let mut query = vec![
                ("space_ids".to_string(), joined.clone()),
                ("is_recursion".to_string(), options.is_recursion.to_string()),
                ("page_size".to_string(), options.page_size.to_string()),
            ];
            if let Some(last_id) = &cursor {
                query.push(("last_id".to_string(), last_id.clone()));
            }

            let result = self
                .call(Method::GET, "/v2.0/cloud/thing/space/device", query, None)
                .await?;

            let (batch, has_more, next_cursor): (Vec<Device>, bool, Option<String>) = match result {
                Value::Object(ref obj) => {
                    let batch: Vec<Device> = match obj.get("list") {
                        Some(list) => serde_json::from_value(list.clone())?,
                        None => Vec::new(),
                    };
                    let has_more = obj
                        .get("has_more")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    let next = obj
                        .get("last_id")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .or_else(|| batch.last().map(|d| d.id.clone()));
                    (batch, has_more, next)
                }
                // Older deployments return a bare array with no cursor
                Value::Array(_) => (serde_json::from_value(result)?, false, None),
                other => {
                    return Err(TuyaError::api(
                        200,
                        format!("Unexpected device listing payload: {other}"),
                    ))
                }
            };

            debug!(count = batch.len(), has_more, "fetched device page");
            devices.extend(batch);
            if !has_more || next_cursor.is_none() {
                break;
            }
            cursor = next_cursor;
        }
        Ok(devices)
    }

    /// Last-reported shadow properties for one device, optionally
    /// restricted to specific DP codes
    pub async fn get_device_shadow(
        &self,
        device_id: &str,
        codes: Option<&[String]>,
    ) -> Result<Vec<Property>> {
        if device_id.is_empty() {
            return Err(TuyaError::validation("device_id is required"));
        }
        let mut query = Vec::new();
        if let Some(codes) = codes {
            if !codes.is_empty() {
                query.push(("codes".to_string(), codes.join(",")));
            }
        }
        let result = self
            .call(
                Method::GET,
                &format!("/v2.0/cloud/thing/{device_id}/shadow/properties"),
                query,
                None,
            )
            .await?;
        let properties = result
            .get("properties")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        Ok(serde_json::from_value(properties)?)
    }

    // ------------------------------------------------------------------
    // Scene rule CRUD
    // ------------------------------------------------------------------

    /// Scene rules defined for a space
    pub async fn list_scenes(&self, space_id: &str) -> Result<Vec<Value>> {
        if space_id.is_empty() {
            return Err(TuyaError::validation("space_id is required"));
        }
        let result = self
            .call(
                Method::GET,
                "/v2.0/cloud/scene/rule",
                vec![("space_id".to_string(), space_id.to_string())],
                None,
            )
            .await?;
        match result {
            Value::Object(mut obj) => match obj.remove("list") {
                Some(Value::Array(items)) => Ok(items),
                _ => Ok(Vec::new()),
            },
            Value::Array(items) => Ok(items),
            _ => Ok(Vec::new()),
        }
    }

    /// Full detail of one scene rule
    pub async fn get_scene(&self, rule_id: &str) -> Result<Value> {
        if rule_id.is_empty() {
            return Err(TuyaError::validation("rule_id is required"));
        }
        self.call(
            Method::GET,
            &format!("/v2.0/cloud/scene/rule/{rule_id}"),
            Vec::new(),
            None,
        )
        .await
    }

    /// Create a scene rule; the result carries the server-assigned id
    pub async fn create_scene(&self, rule: &SceneRule) -> Result<Value> {
        self.call(
            Method::POST,
            "/v2.0/cloud/scene/rule",
            Vec::new(),
            Some(rule.as_payload()),
        )
        .await
    }

    /// Replace a scene rule definition
    pub async fn update_scene(&self, rule_id: &str, rule: &SceneRule) -> Result<Value> {
        if rule_id.is_empty() {
            return Err(TuyaError::validation("rule_id is required"));
        }
        self.call(
            Method::PUT,
            &format!("/v2.0/cloud/scene/rule/{rule_id}"),
            Vec::new(),
            Some(rule.as_payload()),
        )
        .await
    }

    /// Delete scene rules by id within a space
    pub async fn delete_scenes(&self, rule_ids: &[String], space_id: &str) -> Result<Value> {
        let ids = Self::join_rule_ids(rule_ids)?;
        if space_id.is_empty() {
            return Err(TuyaError::validation("space_id is required to delete scenes"));
        }
        self.call(
            Method::DELETE,
            "/v2.0/cloud/scene/rule",
            vec![
                ("ids".to_string(), ids),
                ("space_id".to_string(), space_id.to_string()),
            ],
            None,
        )
        .await
    }

    /// Enable or disable scene rules in bulk
    pub async fn set_scenes_state(&self, rule_ids: &[String], is_enable: bool) -> Result<Value> {
        let ids = Self::join_rule_ids(rule_ids)?;
        self.call(
            Method::PUT,
            "/v2.0/cloud/scene/rule/state",
            Vec::new(),
            Some(serde_json::json!({"ids": ids, "is_enable": is_enable})),
        )
        .await
    }

    /// Enable or disable a single scene rule
    pub async fn set_scene_state(&self, rule_id: &str, is_enable: bool) -> Result<Value> {
        if rule_id.is_empty() {
            return Err(TuyaError::validation("rule_id is required"));
        }
        self.set_scenes_state(&[rule_id.to_string()], is_enable).await
    }

    /// Fire a scene's actions immediately
    pub async fn trigger_scene(&self, rule_id: &str) -> Result<Value> {
        if rule_id.is_empty() {
            return Err(TuyaError::validation("rule_id is required"));
        }
        self.call(
            Method::POST,
            &format!("/v2.0/cloud/scene/rule/{rule_id}/actions/trigger"),
            Vec::new(),
            None,
        )
        .await
    }

    fn join_rule_ids(rule_ids: &[String]) -> Result<String> {
        let ids = rule_ids
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>()
            .join(",");
        if ids.is_empty() {
            return Err(TuyaError::validation("at least one rule id is required"));
        }
        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Token lifecycle
    // ------------------------------------------------------------------

    /// Cached access token, refreshing when stale; the cache mutex is held
    /// across the refresh so concurrent callers reuse one in-flight grant
    async fn access_token(&self, force_refresh: bool) -> Result<String> {
        let mut slot = self.tokens.lock().await;
        if !force_refresh {
            if let Some(token) = slot.as_ref() {
                if token.is_valid() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        debug!("requesting access token");
        let result = Box::pin(self.execute(
            Method::GET,
            "/v1.0/token",
            vec![("grant_type".to_string(), "1".to_string())],
            None,
            false,
        ))
        .await
            .map_err(|e| match e {
                TuyaError::Api { status, body } => {
                    TuyaError::auth(format!("Token request failed ({status}): {body}"))
                }
                other => other,
            })?;

        let grant: TokenGrant = serde_json::from_value(result)
            .map_err(|e| TuyaError::auth(format!("Token response missing fields: {e}")))?;
        let cached = CachedToken::from_grant(&grant);
        let access_token = cached.access_token.clone();
        *slot = Some(cached);
        Ok(access_token)
    }

    // ------------------------------------------------------------------
    // Request execution
    // ------------------------------------------------------------------

    /// Execute a token-authenticated call and unwrap the success envelope
    async fn call(
        &self,
        method: Method,
        path: &str,
        query: Vec<(String, String)>,
        body: Option<Value>,
    ) -> Result<Value> {
        self.execute(method, path, query, body, true).await
    }

    /// Execute one signed request with the retry policy applied, returning
    /// the `result` member of a successful envelope
    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: Vec<(String, String)>,
        body: Option<Value>,
        use_token: bool,
    ) -> Result<Value> {
        let mut attempt: u32 = 0;
        let mut refreshed = false;

        loop {
            attempt += 1;
            let access_token = if use_token {
                Some(self.access_token(false).await?)
            } else {
                None
            };

            let timestamp_ms = Utc::now().timestamp_millis() as u128;

            let signed = sign::build_signed_request(
                &self.credentials.client_id,
                &self.credentials.client_secret,
                &self.base_url,
                method.as_str(),
                path,
                &query,
                body.as_ref(),
                access_token.as_deref(),
                timestamp_ms,
            )?;

            let mut request = self
                .http
                .request(method.clone(), &signed.url)
                .header(CONTENT_TYPE, "application/json");
            for (name, value) in &signed.headers {
                request = request.header(*name, value);
            }
            if let Some(payload) = &signed.body {
                request = request.body(payload.clone());
            }

            debug!(%method, path, attempt, "issuing signed request");
            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;

            if (status.as_u16() == 401 || status.as_u16() == 403) && use_token {
                if refreshed {
                    return Err(TuyaError::unauthorized(text));
                }
                warn!(status = status.as_u16(), path, "unauthorized; refreshing token and retrying");
                self.tokens.invalidate().await;
                self.access_token(true).await?;
                refreshed = true;
                continue;
            }

            if status.as_u16() == 429 {
                if attempt > MAX_RATE_LIMIT_RETRIES {
                    return Err(TuyaError::rate_limited(text));
                }
                let backoff = self.backoff_base * 2u32.pow(attempt - 1);
                warn!(path, backoff_ms = backoff.as_millis() as u64, "rate limited; backing off");
                tokio::time::sleep(backoff).await;
                continue;
            }

            if status.as_u16() >= 400 {
                return Err(TuyaError::api(status.as_u16(), text));
            }

            let payload: Value = serde_json::from_str(&text)?;
            let success = payload
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !success {
                return Err(TuyaError::api(status.as_u16(), payload.to_string()));
            }
            return Ok(payload.get("result").cloned().unwrap_or(Value::Null));
        }
    }
}
