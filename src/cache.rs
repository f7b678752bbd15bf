//! TTL-bounded context cache for discovered spaces
//!
//! Discovery and shadow reads are the slowest calls in a session, so the
//! orchestrator keeps a per-space snapshot here and reuses it until the TTL
//! lapses. Time is injected through [`Clock`] so expiry is testable without
//! sleeping.

use crate::model::{Device, Property};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Monotonic time source
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock backed [`Clock`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Generic TTL map; entries past their deadline read as absent
pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<K, (Instant, V)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        let (deadline, value) = entries.get(key)?;
        (self.clock.now() < *deadline).then(|| value.clone())
    }

    pub async fn insert(&self, key: K, value: V) {
        let deadline = self.clock.now() + self.ttl;
        self.entries.write().await.insert(key, (deadline, value));
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

/// Everything the orchestrator knows about one space after a full read
#[derive(Debug, Clone, Default)]
pub struct SpaceSnapshot {
    /// Devices keyed by device id
    pub devices: HashMap<String, Device>,
    /// Shadow properties keyed by device id, then DP code
    pub properties: HashMap<String, HashMap<String, Property>>,
    /// Scene rules of the space, as returned by the listing endpoint
    pub scenes: Vec<serde_json::Value>,
}

impl SpaceSnapshot {
    /// Find a device by display label, ignoring case and Latin accents
    pub fn device_by_label(&self, label: &str) -> Option<&Device> {
        let wanted = normalize_label(label);
        self.devices
            .values()
            .find(|device| normalize_label(device.label()) == wanted)
    }

    /// Device id for a display label, if known
    pub fn device_id_by_label(&self, label: &str) -> Option<&str> {
        self.device_by_label(label).map(|device| device.id.as_str())
    }

    /// Scene rule id for a scene name, ignoring case and Latin accents
    pub fn scene_id_by_name(&self, name: &str) -> Option<&str> {
        let wanted = normalize_label(name);
        self.scenes.iter().find_map(|scene| {
            let matches = scene
                .get("name")
                .and_then(serde_json::Value::as_str)
                .map_or(false, |n| normalize_label(n) == wanted);
            if matches {
                scene
                    .get("id")
                    .or_else(|| scene.get("rule_id"))
                    .and_then(serde_json::Value::as_str)
            } else {
                None
            }
        })
    }
}

/// Per-space snapshot cache
pub struct ContextCache {
    inner: TtlCache<String, SpaceSnapshot>,
}

impl ContextCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: TtlCache::new(ttl),
        }
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: TtlCache::with_clock(ttl, clock),
        }
    }

    pub async fn get(&self, space_id: &str) -> Option<SpaceSnapshot> {
        self.inner.get(&space_id.to_string()).await
    }

    pub async fn insert(&self, space_id: &str, snapshot: SpaceSnapshot) {
        self.inner.insert(space_id.to_string(), snapshot).await;
    }

    pub async fn invalidate(&self, space_id: &str) {
        self.inner.invalidate(&space_id.to_string()).await;
    }

    /// Drop every snapshot; used when a mutation's space is unknown
    pub async fn clear(&self) {
        self.inner.clear().await;
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

/// Casefold and strip the Latin accents common in Portuguese device names
pub fn normalize_label(text: &str) -> String {
    text.trim()
        .chars()
        .flat_map(|c| c.to_lowercase())
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
            }
        }

        fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    fn device(id: &str, custom_name: Option<&str>, name: Option<&str>) -> Device {
        Device {
            id: id.to_string(),
            product_id: None,
            category: None,
            name: name.map(str::to_string),
            custom_name: custom_name.map(str::to_string),
            is_online: Some(true),
            ip: None,
            model: None,
            time_zone: None,
        }
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache: TtlCache<String, u32> =
            TtlCache::with_clock(Duration::from_secs(60), clock.clone());

        cache.insert("a".to_string(), 1).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));

        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get(&"a".to_string()).await, None);
    }

    #[tokio::test]
    async fn invalidate_drops_a_snapshot() {
        let cache = ContextCache::default();
        cache.insert("space", SpaceSnapshot::default()).await;
        assert!(cache.get("space").await.is_some());
        cache.invalidate("space").await;
        assert!(cache.get("space").await.is_none());
    }

    #[test]
    fn label_lookup_ignores_case_and_accents() {
        let mut snapshot = SpaceSnapshot::default();
        snapshot.devices.insert(
            "dev1".to_string(),
            device("dev1", Some("Produção Solar"), None),
        );
        snapshot
            .devices
            .insert("dev2".to_string(), device("dev2", None, Some("Aquecedor")));

        assert_eq!(snapshot.device_id_by_label("producao solar"), Some("dev1"));
        assert_eq!(snapshot.device_id_by_label("  AQUECEDOR "), Some("dev2"));
        assert_eq!(snapshot.device_id_by_label("missing"), None);
    }

    #[test]
    fn scene_lookup_matches_by_normalized_name() {
        let mut snapshot = SpaceSnapshot::default();
        snapshot.scenes = vec![
            serde_json::json!({"id": "rule-1", "name": "Proteção da Bateria"}),
            serde_json::json!({"rule_id": "rule-2", "name": "Night Guard"}),
        ];
        assert_eq!(snapshot.scene_id_by_name("protecao da bateria"), Some("rule-1"));
        assert_eq!(snapshot.scene_id_by_name("NIGHT GUARD"), Some("rule-2"));
        assert_eq!(snapshot.scene_id_by_name("unknown"), None);
    }

    #[test]
    fn normalize_label_folds_portuguese_accents() {
        assert_eq!(normalize_label("Ligação Automática"), "ligacao automatica");
        assert_eq!(normalize_label("Água"), "agua");
    }
}
