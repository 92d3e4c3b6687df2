//! User-editable sync settings and their durable store.

use crate::error::SyncResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use timeflow_sync_storage::KeyValueStore;
use tracing::{debug, warn};
use uuid::Uuid;

/// Storage key of the settings record.
pub const SETTINGS_KEY: &str = "timeflow.settings.online-sync";

/// Default automatic sync interval.
pub const DEFAULT_INTERVAL_MINUTES: u32 = 30;
/// Smallest allowed automatic sync interval.
pub const MIN_INTERVAL_MINUTES: u32 = 1;
/// Largest allowed automatic sync interval (one day).
pub const MAX_INTERVAL_MINUTES: u32 = 1_440;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u32 = 15_000;
/// Smallest allowed per-request timeout.
pub const MIN_REQUEST_TIMEOUT_MS: u32 = 3_000;
/// Largest allowed per-request timeout.
pub const MAX_REQUEST_TIMEOUT_MS: u32 = 60_000;

/// Online sync settings.
///
/// Values held by this type are always normalized; construct them through
/// [`SettingsStore`] or [`SyncSettings::from_json_value`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// Master switch.
    pub enabled: bool,
    /// Whether application start triggers a sync.
    pub auto_sync_on_startup: bool,
    /// Interval of the periodic sync, in `[1, 1440]` minutes.
    pub auto_sync_interval_minutes: u32,
    /// Server base URL without trailing slashes.
    pub server_url: String,
    /// Account identifier.
    pub user_id: String,
    /// Bearer token without quotes or `Bearer ` prefix.
    pub api_token: String,
    /// Stable device identifier, generated once.
    pub device_id: String,
    /// Per-request timeout in `[3000, 60000]` milliseconds.
    pub request_timeout_ms: u32,
    /// Whether runs append to the sync log file.
    pub enable_logging: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_sync_on_startup: true,
            auto_sync_interval_minutes: DEFAULT_INTERVAL_MINUTES,
            server_url: String::new(),
            user_id: String::new(),
            api_token: String::new(),
            device_id: String::new(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            enable_logging: false,
        }
    }
}

impl SyncSettings {
    /// Builds settings from an untrusted JSON record.
    ///
    /// Every field is normalized on its own: a malformed field falls back to
    /// its default without affecting the others.
    pub fn from_json_value(value: &Value) -> Self {
        let defaults = Self::default();
        let bool_field = |name: &str, default: bool| {
            value.get(name).and_then(Value::as_bool).unwrap_or(default)
        };
        let str_field = |name: &str| value.get(name).and_then(Value::as_str).unwrap_or("");

        Self {
            enabled: bool_field("enabled", defaults.enabled),
            auto_sync_on_startup: bool_field("autoSyncOnStartup", defaults.auto_sync_on_startup),
            auto_sync_interval_minutes: number_field(value, "autoSyncIntervalMinutes")
                .map(clamp_interval_minutes)
                .unwrap_or(defaults.auto_sync_interval_minutes),
            server_url: normalize_server_url(str_field("serverUrl")),
            user_id: str_field("userId").trim().to_string(),
            api_token: normalize_api_token(str_field("apiToken")),
            device_id: str_field("deviceId").trim().to_string(),
            request_timeout_ms: number_field(value, "requestTimeoutMs")
                .map(clamp_request_timeout_ms)
                .unwrap_or(defaults.request_timeout_ms),
            enable_logging: bool_field("enableLogging", defaults.enable_logging),
        }
    }

    /// Returns true if a server URL and user id are set.
    pub fn is_configured(&self) -> bool {
        !self.server_url.is_empty() && !self.user_id.is_empty()
    }

    /// Interval of the periodic sync.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.auto_sync_interval_minutes.max(MIN_INTERVAL_MINUTES)) * 60)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.request_timeout_ms))
    }

    /// Token to send as `Authorization: Bearer`, if one is configured.
    pub fn bearer_token(&self) -> Option<&str> {
        (!self.api_token.is_empty()).then_some(self.api_token.as_str())
    }
}

/// A partial update of [`SyncSettings`].
///
/// Fields left as `None` keep their current value. Numeric fields accept any
/// integer and are clamped on save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    /// New master switch.
    pub enabled: Option<bool>,
    /// New startup toggle.
    pub auto_sync_on_startup: Option<bool>,
    /// New interval in minutes.
    pub auto_sync_interval_minutes: Option<i64>,
    /// New server URL.
    pub server_url: Option<String>,
    /// New user id.
    pub user_id: Option<String>,
    /// New API token.
    pub api_token: Option<String>,
    /// New device id; blank values are ignored.
    pub device_id: Option<String>,
    /// New request timeout in milliseconds.
    pub request_timeout_ms: Option<i64>,
    /// New logging toggle.
    pub enable_logging: Option<bool>,
}

impl SettingsPatch {
    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the patch over `current`, normalizing every touched field.
    pub fn apply(self, current: &SyncSettings) -> SyncSettings {
        let mut next = current.clone();
        if let Some(enabled) = self.enabled {
            next.enabled = enabled;
        }
        if let Some(startup) = self.auto_sync_on_startup {
            next.auto_sync_on_startup = startup;
        }
        if let Some(minutes) = self.auto_sync_interval_minutes {
            next.auto_sync_interval_minutes = clamp_interval_minutes(minutes as f64);
        }
        if let Some(url) = self.server_url {
            next.server_url = normalize_server_url(&url);
        }
        if let Some(user_id) = self.user_id {
            next.user_id = user_id.trim().to_string();
        }
        if let Some(token) = self.api_token {
            next.api_token = normalize_api_token(&token);
        }
        if let Some(device_id) = self.device_id {
            let device_id = device_id.trim();
            if !device_id.is_empty() {
                next.device_id = device_id.to_string();
            }
        }
        if let Some(timeout) = self.request_timeout_ms {
            next.request_timeout_ms = clamp_request_timeout_ms(timeout as f64);
        }
        if let Some(logging) = self.enable_logging {
            next.enable_logging = logging;
        }
        next
    }
}

/// Trims whitespace and trailing slashes.
pub fn normalize_server_url(input: &str) -> String {
    input.trim().trim_end_matches('/').to_string()
}

/// Strips surrounding quotes and a leading `Bearer ` (any case) from a token.
pub fn normalize_api_token(input: &str) -> String {
    let mut value = input.trim();

    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted {
        value = value[1..value.len() - 1].trim();
    }

    let has_scheme = value
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("bearer"))
        && value[6..].starts_with(char::is_whitespace);
    if has_scheme {
        value = value[6..].trim();
    }

    value.to_string()
}

/// Rounds and clamps an interval to `[1, 1440]` minutes.
pub fn clamp_interval_minutes(minutes: f64) -> u32 {
    clamp_rounded(minutes, MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES)
}

/// Rounds and clamps a timeout to `[3000, 60000]` milliseconds.
pub fn clamp_request_timeout_ms(timeout_ms: f64) -> u32 {
    clamp_rounded(timeout_ms, MIN_REQUEST_TIMEOUT_MS, MAX_REQUEST_TIMEOUT_MS)
}

fn clamp_rounded(value: f64, min: u32, max: u32) -> u32 {
    value.round().clamp(f64::from(min), f64::from(max)) as u32
}

fn number_field(value: &Value, name: &str) -> Option<f64> {
    value
        .get(name)
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
}

/// Durable store of [`SyncSettings`].
///
/// Reads never fail: missing or corrupt records yield normalized defaults,
/// which are written back.
#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    /// Creates a settings store on top of a key-value store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Reads and normalizes the stored settings without writing anything.
    ///
    /// The returned `device_id` may be empty on first use.
    pub fn read(&self) -> SyncSettings {
        self.read_record()
            .1
            .as_ref()
            .map(SyncSettings::from_json_value)
            .unwrap_or_default()
    }

    /// Loads settings, generating a device id and repairing the record if needed.
    pub fn load(&self) -> SyncSettings {
        let (raw, parsed) = self.read_record();
        let mut settings = parsed
            .as_ref()
            .map(SyncSettings::from_json_value)
            .unwrap_or_default();

        let generated = match self.ensure_device_id(&mut settings) {
            Ok(generated) => generated,
            Err(e) => {
                warn!(error = %e, "failed to persist generated device id");
                return settings;
            }
        };

        if !generated && raw.as_deref() != serde_json::to_string(&settings).ok().as_deref() {
            debug!("rewriting normalized sync settings");
            if let Err(e) = self.persist(&settings) {
                warn!(error = %e, "failed to persist normalized sync settings");
            }
        }

        settings
    }

    /// Gives `settings` a device id if it has none.
    ///
    /// Side effect: a newly generated id is persisted immediately, whether or
    /// not sync is enabled, so the device identity survives toggling sync.
    /// Returns true if an id was generated.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings record cannot be written.
    pub fn ensure_device_id(&self, settings: &mut SyncSettings) -> SyncResult<bool> {
        if !settings.device_id.is_empty() {
            return Ok(false);
        }
        settings.device_id = Uuid::new_v4().to_string();
        debug!(device_id = %settings.device_id, "generated device id");
        self.persist(settings)?;
        Ok(true)
    }

    /// Merges `patch` over the current settings and persists the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    pub fn save(&self, patch: SettingsPatch) -> SyncResult<SyncSettings> {
        let current = self.load();
        let next = patch.apply(&current);
        self.persist(&next)?;
        Ok(next)
    }

    fn persist(&self, settings: &SyncSettings) -> SyncResult<()> {
        let json = serde_json::to_string(settings)?;
        self.store.put(SETTINGS_KEY, &json)?;
        Ok(())
    }

    fn read_record(&self) -> (Option<String>, Option<Value>) {
        let raw = match self.store.get(SETTINGS_KEY) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to read sync settings, using defaults");
                None
            }
        };
        let parsed = raw
            .as_deref()
            .and_then(|text| serde_json::from_str::<Value>(text).ok())
            .filter(Value::is_object);
        (raw, parsed)
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use timeflow_sync_storage::InMemoryStore;

    fn store() -> (Arc<InMemoryStore>, SettingsStore) {
        let kv = Arc::new(InMemoryStore::new());
        (kv.clone(), SettingsStore::new(kv))
    }

    #[test]
    fn defaults_on_empty_store() {
        let (kv, settings_store) = store();
        let settings = settings_store.load();

        assert!(!settings.enabled);
        assert!(settings.auto_sync_on_startup);
        assert_eq!(settings.auto_sync_interval_minutes, 30);
        assert_eq!(settings.request_timeout_ms, 15_000);
        assert!(!settings.device_id.is_empty());
        assert!(kv.get(SETTINGS_KEY).unwrap().is_some());
    }

    #[test]
    fn device_id_is_stable_across_loads() {
        let (_kv, settings_store) = store();
        let first = settings_store.load();
        let second = settings_store.load();
        assert_eq!(first.device_id, second.device_id);
    }

    #[test]
    fn device_id_survives_toggling() {
        let (_kv, settings_store) = store();
        let id = settings_store.load().device_id;

        settings_store
            .save(SettingsPatch { enabled: Some(true), ..Default::default() })
            .unwrap();
        settings_store
            .save(SettingsPatch { enabled: Some(false), ..Default::default() })
            .unwrap();

        assert_eq!(settings_store.load().device_id, id);
    }

    #[test]
    fn read_does_not_write() {
        let (kv, settings_store) = store();
        let settings = settings_store.read();
        assert!(settings.device_id.is_empty());
        assert!(kv.is_empty());
    }

    #[test]
    fn corrupt_record_heals_to_defaults() {
        let kv = Arc::new(InMemoryStore::with_records([(SETTINGS_KEY, "{not json")]));
        let settings_store = SettingsStore::new(kv.clone());

        let settings = settings_store.load();
        assert_eq!(settings.auto_sync_interval_minutes, DEFAULT_INTERVAL_MINUTES);

        let stored: Value = serde_json::from_str(&kv.get(SETTINGS_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(stored["deviceId"], json!(settings.device_id));
    }

    #[test]
    fn malformed_field_keeps_the_rest() {
        let record = json!({
            "enabled": true,
            "autoSyncIntervalMinutes": "often",
            "serverUrl": " https://sync.example.com/// ",
            "userId": " u1 ",
            "requestTimeoutMs": 1,
            "deviceId": "dev-1"
        });
        let settings = SyncSettings::from_json_value(&record);

        assert!(settings.enabled);
        assert_eq!(settings.auto_sync_interval_minutes, DEFAULT_INTERVAL_MINUTES);
        assert_eq!(settings.server_url, "https://sync.example.com");
        assert_eq!(settings.user_id, "u1");
        assert_eq!(settings.request_timeout_ms, MIN_REQUEST_TIMEOUT_MS);
        assert_eq!(settings.device_id, "dev-1");
    }

    #[test]
    fn save_clamps_interval() {
        let (_kv, settings_store) = store();

        let low = settings_store
            .save(SettingsPatch { auto_sync_interval_minutes: Some(0), ..Default::default() })
            .unwrap();
        assert_eq!(low.auto_sync_interval_minutes, 1);

        let high = settings_store
            .save(SettingsPatch {
                auto_sync_interval_minutes: Some(99_999),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(high.auto_sync_interval_minutes, 1_440);
        assert_eq!(settings_store.load().auto_sync_interval_minutes, 1_440);
    }

    #[test]
    fn save_normalizes_token_and_url() {
        let (_kv, settings_store) = store();
        let saved = settings_store
            .save(SettingsPatch {
                api_token: Some("Bearer abc123".into()),
                server_url: Some("https://s/".into()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(saved.api_token, "abc123");
        assert_eq!(saved.server_url, "https://s");
        assert_eq!(settings_store.load().api_token, "abc123");
    }

    #[test]
    fn save_ignores_blank_device_id() {
        let (_kv, settings_store) = store();
        let id = settings_store.load().device_id;
        let saved = settings_store
            .save(SettingsPatch { device_id: Some("   ".into()), ..Default::default() })
            .unwrap();
        assert_eq!(saved.device_id, id);
    }

    #[test]
    fn token_normalization() {
        assert_eq!(normalize_api_token("  \"abc\"  "), "abc");
        assert_eq!(normalize_api_token("'Bearer xyz'"), "xyz");
        assert_eq!(normalize_api_token("bearer    tok"), "tok");
        assert_eq!(normalize_api_token("BEARER\ttok"), "tok");
        assert_eq!(normalize_api_token("Bearertok"), "Bearertok");
        assert_eq!(normalize_api_token("\""), "\"");
        assert_eq!(normalize_api_token(""), "");
        // Only one scheme prefix is removed per pass.
        assert_eq!(normalize_api_token("Bearer Bearer x"), "Bearer x");
    }

    #[test]
    fn configured_requires_url_and_user() {
        let mut settings = SyncSettings::default();
        assert!(!settings.is_configured());
        settings.server_url = "https://s".into();
        assert!(!settings.is_configured());
        settings.user_id = "u1".into();
        assert!(settings.is_configured());
        assert_eq!(settings.bearer_token(), None);
    }

    proptest! {
        #[test]
        fn interval_always_in_range(minutes in proptest::num::f64::ANY) {
            let record = json!({ "autoSyncIntervalMinutes": minutes });
            let settings = SyncSettings::from_json_value(&record);
            prop_assert!((MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES)
                .contains(&settings.auto_sync_interval_minutes));
        }

        #[test]
        fn timeout_always_in_range(timeout in any::<i64>()) {
            let patch = SettingsPatch { request_timeout_ms: Some(timeout), ..Default::default() };
            let settings = patch.apply(&SyncSettings::default());
            prop_assert!((MIN_REQUEST_TIMEOUT_MS..=MAX_REQUEST_TIMEOUT_MS)
                .contains(&settings.request_timeout_ms));
        }

        #[test]
        fn token_wrappers_are_stripped_once(
            token in "[a-zA-Z0-9._-]{1,24}",
            scheme in prop::bool::ANY,
            quote in prop::sample::select(vec!["", "\"", "'"]),
        ) {
            let inner = if scheme { format!("Bearer {token}") } else { token.clone() };
            let wrapped = format!(" {quote}{inner}{quote} ");
            let once = normalize_api_token(&wrapped);
            prop_assert_eq!(&once, &token);
            prop_assert_eq!(normalize_api_token(&once), once.clone());
        }
    }
}
