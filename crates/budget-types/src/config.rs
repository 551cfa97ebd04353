use serde::{Deserialize, Serialize};

/// Top-level configuration for the sync layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub api: ApiConfig,
    pub refresh: RefreshConfig,
    /// Delay before the single automatic retry after a failed fetch
    pub retry_delay_ms: u64,
    /// Delay before the confirmatory refresh after an optimistic update succeeds
    pub confirm_delay_ms: u64,
    /// Coalesce refreshes requested while one is already in flight
    pub single_flight: bool,
    /// Install `window.testDashboardSync` / `window.debugCache`
    pub debug_hooks: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            refresh: RefreshConfig::default(),
            retry_delay_ms: 5_000,
            confirm_delay_ms: 1_000,
            single_flight: false,
            debug_hooks: false,
        }
    }
}

impl SyncConfig {
    /// Parse from JSON; absent fields take their defaults.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json).map_err(|e| crate::BudgetError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Bearer token supplied by the login flow
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "/api".to_string(),
            token: None,
        }
    }
}

/// Auto-refresh stimuli. `interval_ms == 0` disables the timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_ms: u64,
    pub refresh_on_focus: bool,
    pub refresh_on_visibility_change: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            refresh_on_focus: true,
            refresh_on_visibility_change: true,
        }
    }
}

impl RefreshConfig {
    pub fn disabled() -> Self {
        Self {
            interval_ms: 0,
            refresh_on_focus: false,
            refresh_on_visibility_change: false,
        }
    }
}
