use serde::Deserialize;
use std::collections::HashMap;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct FeatureToggles {
    #[serde(flatten)]
    pub flags: HashMap<String, bool>,
}

impl FeatureToggles {
    // Load from a provided path or env var FEATURE_TOGGLES_PATH, defaulting to ./feature-toggles.json
    pub fn from_path(path: Option<String>) -> Self {
        let default_path = std::env::var("FEATURE_TOGGLES_PATH")
            .unwrap_or_else(|_| "feature-toggles.json".to_string());
        let path = path.unwrap_or(default_path);

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path, error = %e, "Malformed feature toggles, using defaults");
                FeatureToggles::default()
            }),
            Err(_) => FeatureToggles::default(),
        }
    }

    pub fn from_env_path() -> Self {
        Self::from_path(None)
    }

    pub fn with_flag(mut self, name: &str, enabled: bool) -> Self {
        self.flags.insert(name.to_string(), enabled);
        self
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn is_enabled_or(&self, name: &str, default: bool) -> bool {
        self.flags.get(name).copied().unwrap_or(default)
    }

    // Scheduled threshold rules
    pub fn monitor_enabled(&self) -> bool {
        self.is_enabled_or("Monitor", true)
    }

    // Outbound emergency notifications for critical alerts
    pub fn notifications_enabled(&self) -> bool {
        self.is_enabled_or("Notifications", true)
    }

    // Per-IP API rate limiting
    pub fn rate_limiting_enabled(&self) -> bool {
        self.is_enabled_or("RateLimiting", true)
    }

    pub fn enabled_features(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .flags
            .iter()
            .filter(|(_, &enabled)| enabled)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_enables_everything() {
        let toggles = FeatureToggles::from_path(Some("/nonexistent/feature-toggles.json".into()));
        assert!(toggles.monitor_enabled());
        assert!(toggles.notifications_enabled());
        assert!(toggles.rate_limiting_enabled());
    }

    #[test]
    fn reads_flags_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"Monitor": false, "RateLimiting": true}}"#).unwrap();

        let toggles = FeatureToggles::from_path(Some(file.path().to_string_lossy().into_owned()));
        assert!(!toggles.monitor_enabled());
        assert!(toggles.rate_limiting_enabled());
        assert_eq!(toggles.enabled_features(), vec!["RateLimiting".to_string()]);
    }
}
