use serde::{Deserialize, Serialize};
use stacked_errors::StackableErr;

use crate::{version::DEFAULT_REGISTRY, ErisError, ErisPaths, Result};

/// The value of `crash_report` that opts out of crash reports
pub const CRASH_REPORT_DISABLED: &str = "don't send";

/// Contents of `<eris root>/eris.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    #[serde(rename = "CrashReport")]
    pub crash_report: String,
    /// Registry prefixed to eris images, empty means Docker Hub
    #[serde(rename = "ImageRegistry")]
    pub image_registry: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            crash_report: "bugsnag".to_owned(),
            image_registry: DEFAULT_REGISTRY.to_owned(),
        }
    }
}

impl GlobalConfig {
    /// Loads `eris.toml`, a missing file results in the defaults
    pub async fn load(paths: &ErisPaths) -> Result<Self> {
        let path = paths.global_config();
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e)
                    .stack_err_with(|| format!("GlobalConfig::load -> reading {path:?}"))
                    .map_err(ErisError::FilesystemFailure)
            }
        };
        toml::from_str(&contents).map_err(|e| ErisError::malformed(path, e))
    }

    /// Writes `eris.toml` if there is none yet
    pub async fn write_if_missing(&self, paths: &ErisPaths) -> Result<bool> {
        let path = paths.global_config();
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(false)
        }
        let contents = toml::to_string_pretty(self)
            .stack_err("GlobalConfig::write_if_missing -> serializing")
            .map_err(ErisError::FilesystemFailure)?;
        tokio::fs::write(&path, contents)
            .await
            .stack_err_with(|| format!("GlobalConfig::write_if_missing -> writing {path:?}"))
            .map_err(ErisError::FilesystemFailure)?;
        Ok(true)
    }

    pub fn sends_crash_reports(&self) -> bool {
        self.crash_report != CRASH_REPORT_DISABLED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_then_written() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ErisPaths::new(dir.path());
        assert_eq!(GlobalConfig::load(&paths).await.unwrap(), GlobalConfig::default());

        let config = GlobalConfig {
            crash_report: CRASH_REPORT_DISABLED.to_owned(),
            image_registry: String::new(),
        };
        assert!(config.write_if_missing(&paths).await.unwrap());
        assert!(!GlobalConfig::default().write_if_missing(&paths).await.unwrap());

        let loaded = GlobalConfig::load(&paths).await.unwrap();
        assert_eq!(loaded, config);
        assert!(!loaded.sends_crash_reports());
    }

    #[tokio::test]
    async fn malformed() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ErisPaths::new(dir.path());
        std::fs::write(paths.global_config(), "CrashReport = [1, 2]").unwrap();
        assert!(GlobalConfig::load(&paths).await.unwrap_err().is_malformed());
    }
}
