//! Service configuration stored under `.postventa/state/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::kpi::KpiConfig;
use crate::core::schedule::ScheduleConfig;

/// Postventa configuration (TOML).
///
/// Edited by humans; every field has a default so partial files load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct PostventaConfig {
    pub schedule: ScheduleConfig,
    pub kpi: KpiConfig,
    pub notifications: NotificationConfig,
    pub folio: FolioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationConfig {
    /// Link sent with the "claim resolved" message; `{claim}` is replaced by the claim id.
    pub survey_link: String,
    pub sender: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            survey_link: "https://postventa.local/encuesta/{claim}".to_string(),
            sender: "postventa@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FolioConfig {
    pub prefix: String,
}

impl Default for FolioConfig {
    fn default() -> Self {
        Self {
            prefix: "PV".to_string(),
        }
    }
}

impl PostventaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.schedule.slot_minutes == 0 {
            return Err(anyhow!("schedule.slot_minutes must be > 0"));
        }
        if self.schedule.default_duration_minutes == 0 {
            return Err(anyhow!("schedule.default_duration_minutes must be > 0"));
        }
        if self.schedule.horizon_days == 0 {
            return Err(anyhow!("schedule.horizon_days must be > 0"));
        }
        if self.kpi.attention_deadline_hours == 0 {
            return Err(anyhow!("kpi.attention_deadline_hours must be > 0"));
        }
        if self.kpi.visits_per_technician_day == 0 || self.kpi.capacity_window_days == 0 {
            return Err(anyhow!(
                "kpi.visits_per_technician_day and kpi.capacity_window_days must be > 0"
            ));
        }
        if self.notifications.survey_link.trim().is_empty() {
            return Err(anyhow!("notifications.survey_link must not be empty"));
        }
        if self.folio.prefix.trim().is_empty() || self.folio.prefix.contains('-') {
            return Err(anyhow!("folio.prefix must be non-empty and contain no '-'"));
        }
        Ok(())
    }

    pub fn survey_link_for(&self, claim: u64) -> String {
        self.notifications
            .survey_link
            .replace("{claim}", &claim.to_string())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PostventaConfig::default()`.
pub fn load_config(path: &Path) -> Result<PostventaConfig> {
    if !path.exists() {
        let cfg = PostventaConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PostventaConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PostventaConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
