//! Train equipment configuration.
//!
//! Load-once named parameters with defaults, deserialized from TOML.
//! Every field has a default so a partial (or empty) file yields a valid
//! conventional-line fitting; `validate()` enforces parameter bounds and
//! fitting consistency before the supervisor is built.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codes::TvmModel;

/// Configuration loading/validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config validation: {0}")]
    Validation(String),
}

/// Complete train fitting, immutable after load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub rso: RsoConfig,
    #[serde(default)]
    pub kvb: KvbConfig,
    #[serde(default)]
    pub tvm: TvmConfig,
    #[serde(default)]
    pub vacma: VacmaConfig,
}

/// Equipment presence flags and train braking characteristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Vigilance device fitted.
    #[serde(default = "default_true")]
    pub vacma_present: bool,
    /// Signal repetition reflex fitted.
    #[serde(default = "default_true")]
    pub rso_present: bool,
    /// Beacon overspeed supervisor fitted.
    #[serde(default)]
    pub kvb_present: bool,
    /// Older-generation cab signaling fitted.
    #[serde(default)]
    pub tvm300_present: bool,
    /// Newer-generation cab signaling fitted.
    #[serde(default)]
    pub tvm430_present: bool,
    /// Electro-pneumatic brake (fast establishment).
    #[serde(default)]
    pub electro_pneumatic_brake: bool,
    /// Heavy freight consist (slow establishment).
    #[serde(default)]
    pub heavy_freight_train: bool,
    /// Guaranteed service deceleration [m/s²].
    #[serde(default = "default_safe_deceleration")]
    pub safe_deceleration_mps2: f32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            vacma_present: true,
            rso_present: true,
            kvb_present: false,
            tvm300_present: false,
            tvm430_present: false,
            electro_pneumatic_brake: false,
            heavy_freight_train: false,
            safe_deceleration_mps2: default_safe_deceleration(),
        }
    }
}

/// Signal repetition reflex parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsoConfig {
    /// Acknowledgment window before emergency braking [s].
    #[serde(default = "default_rso_delay")]
    pub delay_before_emergency_braking_s: f32,
    /// Acknowledgment lamp blink frequency [Hz].
    #[serde(default = "default_rso_blinker_hz")]
    pub blinker_frequency_hz: f32,
}

impl Default for RsoConfig {
    fn default() -> Self {
        Self {
            delay_before_emergency_braking_s: default_rso_delay(),
            blinker_frequency_hz: default_rso_blinker_hz(),
        }
    }
}

/// Beacon overspeed supervisor parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvbConfig {
    /// Supervisor inhibited (fitted but switched out).
    #[serde(default)]
    pub inhibited: bool,
    /// Fixed train speed ceiling [km/h].
    #[serde(default = "default_kvb_train_limit")]
    pub train_speed_limit_kph: f32,
}

impl Default for KvbConfig {
    fn default() -> Self {
        Self {
            inhibited: false,
            train_speed_limit_kph: default_kvb_train_limit(),
        }
    }
}

/// Cab-signaling parameters common to both generations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvmConfig {
    /// Continuous overspeed enforcement inhibited.
    #[serde(default)]
    pub covit_inhibited: bool,
    /// Newer-generation train ceiling [km/h]; selects the 300 or 320 fitting.
    #[serde(default = "default_tvm430_train_limit")]
    pub tvm430_train_speed_limit_kph: f32,
}

impl Default for TvmConfig {
    fn default() -> Self {
        Self {
            covit_inhibited: false,
            tvm430_train_speed_limit_kph: default_tvm430_train_limit(),
        }
    }
}

/// Vigilance device parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VacmaConfig {
    /// Speed above which vigilance is supervised [km/h].
    #[serde(default = "default_vacma_activation")]
    pub activation_speed_kph: f32,
    /// Pedal released: delay to audible alert [s].
    #[serde(default = "default_vacma_released_alert")]
    pub released_alert_delay_s: f32,
    /// Pedal released: delay to emergency [s].
    #[serde(default = "default_vacma_released_emergency")]
    pub released_emergency_delay_s: f32,
    /// Pedal held: delay to audible alert [s].
    #[serde(default = "default_vacma_pressed_alert")]
    pub pressed_alert_delay_s: f32,
    /// Pedal held: delay to emergency [s].
    #[serde(default = "default_vacma_pressed_emergency")]
    pub pressed_emergency_delay_s: f32,
}

impl Default for VacmaConfig {
    fn default() -> Self {
        Self {
            activation_speed_kph: default_vacma_activation(),
            released_alert_delay_s: default_vacma_released_alert(),
            released_emergency_delay_s: default_vacma_released_emergency(),
            pressed_alert_delay_s: default_vacma_pressed_alert(),
            pressed_emergency_delay_s: default_vacma_pressed_emergency(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_safe_deceleration() -> f32 {
    0.7
}
fn default_rso_delay() -> f32 {
    4.0
}
fn default_rso_blinker_hz() -> f32 {
    6.0
}
fn default_kvb_train_limit() -> f32 {
    160.0
}
fn default_tvm430_train_limit() -> f32 {
    320.0
}
fn default_vacma_activation() -> f32 {
    3.0
}
fn default_vacma_released_alert() -> f32 {
    2.5
}
fn default_vacma_released_emergency() -> f32 {
    5.0
}
fn default_vacma_pressed_alert() -> f32 {
    55.0
}
fn default_vacma_pressed_emergency() -> f32 {
    60.0
}

impl TrainConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Cab-signaling generation selected by the presence flags, if any.
    pub fn tvm_model(&self) -> Option<TvmModel> {
        if self.general.tvm300_present {
            Some(TvmModel::Tvm300)
        } else if self.general.tvm430_present {
            if self.tvm.tvm430_train_speed_limit_kph <= 300.0 {
                Some(TvmModel::Tvm430V300)
            } else {
                Some(TvmModel::Tvm430V320)
            }
        } else {
            None
        }
    }

    /// Parameter bounds and fitting consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.tvm300_present && self.general.tvm430_present {
            return Err(ConfigError::Validation(
                "tvm300_present and tvm430_present are mutually exclusive".into(),
            ));
        }
        if self.general.safe_deceleration_mps2 <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "safe_deceleration_mps2 {} must be positive",
                self.general.safe_deceleration_mps2
            )));
        }
        for (name, value) in [
            (
                "rso.delay_before_emergency_braking_s",
                self.rso.delay_before_emergency_braking_s,
            ),
            ("rso.blinker_frequency_hz", self.rso.blinker_frequency_hz),
            ("kvb.train_speed_limit_kph", self.kvb.train_speed_limit_kph),
            (
                "tvm.tvm430_train_speed_limit_kph",
                self.tvm.tvm430_train_speed_limit_kph,
            ),
            (
                "vacma.released_alert_delay_s",
                self.vacma.released_alert_delay_s,
            ),
            (
                "vacma.released_emergency_delay_s",
                self.vacma.released_emergency_delay_s,
            ),
            (
                "vacma.pressed_alert_delay_s",
                self.vacma.pressed_alert_delay_s,
            ),
            (
                "vacma.pressed_emergency_delay_s",
                self.vacma.pressed_emergency_delay_s,
            ),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{name} {value} must be positive"
                )));
            }
        }
        if self.vacma.released_emergency_delay_s < self.vacma.released_alert_delay_s
            || self.vacma.pressed_emergency_delay_s < self.vacma.pressed_alert_delay_s
        {
            return Err(ConfigError::Validation(
                "vigilance emergency delays must not be shorter than alert delays".into(),
            ));
        }
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = TrainConfig::from_toml_str("").unwrap();
        assert!(config.general.vacma_present);
        assert!(config.general.rso_present);
        assert!(!config.general.kvb_present);
        assert_eq!(config.rso.delay_before_emergency_braking_s, 4.0);
        assert_eq!(config.kvb.train_speed_limit_kph, 160.0);
        assert_eq!(config.tvm_model(), None);
    }

    #[test]
    fn tvm_model_selection() {
        let config = TrainConfig::from_toml_str(
            "[general]\ntvm430_present = true\n[tvm]\ntvm430_train_speed_limit_kph = 300.0\n",
        )
        .unwrap();
        assert_eq!(config.tvm_model(), Some(TvmModel::Tvm430V300));

        let config = TrainConfig::from_toml_str("[general]\ntvm430_present = true\n").unwrap();
        assert_eq!(config.tvm_model(), Some(TvmModel::Tvm430V320));

        let config = TrainConfig::from_toml_str("[general]\ntvm300_present = true\n").unwrap();
        assert_eq!(config.tvm_model(), Some(TvmModel::Tvm300));
    }

    #[test]
    fn conflicting_fittings_rejected() {
        let result = TrainConfig::from_toml_str(
            "[general]\ntvm300_present = true\ntvm430_present = true\n",
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn non_positive_parameter_rejected() {
        let result =
            TrainConfig::from_toml_str("[rso]\ndelay_before_emergency_braking_s = 0.0\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn inverted_vigilance_delays_rejected() {
        let result = TrainConfig::from_toml_str(
            "[vacma]\nreleased_alert_delay_s = 6.0\nreleased_emergency_delay_s = 5.0\n",
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[general]\nkvb_present = true").unwrap();
        let config = TrainConfig::load(file.path()).unwrap();
        assert!(config.general.kvb_present);
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = TrainConfig::load(Path::new("/nonexistent/train.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
