//! Cab-signaling decode tables.
//!
//! A decode table maps the reduced speed-code triple `(Ve, Vc, Va)` of the
//! nearest block section to the command shown and enforced on board. Tables
//! are built once from an external row source and immutable afterwards.
//!
//! Runtime lookups never fail: a missing triple retries with the third
//! component wildcarded, then falls back to the most restrictive command.

use std::collections::HashMap;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::codes::{CabAspect, SpeedCode};
use crate::units::from_kph;

/// Fallback control speed when a triple decodes to nothing [km/h].
const FALLBACK_CONTROL_SPEED_KPH: f32 = 35.0;

/// Decode-table construction error. Fatal at initialization: the decoder
/// cannot operate without a valid table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("decode table is empty")]
    Empty,
    #[error("row {row}: {detail}")]
    BadRow { row: usize, detail: String },
    #[error("row {row}: duplicate key ({ve:?}, {vc:?}, {va:?})")]
    DuplicateKey {
        row: usize,
        ve: SpeedCode,
        vc: SpeedCode,
        va: SpeedCode,
    },
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// One decoded on-board command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedCommand {
    /// Commanded cab aspect.
    pub aspect: CabAspect,
    /// Whether the cab aspect blinks.
    pub blinking: bool,
    /// Control speed at the current section entry [m/s].
    pub start_control_speed_mps: f32,
    /// Control speed at the next signal [m/s].
    pub end_control_speed_mps: f32,
    /// Deceleration used for curve-bounded enforcement [m/s²]
    /// (zero on the older generation: flat enforcement).
    pub deceleration_mps2: f32,
}

impl DecodedCommand {
    /// Most restrictive command: on-sight aspect, low flat control speed.
    pub fn fallback() -> Self {
        Self {
            aspect: CabAspect::Rrr,
            blinking: false,
            start_control_speed_mps: from_kph(FALLBACK_CONTROL_SPEED_KPH),
            end_control_speed_mps: from_kph(FALLBACK_CONTROL_SPEED_KPH),
            deceleration_mps2: 0.0,
        }
    }
}

/// One table row as supplied by the table provider.
///
/// Codes are textual (`"270V"`, `"---"` wildcard on `va` only) so that rows
/// can come straight from a TOML source; `end_control_speed_kph` and
/// `deceleration_mps2` are omitted on older-generation tables.
#[derive(Debug, Clone, Deserialize)]
pub struct DecodeRow {
    pub ve: String,
    pub vc: String,
    pub va: String,
    pub aspect: String,
    pub blinking: bool,
    pub control_speed_kph: f32,
    #[serde(default)]
    pub end_control_speed_kph: Option<f32>,
    #[serde(default)]
    pub deceleration_mps2: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct DecodeTableFile {
    #[serde(rename = "row")]
    rows: Vec<DecodeRow>,
}

/// Immutable decode table.
#[derive(Debug, Clone)]
pub struct DecodeTable {
    map: HashMap<(SpeedCode, SpeedCode, SpeedCode), DecodedCommand>,
}

impl DecodeTable {
    /// Build a table from typed rows. Duplicate keys, unknown codes and
    /// wildcards outside the third key component are fatal.
    pub fn from_rows(rows: &[DecodeRow]) -> Result<Self, TableError> {
        if rows.is_empty() {
            return Err(TableError::Empty);
        }

        let mut map = HashMap::with_capacity(rows.len());
        for (idx, r) in rows.iter().enumerate() {
            let ve = parse_code(&r.ve, idx)?;
            let vc = parse_code(&r.vc, idx)?;
            let va = parse_code(&r.va, idx)?;
            if ve == SpeedCode::Any || vc == SpeedCode::Any {
                return Err(TableError::BadRow {
                    row: idx,
                    detail: "wildcard only allowed in the third key component".into(),
                });
            }
            let aspect = CabAspect::from_str(&r.aspect)
                .map_err(|detail| TableError::BadRow { row: idx, detail })?;
            if r.control_speed_kph <= 0.0 {
                return Err(TableError::BadRow {
                    row: idx,
                    detail: format!("non-positive control speed {}", r.control_speed_kph),
                });
            }

            let command = DecodedCommand {
                aspect,
                blinking: r.blinking,
                start_control_speed_mps: from_kph(r.control_speed_kph),
                end_control_speed_mps: from_kph(
                    r.end_control_speed_kph.unwrap_or(r.control_speed_kph),
                ),
                deceleration_mps2: r.deceleration_mps2.unwrap_or(0.0),
            };

            if map.insert((ve, vc, va), command).is_some() {
                return Err(TableError::DuplicateKey { row: idx, ve, vc, va });
            }
        }

        Ok(Self { map })
    }

    /// Build a table from a TOML document of `[[row]]` entries.
    pub fn from_toml_str(source: &str) -> Result<Self, TableError> {
        let file: DecodeTableFile = toml::from_str(source)?;
        Self::from_rows(&file.rows)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Decode a triple: exact key, then `(ve, vc, Any)`, then the
    /// conservative fallback.
    pub fn lookup(&self, ve: SpeedCode, vc: SpeedCode, va: SpeedCode) -> DecodedCommand {
        if let Some(cmd) = self.map.get(&(ve, vc, va)) {
            return *cmd;
        }
        if let Some(cmd) = self.map.get(&(ve, vc, SpeedCode::Any)) {
            return *cmd;
        }
        DecodedCommand::fallback()
    }
}

fn parse_code(text: &str, row: usize) -> Result<SpeedCode, TableError> {
    SpeedCode::from_str(text).map_err(|detail| TableError::BadRow { row, detail })
}

// ─── Tests ──────────────────────────────────────────────────────────
