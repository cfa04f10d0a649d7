//! Cab-signaling speed codes, commanded cab aspects and the fixed
//! per-generation reduction tables.
//!
//! The reduction tables are immutable data (code → code), not logic: the
//! sequence algorithms look codes up and take the minimum, nothing else.
//! A code missing from a table reduces to the most restrictive code.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

use crate::signal::Aspect;

/// Discrete track-to-train speed code.
///
/// `E` suffix = execution code, `V` suffix = approach code, plain = full
/// speed for the tier. `Any` is the wildcard used in decode-table keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SpeedCode {
    Rrr,
    S000,
    S30E,
    S30,
    S60E,
    S60,
    S80E,
    S80,
    S100E,
    S100,
    S130E,
    S130,
    S160E,
    S160,
    S170E,
    S170,
    S200V,
    S200,
    S220E,
    S220V,
    S220,
    S230E,
    S230V,
    S230,
    S270V,
    S270,
    S300V,
    S300,
    S320V,
    S320,
    Any,
}

impl FromStr for SpeedCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "RRR" => Self::Rrr,
            "000" => Self::S000,
            "30E" => Self::S30E,
            "30" => Self::S30,
            "60E" => Self::S60E,
            "60" => Self::S60,
            "80E" => Self::S80E,
            "80" => Self::S80,
            "100E" => Self::S100E,
            "100" => Self::S100,
            "130E" => Self::S130E,
            "130" => Self::S130,
            "160E" => Self::S160E,
            "160" => Self::S160,
            "170E" => Self::S170E,
            "170" => Self::S170,
            "200V" => Self::S200V,
            "200" => Self::S200,
            "220E" => Self::S220E,
            "220V" => Self::S220V,
            "220" => Self::S220,
            "230E" => Self::S230E,
            "230V" => Self::S230V,
            "230" => Self::S230,
            "270V" => Self::S270V,
            "270" => Self::S270,
            "300V" => Self::S300V,
            "300" => Self::S300,
            "320V" => Self::S320V,
            "320" => Self::S320,
            "---" => Self::Any,
            other => return Err(format!("unknown speed code '{other}'")),
        })
    }
}

/// Commanded cab aspect decoded from a speed-code triple.
///
/// Declared most restrictive first; the `Ord` order drives the
/// closed/opened-signal sound edges. Absence of a command is
/// `Option::<CabAspect>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CabAspect {
    Rrr,
    S000,
    S30E,
    S30A,
    S60E,
    S60A,
    S80E,
    S80A,
    S100E,
    S100A,
    S130E,
    S130A,
    S160E,
    S160A,
    S170E,
    S170A,
    S200V,
    S200A,
    S220E,
    S220V,
    S220A,
    S230E,
    S230V,
    S230A,
    S270V,
    S270A,
    S300V,
    S300A,
    S320V,
}

impl FromStr for CabAspect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "RRR" => Self::Rrr,
            "000" => Self::S000,
            "30E" => Self::S30E,
            "30A" => Self::S30A,
            "60E" => Self::S60E,
            "60A" => Self::S60A,
            "80E" => Self::S80E,
            "80A" => Self::S80A,
            "100E" => Self::S100E,
            "100A" => Self::S100A,
            "130E" => Self::S130E,
            "130A" => Self::S130A,
            "160E" => Self::S160E,
            "160A" => Self::S160A,
            "170E" => Self::S170E,
            "170A" => Self::S170A,
            "200V" => Self::S200V,
            "200A" => Self::S200A,
            "220E" => Self::S220E,
            "220V" => Self::S220V,
            "220A" => Self::S220A,
            "230E" => Self::S230E,
            "230V" => Self::S230V,
            "230A" => Self::S230A,
            "270V" => Self::S270V,
            "270A" => Self::S270A,
            "300V" => Self::S300V,
            "300A" => Self::S300A,
            "320V" => Self::S320V,
            other => return Err(format!("unknown cab aspect '{other}'")),
        })
    }
}

/// Cab-signaling equipment generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TvmModel {
    /// Older generation, flat speed enforcement, 300 km/h ceiling.
    Tvm300,
    /// Newer generation fitted for 300 km/h.
    Tvm430V300,
    /// Newer generation fitted for 320 km/h.
    Tvm430V320,
}

impl TvmModel {
    /// Whether this is the newer (curve-enforcing, settle-timer) generation.
    #[inline]
    pub const fn is_tvm430(self) -> bool {
        matches!(self, Self::Tvm430V300 | Self::Tvm430V320)
    }

    /// First reduction table for this generation.
    #[inline]
    pub fn tab1(self, code: SpeedCode) -> SpeedCode {
        match self {
            Self::Tvm300 => reduce(TVM300_TAB1, code),
            _ => reduce(TVM430_TAB1, code),
        }
    }

    /// Second reduction table for this generation.
    #[inline]
    pub fn tab2(self, code: SpeedCode) -> SpeedCode {
        match self {
            Self::Tvm300 => reduce(TVM300_TAB2, code),
            _ => reduce(TVM430_TAB2, code),
        }
    }

    /// Translate a commanded cab aspect to the legacy line-side aspect shown
    /// on the generic cab repeater.
    pub fn legacy_aspect(self, cab: Option<CabAspect>) -> Option<Aspect> {
        let cab = cab?;
        let table = match self {
            Self::Tvm300 => TVM300_LEGACY,
            Self::Tvm430V300 => TVM430_V300_LEGACY,
            Self::Tvm430V320 => TVM430_V320_LEGACY,
        };
        table
            .iter()
            .find(|(c, _)| *c == cab)
            .map(|&(_, aspect)| aspect)
    }
}

/// Look a code up in a reduction table; missing codes reduce to `S000`.
#[inline]
fn reduce(table: &[(SpeedCode, SpeedCode)], code: SpeedCode) -> SpeedCode {
    table
        .iter()
        .find(|(from, _)| *from == code)
        .map(|&(_, to)| to)
        .unwrap_or(SpeedCode::S000)
}

use SpeedCode as C;

/// Older-generation TAB1.
pub static TVM300_TAB1: &[(SpeedCode, SpeedCode)] = &[
    (C::Rrr, C::S000),
    (C::S000, C::S160),
    (C::S80E, C::S80),
    (C::S80, C::S160),
    (C::S160E, C::S160),
    (C::S160, C::S220),
    (C::S220E, C::S220),
    (C::S220, C::S270),
    (C::S270V, C::S270),
    (C::S270, C::S300),
    (C::S300V, C::S300),
    (C::S300, C::S000),
];

/// Older-generation TAB2.
pub static TVM300_TAB2: &[(SpeedCode, SpeedCode)] = &[
    (C::Rrr, C::S000),
    (C::S000, C::S000),
    (C::S80E, C::S80),
    (C::S80, C::S80),
    (C::S160E, C::S160),
    (C::S160, C::S160),
    (C::S220E, C::S220),
    (C::S220, C::S220),
    (C::S270V, C::S270),
    (C::S270, C::S270),
    (C::S300V, C::S300),
    (C::S300, C::S000),
];

/// Newer-generation TAB1.
pub static TVM430_TAB1: &[(SpeedCode, SpeedCode)] = &[
    (C::Rrr, C::S000),
    (C::S000, C::S170),
    (C::S60E, C::S60),
    (C::S60, C::S170),
    (C::S80E, C::S80),
    (C::S80, C::S170),
    (C::S130E, C::S130),
    (C::S130, C::S200),
    (C::S160E, C::S160),
    (C::S160, C::S230),
    (C::S170E, C::S170),
    (C::S170, C::S230),
    (C::S200V, C::S200),
    (C::S200, C::S230),
    (C::S220E, C::S220),
    (C::S220V, C::S220),
    (C::S220, C::S270),
    (C::S230E, C::S230),
    (C::S230V, C::S230),
    (C::S230, C::S270),
    (C::S270V, C::S270),
    (C::S270, C::S300),
    (C::S300V, C::S300),
    (C::S300, C::S320),
    (C::S320V, C::S320),
    (C::S320, C::S000),
];

/// Newer-generation TAB2.
pub static TVM430_TAB2: &[(SpeedCode, SpeedCode)] = &[
    (C::Rrr, C::S000),
    (C::S000, C::S000),
    (C::S60E, C::S60),
    (C::S60, C::S60),
    (C::S80E, C::S80),
    (C::S80, C::S80),
    (C::S130E, C::S130),
    (C::S130, C::S130),
    (C::S160E, C::S160),
    (C::S160, C::S160),
    (C::S170E, C::S170),
    (C::S170, C::S170),
    (C::S200V, C::S200),
    (C::S200, C::S200),
    (C::S220E, C::S220),
    (C::S220V, C::S220),
    (C::S220, C::S220),
    (C::S230E, C::S230),
    (C::S230V, C::S230),
    (C::S230, C::S230),
    (C::S270V, C::S270),
    (C::S270, C::S270),
    (C::S300V, C::S300),
    (C::S300, C::S300),
    (C::S320V, C::S320),
    (C::S320, C::S000),
];

const_assert_eq!(TVM300_TAB1.len(), 12);
const_assert_eq!(TVM300_TAB2.len(), 12);
const_assert_eq!(TVM430_TAB1.len(), 26);
const_assert_eq!(TVM430_TAB2.len(), 26);

use CabAspect as A;

/// Older-generation legacy repeater translation.
static TVM300_LEGACY: &[(CabAspect, Aspect)] = &[
    (A::S300V, Aspect::Clear2),
    (A::S270A, Aspect::Clear1),
    (A::S270V, Aspect::Approach3),
    (A::S220A, Aspect::Approach2),
    (A::S220E, Aspect::Approach1),
    (A::S160A, Aspect::Restricted),
    (A::S160E, Aspect::StopAndProceed),
    (A::S80A, Aspect::Restricted),
    (A::S80E, Aspect::StopAndProceed),
    (A::S000, Aspect::Stop),
    (A::Rrr, Aspect::Permission),
];

/// Newer-generation legacy repeater translation, 300 km/h fitting.
static TVM430_V300_LEGACY: &[(CabAspect, Aspect)] = &[
    (A::S300V, Aspect::Clear2),
    (A::S270A, Aspect::Clear1),
    (A::S270V, Aspect::Clear1),
    (A::S230A, Aspect::Approach3),
    (A::S230V, Aspect::Approach3),
    (A::S230E, Aspect::Approach3),
    (A::S220A, Aspect::Approach3),
    (A::S220V, Aspect::Approach3),
    (A::S220E, Aspect::Approach3),
    (A::S200A, Aspect::Approach2),
    (A::S200V, Aspect::Approach2),
    (A::S170A, Aspect::Approach2),
    (A::S170E, Aspect::Approach2),
    (A::S160A, Aspect::Approach1),
    (A::S160E, Aspect::Approach1),
    (A::S130A, Aspect::Restricted),
    (A::S130E, Aspect::Restricted),
    (A::S80A, Aspect::Restricted),
    (A::S80E, Aspect::Restricted),
    (A::S60A, Aspect::Restricted),
    (A::S60E, Aspect::Restricted),
    (A::S000, Aspect::Stop),
    (A::Rrr, Aspect::Permission),
];

/// Newer-generation legacy repeater translation, 320 km/h fitting.
static TVM430_V320_LEGACY: &[(CabAspect, Aspect)] = &[
    (A::S320V, Aspect::Clear2),
    (A::S300A, Aspect::Clear1),
    (A::S300V, Aspect::Clear1),
    (A::S270A, Aspect::Approach3),
    (A::S270V, Aspect::Approach3),
    (A::S230A, Aspect::Approach2),
    (A::S230E, Aspect::Approach2),
    (A::S220A, Aspect::Approach2),
    (A::S220E, Aspect::Approach2),
    (A::S200A, Aspect::Approach1),
    (A::S200V, Aspect::Approach1),
    (A::S170A, Aspect::Approach1),
    (A::S170E, Aspect::Approach1),
    (A::S160A, Aspect::Approach1),
    (A::S160E, Aspect::Approach1),
    (A::S130A, Aspect::Restricted),
    (A::S130E, Aspect::Restricted),
    (A::S80A, Aspect::Restricted),
    (A::S80E, Aspect::Restricted),
    (A::S60A, Aspect::Restricted),
    (A::S60E, Aspect::Restricted),
    (A::S000, Aspect::Stop),
    (A::Rrr, Aspect::Permission),
];

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cab_aspect_order_is_restrictiveness() {
        assert!(CabAspect::S300V > CabAspect::S270A);
        assert!(CabAspect::S160E > CabAspect::S000);
        assert!(CabAspect::S000 > CabAspect::Rrr);
    }

    #[test]
    fn reduction_tables_cover_their_codes() {
        assert_eq!(TvmModel::Tvm300.tab1(SpeedCode::S270), SpeedCode::S300);
        assert_eq!(TvmModel::Tvm300.tab2(SpeedCode::S300), SpeedCode::S000);
        assert_eq!(TvmModel::Tvm430V320.tab1(SpeedCode::S320), SpeedCode::S000);
        assert_eq!(TvmModel::Tvm430V320.tab2(SpeedCode::S320V), SpeedCode::S320);
    }

    #[test]
    fn missing_code_reduces_to_most_restrictive() {
        // The 320 tier does not exist on the older generation.
        assert_eq!(TvmModel::Tvm300.tab1(SpeedCode::S320V), SpeedCode::S000);
        assert_eq!(TvmModel::Tvm300.tab2(SpeedCode::Any), SpeedCode::S000);
    }

    #[test]
    fn speed_code_parsing() {
        assert_eq!("300V".parse::<SpeedCode>(), Ok(SpeedCode::S300V));
        assert_eq!("---".parse::<SpeedCode>(), Ok(SpeedCode::Any));
        assert!("999".parse::<SpeedCode>().is_err());
    }

    #[test]
    fn cab_aspect_parsing() {
        assert_eq!("270A".parse::<CabAspect>(), Ok(CabAspect::S270A));
        assert_eq!("RRR".parse::<CabAspect>(), Ok(CabAspect::Rrr));
        assert!("---".parse::<CabAspect>().is_err());
    }

    #[test]
    fn legacy_translation_per_fitting() {
        assert_eq!(
            TvmModel::Tvm300.legacy_aspect(Some(CabAspect::S300V)),
            Some(Aspect::Clear2)
        );
        assert_eq!(
            TvmModel::Tvm430V300.legacy_aspect(Some(CabAspect::S270V)),
            Some(Aspect::Clear1)
        );
        assert_eq!(
            TvmModel::Tvm430V320.legacy_aspect(Some(CabAspect::S270V)),
            Some(Aspect::Approach3)
        );
        assert_eq!(TvmModel::Tvm300.legacy_aspect(None), None);
    }
}
