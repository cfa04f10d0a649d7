//! Signal aspect enumeration.
//!
//! The aspect order is load-bearing: variants are declared from most
//! restrictive to most permissive so that `Ord` comparisons, `max` and `min`
//! decide restrictiveness directly.

use serde::{Deserialize, Serialize};

/// Line-side signal aspect, ordered by permissiveness.
///
/// `Permission` (pass a stop signal on sight) sits below `Stop`; the clear
/// aspects are greatest. Absence of a signal is `Option::<Aspect>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Aspect {
    /// Permission to pass a stop signal on sight.
    Permission = 0,
    /// Absolute stop.
    Stop = 1,
    /// Stop, then proceed on sight.
    StopAndProceed = 2,
    /// Proceed at restricted speed.
    Restricted = 3,
    /// Approach: prepare to stop at the next signal.
    Approach1 = 4,
    Approach2 = 5,
    Approach3 = 6,
    /// Clear.
    Clear1 = 7,
    Clear2 = 8,
}

impl Aspect {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Permission),
            1 => Some(Self::Stop),
            2 => Some(Self::StopAndProceed),
            3 => Some(Self::Restricted),
            4 => Some(Self::Approach1),
            5 => Some(Self::Approach2),
            6 => Some(Self::Approach3),
            7 => Some(Self::Clear1),
            8 => Some(Self::Clear2),
            _ => None,
        }
    }

    /// Whether the aspect requires driver acknowledgment on the repetition
    /// reflex: stop, proceed-on-sight, restricted and all approach aspects.
    #[inline]
    pub const fn is_closed(self) -> bool {
        matches!(
            self,
            Self::Stop
                | Self::StopAndProceed
                | Self::Restricted
                | Self::Approach1
                | Self::Approach2
                | Self::Approach3
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_permissiveness() {
        assert!(Aspect::Clear2 > Aspect::Clear1);
        assert!(Aspect::Clear1 > Aspect::Approach3);
        assert!(Aspect::Approach1 > Aspect::Restricted);
        assert!(Aspect::StopAndProceed > Aspect::Stop);
        assert!(Aspect::Stop > Aspect::Permission);
        assert_eq!(Aspect::Stop.max(Aspect::Clear1), Aspect::Clear1);
    }

    #[test]
    fn closed_set() {
        assert!(Aspect::Stop.is_closed());
        assert!(Aspect::Approach3.is_closed());
        assert!(!Aspect::Clear1.is_closed());
        assert!(!Aspect::Clear2.is_closed());
        assert!(!Aspect::Permission.is_closed());
    }

    #[test]
    fn from_u8_round_trip() {
        for v in 0..=8u8 {
            assert_eq!(Aspect::from_u8(v).map(|a| a as u8), Some(v));
        }
        assert_eq!(Aspect::from_u8(9), None);
    }
}
