//! Finite enum tags used by the STAT7 coordinate (spec §3).

use crate::canonical::CanonicalValue;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! canonical_tag {
    ($name:ident, $err:ident, { $($variant:ident => $str:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str),+
                }
            }

            pub const ALL: &'static [Self] = &[$(Self::$variant),+];
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($str => Ok(Self::$variant),)+
                    other => Err(Error::$err(other.to_string())),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl From<$name> for CanonicalValue {
            fn from(value: $name) -> Self {
                CanonicalValue::Str(value.as_str().to_string())
            }
        }
    };
}

canonical_tag!(Realm, InvalidRealm, {
    Data => "data",
    Narrative => "narrative",
    System => "system",
    Faculty => "faculty",
    Event => "event",
    Pattern => "pattern",
    Void => "void",
});

canonical_tag!(Horizon, InvalidHorizon, {
    Genesis => "genesis",
    Emergence => "emergence",
    Peak => "peak",
    Decay => "decay",
    Crystallization => "crystallization",
    Archived => "archived",
});

canonical_tag!(Polarity, InvalidPolarity, {
    P0 => "p0",
    P1 => "p1",
    P2 => "p2",
    P3 => "p3",
    Inverted => "inverted",
    Neutral => "neutral",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_canonical_string() {
        for realm in Realm::ALL {
            let s = realm.as_str();
            assert_eq!(Realm::from_str(s).unwrap(), *realm);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(matches!(Realm::from_str("nonsense"), Err(Error::InvalidRealm(_))));
    }
}
