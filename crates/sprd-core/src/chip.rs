//! Known SoC families.
//!
//! Purely informational: nothing in the protocol depends on the family, but
//! it is recorded in configs and logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChipFamily {
    Iwhale2,
    Isharkl2,
    Sharklj1,
    Sharkle,
    Pike2,
    Sharkl3,
    Sharkl5,
    Sharkl5pro,
    Roc1,
}

impl ChipFamily {
    pub const ALL: [ChipFamily; 9] = [
        ChipFamily::Iwhale2,
        ChipFamily::Isharkl2,
        ChipFamily::Sharklj1,
        ChipFamily::Sharkle,
        ChipFamily::Pike2,
        ChipFamily::Sharkl3,
        ChipFamily::Sharkl5,
        ChipFamily::Sharkl5pro,
        ChipFamily::Roc1,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChipFamily::Iwhale2 => "IWHALE2",
            ChipFamily::Isharkl2 => "ISHARKL2",
            ChipFamily::Sharklj1 => "SHARKLJ1",
            ChipFamily::Sharkle => "SHARKLE",
            ChipFamily::Pike2 => "PIKE2",
            ChipFamily::Sharkl3 => "SHARKL3",
            ChipFamily::Sharkl5 => "SHARKL5",
            ChipFamily::Sharkl5pro => "SHARKL5PRO",
            ChipFamily::Roc1 => "ROC1",
        }
    }
}

impl fmt::Display for ChipFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown chip family: {0}")]
pub struct UnknownChipFamily(pub String);

impl FromStr for ChipFamily {
    type Err = UnknownChipFamily;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChipFamily::ALL
            .into_iter()
            .find(|family| family.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownChipFamily(s.to_string()))
    }
}
