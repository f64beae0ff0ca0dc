//! ABO/Rh blood types.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// One of the eight ABO/Rh combinations.
///
/// Serialized as its conventional label (`"O+"`, `"AB-"`, ...). Parsing also
/// accepts the typographic minus (`U+2212`) that shows up in imported sheets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(u8)]
pub enum BloodType {
    OPos = 0,
    ONeg = 1,
    APos = 2,
    ANeg = 3,
    BPos = 4,
    BNeg = 5,
    AbPos = 6,
    AbNeg = 7,
}

impl BloodType {
    /// Every blood type, indexed by discriminant.
    pub const ALL: [BloodType; 8] = [
        BloodType::OPos,
        BloodType::ONeg,
        BloodType::APos,
        BloodType::ANeg,
        BloodType::BPos,
        BloodType::BNeg,
        BloodType::AbPos,
        BloodType::AbNeg,
    ];

    pub fn label(self) -> &'static str {
        match self {
            BloodType::OPos => "O+",
            BloodType::ONeg => "O-",
            BloodType::APos => "A+",
            BloodType::ANeg => "A-",
            BloodType::BPos => "B+",
            BloodType::BNeg => "B-",
            BloodType::AbPos => "AB+",
            BloodType::AbNeg => "AB-",
        }
    }

    /// Stable position of this type in [`BloodType::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// A one-element `'static` slice holding this type.
    pub fn as_singleton(self) -> &'static [BloodType] {
        core::slice::from_ref(&ALL_TYPES[self.index()])
    }
}

static ALL_TYPES: [BloodType; 8] = BloodType::ALL;

impl ValueObject for BloodType {}

impl core::fmt::Display for BloodType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BloodType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('\u{2212}', "-").to_ascii_uppercase();
        BloodType::ALL
            .into_iter()
            .find(|t| t.label() == normalized)
            .ok_or_else(|| DomainError::unknown_blood_type(s))
    }
}

impl TryFrom<String> for BloodType {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BloodType> for String {
    fn from(value: BloodType) -> Self {
        value.label().to_string()
    }
}
