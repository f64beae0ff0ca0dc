//! Fixed-point blood volume.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Non-negative volume of blood, stored as whole micro-millilitres.
///
/// Fractional millilitres coming from forms or the database are rounded to the
/// nearest micro-millilitre once, at the boundary. Everything downstream compares
/// integers, so "enough stock" never fails by a rounding hair.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Volume(u64);

impl Volume {
    /// Micro-millilitres per millilitre.
    pub const UNITS_PER_ML: u64 = 1_000_000;

    pub const ZERO: Volume = Volume(0);

    /// Build from whole millilitres.
    pub const fn from_whole_ml(ml: u64) -> Self {
        Self(ml.saturating_mul(Self::UNITS_PER_ML))
    }

    /// Build from raw micro-millilitre units.
    pub const fn from_units(units: u64) -> Self {
        Self(units)
    }

    /// Build from fractional millilitres, rounding to the nearest unit.
    pub fn from_ml(ml: f64) -> DomainResult<Self> {
        if !ml.is_finite() {
            return Err(DomainError::validation(format!("volume must be finite, got {ml}")));
        }
        if ml < 0.0 {
            return Err(DomainError::validation(format!("volume cannot be negative, got {ml}")));
        }
        let units = (ml * Self::UNITS_PER_ML as f64).round();
        if units > u64::MAX as f64 {
            return Err(DomainError::validation(format!("volume out of range: {ml}")));
        }
        Ok(Self(units as u64))
    }

    pub const fn units(self) -> u64 {
        self.0
    }

    pub fn as_ml(self) -> f64 {
        self.0 as f64 / Self::UNITS_PER_ML as f64
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Difference clamped at zero.
    pub const fn saturating_sub(self, rhs: Volume) -> Volume {
        Volume(self.0.saturating_sub(rhs.0))
    }

    pub const fn saturating_add(self, rhs: Volume) -> Volume {
        Volume(self.0.saturating_add(rhs.0))
    }

    pub fn checked_add(self, rhs: Volume) -> Option<Volume> {
        self.0.checked_add(rhs.0).map(Volume)
    }
}

impl ValueObject for Volume {}

impl core::fmt::Display for Volume {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2} ml", self.as_ml())
    }
}

impl core::iter::Sum for Volume {
    fn sum<I: Iterator<Item = Volume>>(iter: I) -> Self {
        iter.fold(Volume::ZERO, Volume::saturating_add)
    }
}

impl TryFrom<f64> for Volume {
    type Error = DomainError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Volume::from_ml(value)
    }
}

impl From<Volume> for f64 {
    fn from(value: Volume) -> Self {
        value.as_ml()
    }
}
