//! Compile-time unit safety for feeder quantities.
//!
//! The DistFlow equations are only loss-consistent under one unit contract:
//!
//! | Quantity            | Unit  | Type          |
//! |---------------------|-------|---------------|
//! | Voltage magnitude   | kV    | [`Kilovolts`] |
//! | Active power        | kW    | [`Kilowatts`] |
//! | Reactive power      | kVAr  | [`Kilovars`]  |
//! | Source impedance    | Ω     | [`Ohms`]      |
//! | Model impedance     | kΩ    | [`Kiloohms`]  |
//! | Current magnitude   | A     | [`Amperes`]   |
//!
//! With V in kV and impedance in kΩ, `kΩ · kW = kV²` so the voltage-drop terms
//! share units with `V²`, and `kΩ · A² = kW` so `RM · I²` is a loss in kW.
//! Input tables carry impedance in Ω; the only conversion is
//! [`Ohms::to_kiloohms`], which divides by [`OHMS_PER_KILOOHM`].
//!
//! ```
//! use distflow_core::units::{Kilowatts, Ohms};
//!
//! let total = Kilowatts(10.0) + Kilowatts(2.5);
//! assert_eq!(total.value(), 12.5);
//! assert_eq!(Ohms(1.0).to_kiloohms().value(), 0.001);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Source impedance (Ω) per model impedance unit (kΩ).
pub const OHMS_PER_KILOOHM: f64 = 1000.0;

macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }

        impl std::iter::Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }

        impl<'a> std::iter::Sum<&'a $type> for $type {
            fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }
    };
}

// =============================================================================
// Power Units
// =============================================================================

/// Active power in kilowatts (kW)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kilowatts(pub f64);

impl_unit_ops!(Kilowatts, "kW");

/// Reactive power in kilovolt-amperes reactive (kVAr)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kilovars(pub f64);

impl_unit_ops!(Kilovars, "kVAr");

// =============================================================================
// Voltage and Current
// =============================================================================

/// Voltage magnitude in kilovolts (kV)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kilovolts(pub f64);

impl_unit_ops!(Kilovolts, "kV");

/// Current magnitude in amperes (A)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Amperes(pub f64);

impl_unit_ops!(Amperes, "A");

// =============================================================================
// Impedance
// =============================================================================

/// Impedance as it appears in the line table (Ω)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Ohms(pub f64);

impl_unit_ops!(Ohms, "Ω");

/// Impedance on the model basis (kΩ)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kiloohms(pub f64);

impl_unit_ops!(Kiloohms, "kΩ");

impl Ohms {
    /// Scale a source impedance onto the model basis.
    #[inline]
    pub fn to_kiloohms(self) -> Kiloohms {
        Kiloohms(self.0 / OHMS_PER_KILOOHM)
    }
}

impl Kiloohms {
    #[inline]
    pub fn to_ohms(self) -> Ohms {
        Ohms(self.0 * OHMS_PER_KILOOHM)
    }
}
