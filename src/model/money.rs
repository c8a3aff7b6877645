//! Exact fixed-point monetary values.
//!
//! Monetary fields must round-trip through the archive's tabular text
//! representation without drift, so they are never held as binary
//! floating point. A `Money` is a scaled integer: `mantissa` minor
//! units at `scale` decimal digits. `"129.99"` parses to
//! `{ mantissa: 12999, scale: 2 }` and prints back byte-identical.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PackboxError;

/// Maximum supported fraction digits. Enough for sub-cent prices
/// without risking `i64` overflow on realistic amounts.
pub const MAX_SCALE: u8 = 6;

/// An exact decimal amount (currency-agnostic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Money {
    mantissa: i64,
    scale: u8,
}

impl Money {
    /// Construct from a raw mantissa and scale.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `scale` exceeds [`MAX_SCALE`].
    pub fn new(mantissa: i64, scale: u8) -> Result<Self, PackboxError> {
        if scale > MAX_SCALE {
            return Err(PackboxError::validation(
                "money",
                format!("scale {scale} exceeds maximum {MAX_SCALE}"),
            ));
        }
        Ok(Self { mantissa, scale })
    }

    /// Whole-unit amount with no fraction digits.
    #[must_use]
    pub const fn from_units(units: i64) -> Self {
        Self {
            mantissa: units,
            scale: 0,
        }
    }

    #[must_use]
    pub const fn mantissa(&self) -> i64 {
        self.mantissa
    }

    #[must_use]
    pub const fn scale(&self) -> u8 {
        self.scale
    }

    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.mantissa < 0
    }

    /// Value equality ignoring trailing zeros: `10.50 == 10.5`.
    #[must_use]
    pub fn value_eq(&self, other: &Self) -> bool {
        let (a, b) = if self.scale >= other.scale {
            (*self, *other)
        } else {
            (*other, *self)
        };
        let diff = u32::from(a.scale - b.scale);
        10_i64
            .checked_pow(diff)
            .and_then(|f| b.mantissa.checked_mul(f))
            .is_some_and(|rescaled| rescaled == a.mantissa)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let abs = self.mantissa.unsigned_abs();
        let divisor = 10_u64.pow(u32::from(self.scale));
        let whole = abs / divisor;
        let frac = abs % divisor;
        write!(
            f,
            "{sign}{whole}.{frac:0width$}",
            width = self.scale as usize
        )
    }
}

impl FromStr for Money {
    type Err = PackboxError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let invalid = || PackboxError::validation("money", format!("invalid amount '{input}'"));

        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let scale = u8::try_from(frac.len()).map_err(|_| invalid())?;
        if scale > MAX_SCALE {
            return Err(PackboxError::validation(
                "money",
                format!("'{input}' has more than {MAX_SCALE} fraction digits"),
            ));
        }

        let whole_part: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac_part: i64 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| invalid())?
        };

        let mantissa = whole_part
            .checked_mul(10_i64.pow(u32::from(scale)))
            .and_then(|m| m.checked_add(frac_part))
            .ok_or_else(invalid)?;
        let mantissa = if negative { -mantissa } else { mantissa };

        Ok(Self { mantissa, scale })
    }
}

impl TryFrom<String> for Money {
    type Error = PackboxError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Money> for String {
    fn from(value: Money) -> Self {
        value.to_string()
    }
}
