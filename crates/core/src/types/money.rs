//! Integer-cent money amounts.
//!
//! All monetary values in the engine are whole cents in the store currency,
//! matching what the payment processor reports (`amount_total`,
//! `unit_amount`, charge amounts). Keeping the representation integral makes
//! the charge-matching fallback in the refund path an exact equality check.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

/// A monetary amount in whole cents.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cents(i64);

impl Cents {
    /// Zero cents.
    pub const ZERO: Self = Self(0);

    /// Create an amount from whole cents.
    #[must_use]
    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    /// Get the raw cent count.
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Multiply by a quantity, saturating on overflow.
    #[must_use]
    pub const fn times(&self, quantity: i64) -> Self {
        Self(self.0.saturating_mul(quantity))
    }

    /// Difference that never goes below zero (shipping = total - subtotal).
    #[must_use]
    pub const fn saturating_sub(&self, other: Self) -> Self {
        let diff = self.0 - other.0;
        if diff < 0 { Self::ZERO } else { Self(diff) }
    }
}

impl Add for Cents {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Cents {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Cents {
    /// Formats as a dollar amount, e.g. `3500` -> `$35.00`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

impl From<i64> for Cents {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl From<Cents> for i64 {
    fn from(cents: Cents) -> Self {
        cents.0
    }
}

// SQLx support (with postgres feature): stored as BIGINT
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Cents {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Cents {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let cents = <i64 as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(cents))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Cents {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <i64 as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let subtotal = Cents::new(1200).times(2) + Cents::new(500);
        assert_eq!(subtotal, Cents::new(2900));
        assert_eq!(Cents::new(3500) - Cents::new(2900), Cents::new(600));
    }

    #[test]
    fn test_saturating_sub_floors_at_zero() {
        assert_eq!(Cents::new(100).saturating_sub(Cents::new(300)), Cents::ZERO);
    }

    #[test]
    fn test_sub_saturates_at_extremes() {
        assert_eq!(Cents::new(100) - Cents::new(300), Cents::new(-200));
        assert_eq!(Cents::new(i64::MIN) - Cents::new(1), Cents::new(i64::MIN));
    }

    #[test]
    fn test_sum() {
        let total: Cents = [Cents::new(100), Cents::new(250)].into_iter().sum();
        assert_eq!(total, Cents::new(350));
    }

    #[test]
    fn test_display() {
        assert_eq!(Cents::new(3500).to_string(), "$35.00");
        assert_eq!(Cents::new(5).to_string(), "$0.05");
        assert_eq!(Cents::new(-125).to_string(), "-$1.25");
    }
}
