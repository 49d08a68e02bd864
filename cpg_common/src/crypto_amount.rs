use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// Number of fractional digits carried by [`CryptoAmount`].
pub const CRYPTO_DECIMALS: u32 = 12;

const SCALE: i64 = 1_000_000_000_000;

//--------------------------------------    CryptoAmount     ---------------------------------------------------------
/// A fixed-point crypto amount with 12 fractional digits, stored as a signed 64-bit count of atomic units.
///
/// The same representation is used for every supported chain; the currency it denominates travels separately on the
/// payment record.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct CryptoAmount(i64);

op!(binary CryptoAmount, Add, add);
op!(binary CryptoAmount, Sub, sub);
op!(inplace CryptoAmount, SubAssign, sub_assign);
op!(unary CryptoAmount, Neg, neg);

impl Mul<i64> for CryptoAmount {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for CryptoAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a crypto amount: {0}")]
pub struct CryptoAmountConversionError(String);

impl From<i64> for CryptoAmount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for CryptoAmount {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for CryptoAmount {}

impl TryFrom<u64> for CryptoAmount {
    type Error = CryptoAmountConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(CryptoAmountConversionError(format!("Value {value} is too large to convert to CryptoAmount")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for CryptoAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / SCALE as u64;
        let frac = abs % SCALE as u64;
        write!(f, "{sign}{whole}.{frac:012}")
    }
}

impl CryptoAmount {
    pub const ZERO: Self = Self(0);

    /// The raw value in atomic units (10^-12 of a whole coin).
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_whole(units: i64) -> Self {
        Self(units * SCALE)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(format!("{}", CryptoAmount::from_whole(2)), "2.000000000000");
        assert_eq!(format!("{}", CryptoAmount::from(1_500_000_000_000)), "1.500000000000");
        assert_eq!(format!("{}", CryptoAmount::from(25)), "0.000000000025");
        assert_eq!(format!("{}", -CryptoAmount::from(25)), "-0.000000000025");
    }

    #[test]
    fn arithmetic() {
        let a = CryptoAmount::from_whole(3);
        let b = CryptoAmount::from_whole(1);
        assert_eq!(a - b, CryptoAmount::from_whole(2));
        assert_eq!(a + b, CryptoAmount::from_whole(4));
        assert_eq!(b * 5, CryptoAmount::from_whole(5));
        assert!(a > b);
        assert!(CryptoAmount::ZERO.is_zero());
        let total: CryptoAmount = [a, b, b].into_iter().sum();
        assert_eq!(total, CryptoAmount::from_whole(5));
    }
}
