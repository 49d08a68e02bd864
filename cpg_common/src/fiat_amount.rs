use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;

use crate::op;

//--------------------------------------     FiatAmount      ---------------------------------------------------------
/// A fiat amount with 2 fractional digits, stored as a signed 64-bit count of cents.
///
/// The currency it denominates is not part of the value; it travels separately (e.g. `fiat_currency` on a payment).
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct FiatAmount(i64);

op!(binary FiatAmount, Add, add);
op!(binary FiatAmount, Sub, sub);
op!(inplace FiatAmount, SubAssign, sub_assign);
op!(unary FiatAmount, Neg, neg);

impl Sum for FiatAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<i64> for FiatAmount {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl Display for FiatAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl FiatAmount {
    pub const ZERO: Self = Self(0);

    /// The raw value in cents.
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}
