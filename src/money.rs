use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// A monetary amount in minor units (cents) of the settlement currency.
///
/// Signed, so the same type carries both recorded amounts and net positions.
/// On the wire it is a plain JSON number in major units (`120.5`); conversion
/// rejects anything that does not land on a whole cent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

// Largest amount accepted from the wire, in cents. Keeps the f64 round trip
// exact and leaves headroom for i128-free sums.
const MAX_CENTS: f64 = 1e13;

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor_units(cents: i64) -> Self {
        Money(cents)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    /// Converts a major-unit amount (`120.5`) into cents.
    ///
    /// Returns `None` for non-finite values, values beyond the supported
    /// range, and values carrying sub-cent precision.
    pub fn try_from_major(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let cents = value * 100.0;
        let rounded = cents.round();
        if (cents - rounded).abs() > 1e-4 || rounded.abs() >= MAX_CENTS {
            return None;
        }
        Some(Money(rounded as i64))
    }

    pub fn to_major(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `self × numerator / denominator`, rounded half away from zero to the
    /// nearest cent. `None` when the denominator is not positive.
    pub fn apportion(self, numerator: Money, denominator: Money) -> Option<Money> {
        let den = denominator.0 as i128;
        if den <= 0 {
            return None;
        }
        let num = self.0 as i128 * numerator.0 as i128;
        let half = den / 2;
        let cents = if num >= 0 {
            (num + half) / den
        } else {
            (num - half) / den
        };
        Some(Money(cents as i64))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_major())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Money::try_from_major(value).ok_or_else(|| {
            de::Error::custom(format!("{value} is not a whole number of cents"))
        })
    }
}
