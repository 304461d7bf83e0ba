// Exact decimal fractions in [0, 1].
//
// SAFETY INVARIANTS:
// 1. No floating point ever touches a consensus value
// 2. Multiplication by an integer always rounds toward zero (floor)
// 3. Parsing and display are lossless for up to 18 decimal places

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of decimal places carried by a [`Fraction`].
pub const FRACTION_PRECISION: u32 = 18;

const SCALE: u128 = 10u128.pow(FRACTION_PRECISION);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FractionError {
    #[error("fraction is greater than 1.0")]
    GreaterThanOne,
    #[error("fraction has more than {FRACTION_PRECISION} decimal places")]
    TooPrecise,
    #[error("invalid decimal literal: {0:?}")]
    InvalidLiteral(String),
    #[error("fraction denominator must be > 0")]
    ZeroDenominator,
}

/// Fixed point fraction stored as an integer number of 10^-18 units.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fraction(u128);

impl Fraction {
    pub const ZERO: Fraction = Fraction(0);
    pub const ONE: Fraction = Fraction(SCALE);

    /// Build a fraction from raw 10^-18 units.
    pub fn from_atto(atto: u128) -> Result<Self, FractionError> {
        if atto > SCALE {
            return Err(FractionError::GreaterThanOne);
        }
        Ok(Fraction(atto))
    }

    /// `numerator / denominator`, truncated to 18 decimal places.
    pub fn from_ratio(numerator: u64, denominator: u64) -> Result<Self, FractionError> {
        if denominator == 0 {
            return Err(FractionError::ZeroDenominator);
        }
        if numerator > denominator {
            return Err(FractionError::GreaterThanOne);
        }
        Ok(Fraction(numerator as u128 * SCALE / denominator as u128))
    }

    pub fn as_atto(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `floor(self * amount)`.
    ///
    /// Cannot overflow: `amount <= u64::MAX` and `self <= 10^18` keep the
    /// intermediate product below `2^128`.
    pub fn mul_floor(self, amount: u64) -> u64 {
        (amount as u128 * self.0 / SCALE) as u64
    }

    /// `floor(self * amount)` for token amounts that may exceed `u64`.
    pub fn mul_floor_u128(self, amount: u128) -> u128 {
        match amount.checked_mul(self.0) {
            Some(product) => product / SCALE,
            // Split to stay in range: floor(a*f) = (a/S)*f + floor((a%S)*f / S)
            None => (amount / SCALE) * self.0 + (amount % SCALE) * self.0 / SCALE,
        }
    }
}

impl FromStr for Fraction {
    type Err = FractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let literal = s.trim();
        let invalid = || FractionError::InvalidLiteral(s.to_string());

        let (integral, fractional) = match literal.split_once('.') {
            Some((i, f)) => (i, f),
            None => (literal, ""),
        };
        if integral.is_empty() && fractional.is_empty() {
            return Err(invalid());
        }
        if !integral.bytes().all(|b| b.is_ascii_digit())
            || !fractional.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        if fractional.len() > FRACTION_PRECISION as usize {
            return Err(FractionError::TooPrecise);
        }

        let integral: u128 = if integral.is_empty() {
            0
        } else {
            integral.parse().map_err(|_| FractionError::GreaterThanOne)?
        };
        if integral > 1 {
            return Err(FractionError::GreaterThanOne);
        }

        let mut atto = integral * SCALE;
        if !fractional.is_empty() {
            let digits: u128 = fractional.parse().map_err(|_| invalid())?;
            atto += digits * 10u128.pow(FRACTION_PRECISION - fractional.len() as u32);
        }

        Fraction::from_atto(atto)
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let integral = self.0 / SCALE;
        let fractional = self.0 % SCALE;
        if fractional == 0 {
            return write!(f, "{}.0", integral);
        }
        let digits = format!("{:018}", fractional);
        write!(f, "{}.{}", integral, digits.trim_end_matches('0'))
    }
}

impl fmt::Debug for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fraction({})", self)
    }
}

impl Serialize for Fraction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Fraction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FractionVisitor;

        impl<'de> de::Visitor<'de> for FractionVisitor {
            type Value = Fraction;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("decimal fraction between 0.0 and 1.0")
            }

            fn visit_str<E>(self, value: &str) -> Result<Fraction, E>
            where
                E: de::Error,
            {
                Fraction::from_str(value).map_err(|e| de::Error::custom(e.to_string()))
            }
        }

        deserializer.deserialize_str(FractionVisitor)
    }
}
