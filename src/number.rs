// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::cmp::Ordering;
use core::fmt::{self, Debug, Display, Formatter};
use core::str::FromStr;

use serde::ser::Serializer;
use serde::Serialize;

const F64_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0; // 2^53
const I128_BOUND: f64 = 170_141_183_460_469_231_731_687_303_715_884_105_728.0; // 2^127

/// Numeric scalar of a document.
///
/// Integers keep their exact representation; all variants compare numerically,
/// so `7`, `7u64` and `7.0` are equal.
#[derive(Clone, Copy)]
pub enum Number {
    UInt(u64),
    Int(i64),
    Float(f64),
}

impl Number {
    fn to_i128(self) -> Option<i128> {
        match self {
            Number::UInt(v) => Some(v as i128),
            Number::Int(v) => Some(v as i128),
            Number::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 && f.abs() <= F64_SAFE_INTEGER {
                    Some(f as i128)
                } else {
                    None
                }
            }
        }
    }

    fn to_f64_lossy(self) -> f64 {
        match self {
            Number::UInt(v) => v as f64,
            Number::Int(v) => v as f64,
            Number::Float(f) => f,
        }
    }

    pub fn format_decimal(&self) -> String {
        match self.to_i128() {
            Some(i) => i.to_string(),
            None => match self {
                Number::Float(f) if f.is_nan() => "NaN".to_owned(),
                Number::Float(f) if f.is_infinite() && *f > 0.0 => "Infinity".to_owned(),
                Number::Float(f) if f.is_infinite() => "-Infinity".to_owned(),
                _ => self.to_f64_lossy().to_string(),
            },
        }
    }
}

impl Debug for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_decimal())
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_decimal())
    }
}

impl Serialize for Number {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match (self, self.to_i128()) {
            (Number::UInt(v), _) => serializer.serialize_u64(*v),
            (Number::Int(v), _) => serializer.serialize_i64(*v),
            // Integral floats are written without a fractional part.
            (Number::Float(_), Some(i)) if i >= 0 => serializer.serialize_u64(i as u64),
            (Number::Float(_), Some(i)) => serializer.serialize_i64(i as i64),
            (Number::Float(f), None) => serializer.serialize_f64(*f),
        }
    }
}

impl From<u64> for Number {
    fn from(value: u64) -> Self {
        Number::UInt(value)
    }
}

impl From<usize> for Number {
    fn from(value: usize) -> Self {
        Number::UInt(value as u64)
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        if value >= 0 {
            Number::UInt(value as u64)
        } else {
            Number::Int(value)
        }
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number::from(i64::from(value))
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Float(value)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseNumberError;

impl Display for ParseNumberError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("invalid number")
    }
}

impl std::error::Error for ParseNumberError {}

impl FromStr for Number {
    type Err = ParseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseNumberError);
        }

        let is_integer_literal =
            !trimmed.contains('.') && !trimmed.contains('e') && !trimmed.contains('E');
        if is_integer_literal {
            if let Ok(u) = trimmed.parse::<u64>() {
                return Ok(Number::UInt(u));
            }
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(Number::Int(i));
            }
        }

        match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(Number::Float(f)),
            _ => Err(ParseNumberError),
        }
    }
}

/// Exact comparison of an integer against a float. NaN sorts above every
/// number.
fn cmp_int_float(i: i128, f: f64) -> Ordering {
    if f.is_nan() || f >= I128_BOUND {
        return Ordering::Less;
    }
    if f <= -I128_BOUND {
        return Ordering::Greater;
    }
    // Within the bound, an integral float converts exactly.
    let floor = f.floor();
    match i.cmp(&(floor as i128)) {
        Ordering::Equal if floor == f => Ordering::Equal,
        Ordering::Equal => Ordering::Less,
        ord => ord,
    }
}

fn cmp_floats(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        use Number::*;
        match (*self, *other) {
            (UInt(a), UInt(b)) => a.cmp(&b),
            (Int(a), Int(b)) => a.cmp(&b),
            (UInt(a), Int(b)) => i128::from(a).cmp(&i128::from(b)),
            (Int(a), UInt(b)) => i128::from(a).cmp(&i128::from(b)),
            (UInt(a), Float(b)) => cmp_int_float(i128::from(a), b),
            (Int(a), Float(b)) => cmp_int_float(i128::from(a), b),
            (Float(a), UInt(b)) => cmp_int_float(i128::from(b), a).reverse(),
            (Float(a), Int(b)) => cmp_int_float(i128::from(b), a).reverse(),
            (Float(a), Float(b)) => cmp_floats(a, b),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
