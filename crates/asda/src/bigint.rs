//! Arbitrary-precision integers with a small-integer fast path.
//!
//! `Value::SmallInt(i64)` plays the tagged-pointer role a less safe language
//! would pack into the low bits of an object pointer; `HeapData::Big(BigInt)`
//! plays the heap-allocated role; this module is where the two meet — every
//! arithmetic op attempts the inline fast path first and only promotes to
//! `num_bigint::BigInt` when the small range can't hold the result.

use std::cmp::Ordering;

use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;

use crate::heap::{Heap, HeapData, Value};

/// Upper bound of the small-integer range: `min((INTPTR_MAX-1)/2,
/// -(INTPTR_MIN/2))`, computed here for `i64`.
pub const SMALL_MAX: i64 = (i64::MAX - 1) / 2;
/// Lower bound of the small-integer range. Chosen so `-n` of any small `n`
/// is also small.
pub const SMALL_MIN: i64 = -SMALL_MAX;

/// Builds an integer value from a little-endian magnitude and sign flag,
/// returned in tagged (small) form whenever it fits.
#[must_use]
pub fn from_bytes(magnitude_le: &[u8], negative: bool, heap: &mut Heap) -> Value {
    let sign = if negative { Sign::Minus } else { Sign::Plus };
    let big = BigInt::from_bytes_le(sign, magnitude_le);
    from_big(big, heap)
}

fn from_big(big: BigInt, heap: &mut Heap) -> Value {
    if let Some(small) = to_small(&big) {
        Value::SmallInt(small)
    } else {
        Value::Object(heap.allocate(HeapData::Big(big)))
    }
}

fn to_small(big: &BigInt) -> Option<i64> {
    let n = big.to_i64()?;
    (SMALL_MIN..=SMALL_MAX).contains(&n).then_some(n)
}

fn as_big(value: Value, heap: &Heap) -> BigInt {
    match value {
        Value::SmallInt(n) => BigInt::from(n),
        Value::Object(id) => match heap.get(id) {
            HeapData::Big(b) => b.clone(),
            other => panic!("bigint::as_big: not an integer value: {}", other.type_name()),
        },
        Value::Bool(_) => panic!("bigint::as_big: not an integer value: bool"),
    }
}

/// `INT_ADD`: small + small is attempted inline first; only a
/// would-overflow result promotes to big.
#[must_use]
pub fn add(a: Value, b: Value, heap: &mut Heap) -> Value {
    if let (Value::SmallInt(x), Value::SmallInt(y)) = (a, b) {
        if let Some(sum) = x.checked_add(y) {
            if (SMALL_MIN..=SMALL_MAX).contains(&sum) {
                return Value::SmallInt(sum);
            }
        }
    }
    from_big(as_big(a, heap) + as_big(b, heap), heap)
}

#[must_use]
pub fn sub(a: Value, b: Value, heap: &mut Heap) -> Value {
    if let (Value::SmallInt(x), Value::SmallInt(y)) = (a, b) {
        if let Some(diff) = x.checked_sub(y) {
            if (SMALL_MIN..=SMALL_MAX).contains(&diff) {
                return Value::SmallInt(diff);
            }
        }
    }
    from_big(as_big(a, heap) - as_big(b, heap), heap)
}

#[must_use]
pub fn mul(a: Value, b: Value, heap: &mut Heap) -> Value {
    if let (Value::SmallInt(x), Value::SmallInt(y)) = (a, b) {
        if let Some(prod) = x.checked_mul(y) {
            if (SMALL_MIN..=SMALL_MAX).contains(&prod) {
                return Value::SmallInt(prod);
            }
        }
    }
    from_big(as_big(a, heap) * as_big(b, heap), heap)
}

/// Negation. The small range is symmetric by construction, so negating a
/// small value never needs to promote.
#[must_use]
pub fn neg(a: Value, heap: &mut Heap) -> Value {
    if let Value::SmallInt(x) = a {
        return Value::SmallInt(-x);
    }
    from_big(-as_big(a, heap), heap)
}

/// Three-way comparison. Two tagged small values compare directly; anything
/// involving a heap value goes through the big-integer backend.
#[must_use]
pub fn compare(a: Value, b: Value, heap: &Heap) -> Ordering {
    if let (Value::SmallInt(x), Value::SmallInt(y)) = (a, b) {
        return x.cmp(&y);
    }
    as_big(a, heap).cmp(&as_big(b, heap))
}

#[must_use]
pub fn to_decimal_string(a: Value, heap: &Heap) -> String {
    match a {
        Value::SmallInt(n) => n.to_string(),
        Value::Object(id) => match heap.get(id) {
            HeapData::Big(b) => b.to_string(),
            other => panic!("bigint::to_decimal_string: not an integer value: {}", other.type_name()),
        },
        Value::Bool(_) => panic!("bigint::to_decimal_string: not an integer value: bool"),
    }
}
