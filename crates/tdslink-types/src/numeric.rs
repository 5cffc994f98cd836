//! DECIMAL/NUMERIC magnitude arithmetic.
//!
//! On the wire a decimal is a sign byte plus a little-endian unsigned
//! magnitude whose width is fixed by the column precision. Rescaling between
//! a value's scale and the column's scale is done on the 128-bit magnitude
//! by repeated multiplication or truncating division by ten.

use rust_decimal::Decimal;
use tdslink_protocol::TypeId;

use crate::error::TypeError;

/// Powers of ten up to the 38-digit ceiling of DECIMAL.
const POW10: [u128; 39] = {
    let mut table = [1u128; 39];
    let mut i = 1;
    while i < 39 {
        table[i] = table[i - 1] * 10;
        i += 1;
    }
    table
};

/// 10^precision, the exclusive magnitude bound for a column.
#[must_use]
pub fn magnitude_bound(precision: u8) -> u128 {
    POW10[precision.min(38) as usize]
}

/// Rescale `magnitude` from `from_scale` to `to_scale`, then range-check it
/// against `precision`.
///
/// Scaling up multiplies by ten per step and fails on overflow; scaling down
/// divides by ten per step, truncating toward zero.
pub fn rescale_magnitude(
    mut magnitude: u128,
    from_scale: u8,
    to_scale: u8,
    precision: u8,
    column: &str,
) -> Result<u128, TypeError> {
    if from_scale < to_scale {
        for _ in from_scale..to_scale {
            magnitude = magnitude
                .checked_mul(10)
                .ok_or_else(|| TypeError::out_of_range(column, "DECIMAL"))?;
        }
    } else {
        for _ in to_scale..from_scale {
            magnitude /= 10;
        }
    }

    if magnitude >= magnitude_bound(precision) {
        return Err(TypeError::out_of_range(column, "DECIMAL"));
    }

    Ok(magnitude)
}

/// Split a [`Decimal`] into the wire sign byte and a magnitude rescaled to
/// the column's precision and scale.
pub fn decimal_to_wire(
    value: &Decimal,
    precision: u8,
    scale: u8,
    column: &str,
) -> Result<(u8, u128), TypeError> {
    let sign = u8::from(!value.is_sign_negative());
    let magnitude = rescale_magnitude(
        value.mantissa().unsigned_abs(),
        value.scale() as u8,
        scale,
        precision,
        column,
    )?;
    Ok((sign, magnitude))
}

/// Reassemble a [`Decimal`] from the wire sign byte and little-endian
/// magnitude bytes.
pub fn wire_to_decimal(sign: u8, magnitude: &[u8], scale: u8) -> Result<Decimal, TypeError> {
    if magnitude.len() > 16 {
        return Err(TypeError::InvalidDecimal(format!(
            "magnitude of {} bytes",
            magnitude.len()
        )));
    }

    let mut le = [0u8; 16];
    le[..magnitude.len()].copy_from_slice(magnitude);
    let unsigned = u128::from_le_bytes(le);

    if unsigned > i128::MAX as u128 {
        return Err(TypeError::InvalidDecimal("magnitude exceeds i128".into()));
    }

    let mantissa = if sign == 0 {
        -(unsigned as i128)
    } else {
        unsigned as i128
    };

    Decimal::try_from_i128_with_scale(mantissa, u32::from(scale))
        .map_err(|e| TypeError::InvalidDecimal(e.to_string()))
}

/// Convert a positive double into a decimal magnitude for the given scale,
/// using the IEEE-754 representation directly: scale the value by
/// 10^scale, take the 52-bit fraction with the implicit leading bit, and
/// shift by the unbiased exponent (bias 0x433 once the fraction is treated
/// as an integer).
pub fn double_to_magnitude(
    value: f64,
    precision: u8,
    scale: u8,
    column: &str,
) -> Result<(u8, u128), TypeError> {
    if !value.is_finite() {
        return Err(TypeError::InvalidDecimal(format!("{value} is not finite")));
    }

    let sign = u8::from(value >= 0.0);
    let scaled = value.abs() * POW10[scale.min(38) as usize] as f64;
    if scaled == 0.0 {
        return Ok((sign, 0));
    }

    let bits = scaled.to_bits();
    let exp = (bits >> 52) & 0x7FF;
    let frac = bits & 0x000F_FFFF_FFFF_FFFF;

    let mut magnitude = u128::from(frac | 0x0010_0000_0000_0000);

    if exp > 0x433 {
        let shift = (exp - 0x433) as u32;
        if shift > magnitude.leading_zeros() {
            return Err(TypeError::out_of_range(column, "DECIMAL"));
        }
        magnitude <<= shift;
    } else {
        let shift = 0x433 - exp;
        magnitude = if shift >= 128 { 0 } else { magnitude >> shift };
    }

    if magnitude >= magnitude_bound(precision) {
        return Err(TypeError::out_of_range(column, "DECIMAL"));
    }

    Ok((sign, magnitude))
}

/// Serialize a magnitude as the column's little-endian wire width.
#[must_use]
pub fn magnitude_bytes(magnitude: u128, precision: u8) -> Vec<u8> {
    let width = TypeId::decimal_width(precision);
    magnitude.to_le_bytes()[..width].to_vec()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn rescale_up_and_down() {
        // 123.45 at scale 2 -> scale 5 multiplies by 1000.
        assert_eq!(rescale_magnitude(12345, 2, 5, 18, "c").unwrap(), 12_345_000);
        // scale 5 -> scale 2 truncates.
        assert_eq!(rescale_magnitude(12_345_678, 5, 2, 18, "c").unwrap(), 12_345);
    }

    #[test]
    fn rescale_checks_precision() {
        // 1000 does not fit precision 3.
        let err = rescale_magnitude(100, 1, 2, 3, "amount").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("amount"), "{text}");
    }

    #[test]
    fn decimal_wire_roundtrip_across_precisions() {
        for &(precision, scale) in &[(5u8, 2u8), (9, 0), (19, 4), (28, 10), (38, 10)] {
            let value = Decimal::from_str("123.4500").unwrap();
            let (sign, magnitude) = decimal_to_wire(&value, precision, scale, "c").unwrap();
            let bytes = magnitude_bytes(magnitude, precision);
            assert_eq!(bytes.len(), TypeId::decimal_width(precision));

            let back = wire_to_decimal(sign, &bytes, scale).unwrap();
            assert_eq!(back, value.round_dp(u32::from(scale)));
        }
    }

    #[test]
    fn negative_decimal_sign_byte() {
        let value = Decimal::from_str("-7.5").unwrap();
        let (sign, magnitude) = decimal_to_wire(&value, 9, 1, "c").unwrap();
        assert_eq!(sign, 0);
        assert_eq!(magnitude, 75);

        let back = wire_to_decimal(sign, &magnitude_bytes(magnitude, 9), 1).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn large_precision_value_roundtrips() {
        let value = Decimal::from_str("1234567890.1234567890").unwrap();
        let (sign, magnitude) = decimal_to_wire(&value, 38, 10, "c").unwrap();
        let back = wire_to_decimal(sign, &magnitude_bytes(magnitude, 38), 10).unwrap();
        assert_eq!(back.to_string(), "1234567890.1234567890");
    }

    #[test]
    fn double_magnitude_exact_integers() {
        let (sign, magnitude) = double_to_magnitude(42.0, 18, 0, "c").unwrap();
        assert_eq!((sign, magnitude), (1, 42));

        let (sign, magnitude) = double_to_magnitude(-1.5, 18, 2, "c").unwrap();
        assert_eq!((sign, magnitude), (0, 150));
    }

    #[test]
    fn double_magnitude_zero() {
        assert_eq!(double_to_magnitude(0.0, 18, 4, "c").unwrap(), (1, 0));
    }

    #[test]
    fn double_magnitude_large_value() {
        let (_, magnitude) = double_to_magnitude(1e20, 38, 0, "c").unwrap();
        // 1e20 is exactly representable as a double.
        assert_eq!(magnitude, 100_000_000_000_000_000_000);
    }

    #[test]
    fn double_magnitude_overflow_names_column() {
        let err = double_to_magnitude(1e30, 9, 0, "price").unwrap_err();
        assert!(err.to_string().contains("price"));
    }
}
