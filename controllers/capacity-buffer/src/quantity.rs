//! Kubernetes resource quantity arithmetic
//!
//! Quantities are parsed into milli-units held in an `i128`. The milli
//! scale keeps full precision for milli-CPU values while leaving ample
//! headroom for memory sizes (8Ei in milli-units is still well inside
//! `i128` range), so a single integer representation serves both the
//! translator clamping and the quota allocator's floor division.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::error::ControllerError;

const MILLI: i128 = 1000;

/// Parse a Kubernetes quantity string into milli-units.
///
/// Supports plain decimals, the `m` milli suffix, decimal SI suffixes
/// (`k`, `M`, `G`, `T`, `P`, `E`), binary suffixes (`Ki` .. `Ei`) and
/// scientific notation (`1e3`). The result truncates toward zero.
pub fn parse_quantity_milli(value: &str) -> Result<i128, ControllerError> {
    let invalid = |reason: &str| ControllerError::InvalidQuantity {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty string"));
    }
    let (sign, rest) = match trimmed.strip_prefix('-') {
        Some(r) => (-1i128, r),
        None => (1i128, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let split = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(rest.len());
    let (mantissa, suffix) = rest.split_at(split);

    // Multiplier expressed as a fraction so the milli suffix and negative
    // exponents stay in integer arithmetic.
    let (mul_num, mul_den): (i128, i128) = match suffix {
        "" => (1, 1),
        "m" => (1, 1000),
        "k" => (1_000, 1),
        "M" => (1_000_000, 1),
        "G" => (1_000_000_000, 1),
        "T" => (1_000_000_000_000, 1),
        "P" => (1_000_000_000_000_000, 1),
        "E" => (1_000_000_000_000_000_000, 1),
        "Ki" => (1 << 10, 1),
        "Mi" => (1 << 20, 1),
        "Gi" => (1 << 30, 1),
        "Ti" => (1 << 40, 1),
        "Pi" => (1 << 50, 1),
        "Ei" => (1 << 60, 1),
        s if s.starts_with('e') || s.starts_with('E') => {
            let exp: i32 = s[1..]
                .parse()
                .map_err(|_| invalid("invalid exponent"))?;
            if !(-18..=18).contains(&exp) {
                return Err(invalid("exponent out of range"));
            }
            if exp >= 0 {
                (10i128.pow(exp as u32), 1)
            } else {
                (1, 10i128.pow(exp.unsigned_abs()))
            }
        }
        _ => return Err(invalid("unknown suffix")),
    };

    let mut parts = mantissa.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid("missing digits"));
    }
    if frac_part.len() > 18 {
        return Err(invalid("fractional part too long"));
    }
    let int_value: i128 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| invalid("invalid digits"))?
    };
    let frac_value: i128 = if frac_part.is_empty() {
        0
    } else {
        frac_part.parse().map_err(|_| invalid("invalid digits"))?
    };
    let frac_den = 10i128.pow(frac_part.len() as u32);

    let numer = (int_value
        .checked_mul(frac_den)
        .and_then(|v| v.checked_add(frac_value))
        .and_then(|v| v.checked_mul(mul_num))
        .and_then(|v| v.checked_mul(MILLI))
        .ok_or_else(|| invalid("value out of range"))?)
        * sign;
    Ok(numer / (frac_den * mul_den))
}

/// Parse a typed `Quantity` into milli-units.
pub fn quantity_milli(quantity: &Quantity) -> Result<i128, ControllerError> {
    parse_quantity_milli(&quantity.0)
}

/// Render a milli-scaled value back into a quantity string.
pub fn format_milli(value: i128) -> String {
    if value % 1000 == 0 {
        (value / 1000).to_string()
    } else {
        format!("{value}m")
    }
}

/// Floor division of two milli-scaled values. Used for "how many pods fit"
/// computations; callers guarantee `divisor > 0`.
pub fn milli_div_floor(dividend: i128, divisor: i128) -> i128 {
    debug_assert!(divisor > 0);
    dividend.div_euclid(divisor)
}

/// Clamp a replica count into the i32 range expected by the CRD status.
pub fn clamp_replicas(value: i128) -> i32 {
    if value > i128::from(i32::MAX) {
        i32::MAX
    } else if value < i128::from(i32::MIN) {
        i32::MIN
    } else {
        value as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_milli() {
        assert_eq!(parse_quantity_milli("1").unwrap(), 1000);
        assert_eq!(parse_quantity_milli("100m").unwrap(), 100);
        assert_eq!(parse_quantity_milli("1.5").unwrap(), 1500);
        assert_eq!(parse_quantity_milli("0").unwrap(), 0);
    }

    #[test]
    fn parses_binary_and_decimal_suffixes() {
        assert_eq!(parse_quantity_milli("4Gi").unwrap(), 4 * (1 << 30) * 1000);
        assert_eq!(parse_quantity_milli("9Gi").unwrap(), 9 * (1 << 30) * 1000);
        assert_eq!(parse_quantity_milli("2k").unwrap(), 2_000_000);
        assert_eq!(parse_quantity_milli("1M").unwrap(), 1_000_000_000);
        assert_eq!(parse_quantity_milli("1.5Gi").unwrap(), 3 * (1 << 29) * 1000);
    }

    #[test]
    fn parses_scientific_notation() {
        assert_eq!(parse_quantity_milli("1e3").unwrap(), 1_000_000);
        assert_eq!(parse_quantity_milli("2e-3").unwrap(), 2);
    }

    #[test]
    fn parses_signs() {
        assert_eq!(parse_quantity_milli("-1").unwrap(), -1000);
        assert_eq!(parse_quantity_milli("+250m").unwrap(), 250);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_quantity_milli("").is_err());
        assert!(parse_quantity_milli("abc").is_err());
        assert!(parse_quantity_milli("1Qi").is_err());
        assert!(parse_quantity_milli(".").is_err());
    }

    #[test]
    fn floor_division_matches_pod_fit_semantics() {
        // 9Gi budget / 4Gi per pod = 2 pods
        let budget = parse_quantity_milli("9Gi").unwrap();
        let per_pod = parse_quantity_milli("4Gi").unwrap();
        assert_eq!(milli_div_floor(budget, per_pod), 2);
        // 200m budget / 100m per pod = 2 pods
        let budget = parse_quantity_milli("200m").unwrap();
        let per_pod = parse_quantity_milli("100m").unwrap();
        assert_eq!(milli_div_floor(budget, per_pod), 2);
    }

    #[test]
    fn formats_milli_values() {
        assert_eq!(format_milli(5000), "5");
        assert_eq!(format_milli(250), "250m");
        assert_eq!(format_milli(0), "0");
    }

    #[test]
    fn clamps_to_i32() {
        assert_eq!(clamp_replicas(i128::from(i32::MAX) + 5), i32::MAX);
        assert_eq!(clamp_replicas(7), 7);
    }
}
