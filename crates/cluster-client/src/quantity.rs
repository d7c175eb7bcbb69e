//! Resource quantity normalization.
//!
//! The API server stores quantities in canonical form, so `2048Mi` reads back as `2Gi`
//! and `1000m` as `1`. Comparing desired and observed quotas therefore goes through
//! [`parse_millis`], which reduces a quantity to an exact count of thousandths.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

const BINARY_SUFFIXES: [(&str, u32); 6] = [("Ei", 60), ("Pi", 50), ("Ti", 40), ("Gi", 30), ("Mi", 20), ("Ki", 10)];
const DECIMAL_SUFFIXES: [(&str, i32); 10] = [
    ("E", 18),
    ("P", 15),
    ("T", 12),
    ("G", 9),
    ("M", 6),
    ("k", 3),
    ("", 0),
    ("m", -3),
    ("u", -6),
    ("n", -9),
];

enum Scale {
    Binary(u32),
    Decimal(i32),
}

fn split(value: &str) -> (&str, &str) {
    let end = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(value.len());
    value.split_at(end)
}

fn scale_of(suffix: &str) -> Option<Scale> {
    if let Some((_, shift)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Some(Scale::Binary(*shift));
    }
    if let Some((_, exp)) = DECIMAL_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Some(Scale::Decimal(*exp));
    }
    // Exponent form, e.g. `1e3`; a lone `E` is exa and matched above
    let exp = suffix.strip_prefix(['e', 'E'])?;
    exp.parse::<i32>().ok().map(Scale::Decimal)
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

/// Divide rounding away from zero, as the API server does for sub-milli precision
fn div_ceil(n: i128, d: i128) -> i128 {
    let q = n / d;
    if n % d == 0 { q } else if n > 0 { q + 1 } else { q - 1 }
}

/// Value of a quantity string in thousandths of its base unit
///
/// Returns `None` for strings that are not valid quantities or overflow.
pub fn parse_millis(value: &str) -> Option<i128> {
    let (number, suffix) = split(value.trim());
    let scale = scale_of(suffix)?;

    let (negative, unsigned) = match number.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, number.strip_prefix('+').unwrap_or(number)),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = format!("{}{}", int_part, frac_part);
    let mantissa: i128 = digits.parse().ok()?;
    let frac_digits = u32::try_from(frac_part.len()).ok()?;

    let millis = match scale {
        Scale::Binary(shift) => {
            let scaled = mantissa.checked_mul(1i128 << shift)?.checked_mul(1000)?;
            div_ceil(scaled, pow10(frac_digits)?)
        }
        Scale::Decimal(exp) => {
            let exp = exp.checked_add(3)?.checked_sub(i32::try_from(frac_digits).ok()?)?;
            if exp >= 0 {
                mantissa.checked_mul(pow10(exp.unsigned_abs())?)?
            } else {
                div_ceil(mantissa, pow10(exp.unsigned_abs())?)
            }
        }
    };
    Some(if negative { -millis } else { millis })
}

/// Whether two quantities denote the same amount
///
/// Unparseable quantities only equal an identical string.
pub fn quantities_equal(a: &Quantity, b: &Quantity) -> bool {
    match (parse_millis(&a.0), parse_millis(&b.0)) {
        (Some(a), Some(b)) => a == b,
        _ => a.0 == b.0,
    }
}

/// Whether two `hard` maps hold the same resources with equal amounts
pub fn hard_limits_equal(a: Option<&BTreeMap<String, Quantity>>, b: Option<&BTreeMap<String, Quantity>>) -> bool {
    let empty = BTreeMap::new();
    let a = a.unwrap_or(&empty);
    let b = b.unwrap_or(&empty);
    a.len() == b.len()
        && a.iter()
            .all(|(name, qa)| b.get(name).is_some_and(|qb| quantities_equal(qa, qb)))
}

/// Canonical spelling of a quantity, the way the API server returns it
///
/// Binary-suffixed input keeps the largest binary suffix that divides it exactly;
/// everything else uses the largest decimal suffix. Unparseable input is returned as is.
pub fn canonical(quantity: &Quantity) -> Quantity {
    let Some(millis) = parse_millis(&quantity.0) else {
        return quantity.clone();
    };
    if millis % 1000 != 0 {
        return Quantity(format!("{}m", millis));
    }
    let value = millis / 1000;
    if value == 0 {
        return Quantity("0".to_string());
    }

    let (_, suffix) = split(quantity.0.trim());
    if suffix.ends_with('i') {
        for (name, shift) in BINARY_SUFFIXES {
            let unit = 1i128 << shift;
            if value % unit == 0 {
                return Quantity(format!("{}{}", value / unit, name));
            }
        }
        return Quantity(value.to_string());
    }
    for (name, exp) in DECIMAL_SUFFIXES.iter().filter(|(_, e)| *e > 0) {
        if let Some(unit) = pow10(exp.unsigned_abs())
            && value % unit == 0
        {
            return Quantity(format!("{}{}", value / unit, name));
        }
    }
    Quantity(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        Quantity(s.to_string())
    }

    #[test]
    fn test_parse_millis() {
        assert_eq!(parse_millis("1"), Some(1000));
        assert_eq!(parse_millis("1000m"), Some(1000));
        assert_eq!(parse_millis("1.5"), Some(1500));
        assert_eq!(parse_millis("2Gi"), Some(2 * 1024 * 1024 * 1024 * 1000));
        assert_eq!(parse_millis("2048Mi"), parse_millis("2Gi"));
        assert_eq!(parse_millis("1k"), Some(1_000_000));
        assert_eq!(parse_millis("1e3"), parse_millis("1k"));
        assert_eq!(parse_millis("1E"), Some(10i128.pow(21)));
        assert_eq!(parse_millis("1n"), Some(1));
        assert_eq!(parse_millis("Gi"), None);
        assert_eq!(parse_millis("12xb"), None);
    }

    #[test]
    fn test_canonical_matches_api_server_spelling() {
        assert_eq!(canonical(&q("2048Mi")).0, "2Gi");
        assert_eq!(canonical(&q("1536Mi")).0, "1536Mi");
        assert_eq!(canonical(&q("1000m")).0, "1");
        assert_eq!(canonical(&q("4000m")).0, "4");
        assert_eq!(canonical(&q("500m")).0, "500m");
        assert_eq!(canonical(&q("20")).0, "20");
        assert_eq!(canonical(&q("2000")).0, "2k");
        assert_eq!(canonical(&q("0Mi")).0, "0");
    }

    #[test]
    fn test_hard_limits_compare_by_value() {
        let desired = BTreeMap::from([("limits.memory".to_string(), q("2048Mi")), ("pods".to_string(), q("20"))]);
        let observed = BTreeMap::from([("limits.memory".to_string(), q("2Gi")), ("pods".to_string(), q("20"))]);
        assert!(hard_limits_equal(Some(&desired), Some(&observed)));

        let mut grown = observed.clone();
        grown.insert("limits.memory".to_string(), q("3Gi"));
        assert!(!hard_limits_equal(Some(&desired), Some(&grown)));

        let mut extra = observed;
        extra.insert("limits.cpu".to_string(), q("2"));
        assert!(!hard_limits_equal(Some(&desired), Some(&extra)));
        assert!(hard_limits_equal(None, Some(&BTreeMap::new())));
    }
}
