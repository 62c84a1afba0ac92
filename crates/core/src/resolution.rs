//! Output dimension normalization.
//!
//! The video model works on latents that are 1/16 of the pixel size, so
//! width and height must be multiples of 16. Requests may carry any
//! number (or numeric string); it is snapped to the nearest valid size.
//! The same loose numeric coercion backs the other integer job fields.

use serde_json::Value;

use crate::error::CoreError;

/// Dimension granularity required by the model.
pub const DIMENSION_STEP: i64 = 16;

/// Smallest dimension ever produced by normalization.
pub const MIN_DIMENSION: i64 = DIMENSION_STEP;

/// Snap `value` to the nearest multiple of [`DIMENSION_STEP`], never
/// returning less than [`MIN_DIMENSION`].
///
/// Halfway cases round to even (`8 -> 16` via the floor, `24 -> 32`,
/// `40 -> 32`).
pub fn to_nearest_multiple_of_16(value: f64) -> Result<i64, CoreError> {
    if !value.is_finite() {
        return Err(CoreError::Validation(format!(
            "Width/height must be a finite number, got {value}"
        )));
    }
    let step = DIMENSION_STEP as f64;
    let adjusted = (value / step).round_ties_even() * step;
    Ok((adjusted as i64).max(MIN_DIMENSION))
}

/// Coerce a JSON value (number or numeric string) to `f64`.
///
/// `field` names the request field in the error message.
pub fn numeric_value(field: &str, value: &Value) -> Result<f64, CoreError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        CoreError::Validation(format!("Non-numeric value for '{field}': {value}"))
    })
}

/// Coerce a JSON value to a non-negative integer.
///
/// Integers, floats without a fractional part (`33.0`) and strings holding
/// either are accepted; anything else is a validation error naming `field`.
pub fn whole_number(field: &str, value: &Value) -> Result<u64, CoreError> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    if let Some(n) = value.as_str().and_then(|s| s.trim().parse::<u64>().ok()) {
        return Ok(n);
    }

    let number = numeric_value(field, value)?;
    if number.is_finite() && number >= 0.0 && number.fract() == 0.0 && number < u64::MAX as f64 {
        Ok(number as u64)
    } else {
        Err(CoreError::Validation(format!(
            "'{field}' must be a non-negative whole number, got {value}"
        )))
    }
}

/// Normalize a raw request dimension in one step.
pub fn normalize_dimension(field: &str, value: &Value) -> Result<i64, CoreError> {
    to_nearest_multiple_of_16(numeric_value(field, value)?)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn small_values_clamp_to_minimum() {
        assert_eq!(to_nearest_multiple_of_16(15.0).unwrap(), 16);
        assert_eq!(to_nearest_multiple_of_16(1.0).unwrap(), 16);
        assert_eq!(to_nearest_multiple_of_16(0.0).unwrap(), 16);
        assert_eq!(to_nearest_multiple_of_16(-5.0).unwrap(), 16);
        assert_eq!(to_nearest_multiple_of_16(-1000.0).unwrap(), 16);
    }

    #[test]
    fn snaps_to_nearest_multiple() {
        assert_eq!(to_nearest_multiple_of_16(100.0).unwrap(), 96);
        assert_eq!(to_nearest_multiple_of_16(500.0).unwrap(), 496);
        assert_eq!(to_nearest_multiple_of_16(832.0).unwrap(), 832);
        assert_eq!(to_nearest_multiple_of_16(1279.9).unwrap(), 1280);
    }

    #[test]
    fn halfway_rounds_to_even() {
        assert_eq!(to_nearest_multiple_of_16(24.0).unwrap(), 32);
        assert_eq!(to_nearest_multiple_of_16(40.0).unwrap(), 32);
        assert_eq!(to_nearest_multiple_of_16(56.0).unwrap(), 64);
    }

    #[test]
    fn result_is_close_multiple_for_range() {
        for v in -50..2000 {
            let n = to_nearest_multiple_of_16(v as f64).unwrap();
            assert_eq!(n % 16, 0, "value {v}");
            assert!(n >= 16, "value {v}");
            if v >= 8 {
                assert!((n - v as i64).abs() <= 8, "value {v} -> {n}");
            }
        }
    }

    #[test]
    fn non_finite_rejected() {
        assert_matches!(
            to_nearest_multiple_of_16(f64::NAN),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            to_nearest_multiple_of_16(f64::INFINITY),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn numeric_strings_accepted() {
        assert_eq!(normalize_dimension("width", &json!("500")).unwrap(), 496);
        assert_eq!(normalize_dimension("width", &json!(" 720.0 ")).unwrap(), 720);
        assert_eq!(normalize_dimension("height", &json!(480)).unwrap(), 480);
    }

    #[test]
    fn non_numeric_rejected() {
        let err = normalize_dimension("width", &json!("wide")).unwrap_err();
        assert_matches!(err, CoreError::Validation(ref msg) if msg.contains("width"));
        assert_matches!(
            normalize_dimension("height", &json!(null)),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            normalize_dimension("height", &json!([512])),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn whole_numbers_accept_integral_floats_and_strings() {
        assert_eq!(whole_number("length", &json!(33)).unwrap(), 33);
        assert_eq!(whole_number("length", &json!(33.0)).unwrap(), 33);
        assert_eq!(whole_number("seed", &json!("7")).unwrap(), 7);
        assert_eq!(whole_number("seed", &json!(" 12.0 ")).unwrap(), 12);
        assert_eq!(whole_number("seed", &json!(u64::MAX)).unwrap(), u64::MAX);
    }

    #[test]
    fn whole_numbers_reject_fractions_and_negatives() {
        for bad in [json!(33.5), json!(-1), json!("-3"), json!("seven"), json!(true)] {
            assert_matches!(
                whole_number("length", &bad),
                Err(CoreError::Validation(ref msg)) if msg.contains("length"),
                "{bad}"
            );
        }
    }
}
