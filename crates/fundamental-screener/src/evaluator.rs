use crate::conditions::{Operator, Threshold};
use chrono::NaiveDate;
use screening_core::FieldValue;
use std::cmp::Ordering;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

/// Orders `value` against `threshold`, or `None` when the two cannot be compared
fn compare(value: &FieldValue, threshold: &Threshold) -> Option<Ordering> {
    match threshold {
        Threshold::Text(t) if t.contains('-') => {
            let threshold = parse_date(t)?;
            let value = match value {
                FieldValue::Date(d) => *d,
                FieldValue::Text(s) => parse_date(s)?,
                FieldValue::Number(_) => return None,
            };
            Some(value.cmp(&threshold))
        }
        Threshold::Text(t) => match value {
            FieldValue::Text(s) => Some(s.as_str().cmp(t.as_str())),
            _ => None,
        },
        Threshold::Number(t) => match value {
            FieldValue::Number(v) => v.partial_cmp(t),
            _ => None,
        },
    }
}

/// Tests `value {op} threshold`. Returns `false` for any comparison it cannot
/// resolve: mismatched types, unparsable dates, NaN, or an unsupported operator.
/// Only `==` on numbers is tolerant, within `f64::EPSILON`.
pub fn evaluate(value: &FieldValue, op: &Operator, threshold: &Threshold) -> bool {
    if let Operator::Unsupported(symbol) = op {
        tracing::warn!("Unsupported comparison operator: {}", symbol);
        return false;
    }

    let Some(ordering) = compare(value, threshold) else {
        return false;
    };

    match op {
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Gte => ordering != Ordering::Less,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Lte => ordering != Ordering::Greater,
        Operator::Eq => match (value, threshold) {
            (FieldValue::Number(v), Threshold::Number(t)) => (v - t).abs() < f64::EPSILON,
            _ => ordering == Ordering::Equal,
        },
        Operator::Unsupported(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> FieldValue {
        FieldValue::Number(v)
    }

    #[test]
    fn test_numeric_operators() {
        let t = Threshold::Number(30.0);
        assert!(evaluate(&num(31.0), &Operator::Gt, &t));
        assert!(!evaluate(&num(30.0), &Operator::Gt, &t));
        assert!(evaluate(&num(30.0), &Operator::Gte, &t));
        assert!(!evaluate(&num(29.99), &Operator::Gte, &t));
        assert!(evaluate(&num(29.0), &Operator::Lt, &t));
        assert!(evaluate(&num(30.0), &Operator::Lte, &t));
        assert!(!evaluate(&num(30.01), &Operator::Lte, &t));
        assert!(evaluate(&num(30.0), &Operator::Eq, &t));
        assert!(!evaluate(&num(30.5), &Operator::Eq, &t));
    }

    #[test]
    fn test_tiny_differences_order_strictly() {
        let zero = Threshold::Number(0.0);
        assert!(evaluate(&num(1e-17), &Operator::Gt, &zero));
        assert!(!evaluate(&num(1e-17), &Operator::Lte, &zero));
        assert!(evaluate(&num(-1e-17), &Operator::Lt, &zero));
        assert!(evaluate(&num(1e-17), &Operator::Eq, &zero));
    }

    #[test]
    fn test_boundary_passes_inclusive_operator() {
        assert!(evaluate(&num(30.0), &Operator::Gte, &Threshold::Number(30.0)));
        assert!(evaluate(&num(700.0), &Operator::Lte, &Threshold::Number(700.0)));
    }

    #[test]
    fn test_negative_values() {
        let zero = Threshold::Number(0.0);
        assert!(!evaluate(&num(-3.0), &Operator::Gt, &zero));
        assert!(evaluate(&num(-3.0), &Operator::Lt, &zero));
    }

    #[test]
    fn test_nan_never_passes() {
        let t = Threshold::Number(0.0);
        for op in [Operator::Gt, Operator::Gte, Operator::Lt, Operator::Lte, Operator::Eq] {
            assert!(!evaluate(&num(f64::NAN), &op, &t));
        }
    }

    #[test]
    fn test_date_threshold() {
        let t = Threshold::Text("2012-12-01".to_string());
        let later = FieldValue::Date(NaiveDate::from_ymd_opt(2015, 1, 1).unwrap());
        let earlier = FieldValue::Date(NaiveDate::from_ymd_opt(1999, 5, 10).unwrap());
        assert!(evaluate(&later, &Operator::Gt, &t));
        assert!(!evaluate(&earlier, &Operator::Gt, &t));

        // date carried as text is parsed too
        assert!(evaluate(&FieldValue::Text("2013-04-01".to_string()), &Operator::Gt, &t));
        assert!(evaluate(&FieldValue::Text("2012-12-01".to_string()), &Operator::Gte, &t));
    }

    #[test]
    fn test_unparsable_date_fails() {
        let t = Threshold::Text("2012-12-01".to_string());
        assert!(!evaluate(&FieldValue::Text("2013/04/01".to_string()), &Operator::Gt, &t));
        assert!(!evaluate(&num(20150101.0), &Operator::Gt, &t));

        let bad = Threshold::Text("2012-13-45".to_string());
        let d = FieldValue::Date(NaiveDate::from_ymd_opt(2015, 1, 1).unwrap());
        assert!(!evaluate(&d, &Operator::Gt, &bad));
    }

    #[test]
    fn test_type_mismatch_fails() {
        assert!(!evaluate(&FieldValue::Text("abc".to_string()), &Operator::Gt, &Threshold::Number(0.0)));
        assert!(!evaluate(&num(1.0), &Operator::Eq, &Threshold::Text("abc".to_string())));
    }

    #[test]
    fn test_text_threshold_without_separator_is_ordinal() {
        let t = Threshold::Text("B".to_string());
        assert!(evaluate(&FieldValue::Text("C".to_string()), &Operator::Gt, &t));
        assert!(evaluate(&FieldValue::Text("B".to_string()), &Operator::Eq, &t));
    }

    #[test]
    fn test_unsupported_operator_fails_closed() {
        let op = Operator::parse("!=");
        assert!(!evaluate(&num(100.0), &op, &Threshold::Number(0.0)));
        assert!(!evaluate(&num(0.0), &op, &Threshold::Number(0.0)));
    }
}
