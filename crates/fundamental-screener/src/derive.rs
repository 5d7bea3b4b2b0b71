//! Metric derivation
//!
//! Each rule is a pure function of its operands returning either the value or the
//! review reason explaining why it could not be computed. `derive` runs every rule
//! independently and collects the reasons once, so one field's failure never
//! blocks another's.

use crate::conditions::{ScreenField, TK_DEVIATION_GROUP};
use crate::reasons::{codes, reason_message, ReasonSet};
use screening_core::{
    DerivedMetrics, EnrichedRecord, ExternalEstimateRecord, RawFinancialRecord, ReviewReason,
};

pub type Derivation = Result<f64, ReviewReason>;

fn field_reason(field: ScreenField, code: &str) -> ReviewReason {
    ReviewReason::for_field(code, field.name(), field.default_label(), reason_message(code))
}

/// Division results that overflowed are reported, never emitted
fn finite(field: ScreenField, value: f64) -> Derivation {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(field_reason(field, codes::CALC_FAILED))
    }
}

/// `numerator / denominator × 100`, or `None` when the denominator is absent or zero
fn percent_of(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n * 100.0 / d),
        _ => None,
    }
}

/// equity / total_assets × 100
pub fn equity_ratio(equity: Option<f64>, total_assets: Option<f64>) -> Derivation {
    let field = ScreenField::EquityRatio;
    match percent_of(equity, total_assets) {
        Some(v) => finite(field, v),
        None => Err(field_reason(field, codes::MISSING_EQUITY_RATIO)),
    }
}

/// (curr − prev) / |prev| × 100
pub fn growth_rate(field: ScreenField, prev: Option<f64>, curr: Option<f64>) -> Derivation {
    let (Some(prev), Some(curr)) = (prev, curr) else {
        return Err(field_reason(field, codes::DATA_MISSING));
    };
    if prev == 0.0 {
        return Err(field_reason(field, codes::DIVISION_BY_ZERO));
    }
    finite(field, (curr - prev) * 100.0 / prev.abs())
}

/// operating profit / revenue × 100 for the last closed year
pub fn operating_margin(op_1y: Option<f64>, revenue_1y: Option<f64>) -> Derivation {
    let field = ScreenField::OperatingMargin;
    match percent_of(op_1y, revenue_1y) {
        Some(v) => finite(field, v),
        None => Err(field_reason(field, codes::CALC_FAILED)),
    }
}

/// net income / total assets × 100
pub fn return_on_assets(net_income: Option<f64>, total_assets: Option<f64>) -> Derivation {
    let field = ScreenField::Roa;
    match percent_of(net_income, total_assets) {
        Some(v) => finite(field, v),
        None => Err(field_reason(field, codes::MISSING_ROA)),
    }
}

/// operating CF + investing CF. Zero is a present operand.
pub fn free_cash_flow(operating_cf: Option<f64>, investing_cf: Option<f64>) -> Derivation {
    let field = ScreenField::FreeCf;
    match (operating_cf, investing_cf) {
        (Some(o), Some(i)) => finite(field, o + i),
        _ => Err(field_reason(field, codes::CALC_FAILED)),
    }
}

/// (own − external) / external × 100. Absent without a reason when either side is
/// missing or the external figure is zero.
pub fn estimate_deviation(own: Option<f64>, external: Option<f64>) -> Option<f64> {
    match (own, external) {
        (Some(own), Some(ext)) if ext != 0.0 => {
            Some((own - ext) * 100.0 / ext).filter(|v| v.is_finite())
        }
        _ => None,
    }
}

fn analyst_unavailable() -> ReviewReason {
    ReviewReason::for_field(
        codes::ANALYST_DATA_UNAVAILABLE,
        TK_DEVIATION_GROUP,
        "Estimate deviation",
        reason_message(codes::ANALYST_DATA_UNAVAILABLE),
    )
}

/// Derives every metric of `raw`. The external estimate is the deviation baseline;
/// when it is missing entirely both deviations are absent and one record-scoped
/// `ANALYST_DATA_UNAVAILABLE` reason is raised.
pub fn derive(raw: RawFinancialRecord, external: Option<&ExternalEstimateRecord>) -> EnrichedRecord {
    if raw.is_fetch_failed() {
        let message = match raw.fetch_error.as_deref() {
            Some(err) => format!("{}: {}", reason_message(codes::FETCH_FAILED), err),
            None => reason_message(codes::FETCH_FAILED).to_string(),
        };
        return EnrichedRecord {
            raw,
            metrics: DerivedMetrics::default(),
            review_reasons: vec![ReviewReason::record(codes::FETCH_FAILED, message)],
        };
    }

    let mut reasons = ReasonSet::new();

    let equity_ratio = reasons.take(equity_ratio(raw.equity, raw.total_assets));

    let revenue_growth_2y_1y = reasons.take(growth_rate(ScreenField::RevenueGrowth2y1y, raw.revenue_2y, raw.revenue_1y));
    let revenue_growth_1y_cy = reasons.take(growth_rate(ScreenField::RevenueGrowth1yCy, raw.revenue_1y, raw.revenue_cy));
    let revenue_growth_cy_ny = reasons.take(growth_rate(ScreenField::RevenueGrowthCyNy, raw.revenue_cy, raw.revenue_ny));

    let op_growth_2y_1y = reasons.take(growth_rate(ScreenField::OpGrowth2y1y, raw.op_2y, raw.op_1y));
    let op_growth_1y_cy = reasons.take(growth_rate(ScreenField::OpGrowth1yCy, raw.op_1y, raw.op_cy));
    let op_growth_cy_ny = reasons.take(growth_rate(ScreenField::OpGrowthCyNy, raw.op_cy, raw.op_ny));

    let operating_margin = reasons.take(operating_margin(raw.op_1y, raw.revenue_1y));
    let roa = reasons.take(return_on_assets(raw.net_income, raw.total_assets));
    let free_cf = reasons.take(free_cash_flow(raw.operating_cf, raw.investing_cf));

    let (tk_deviation_revenue, tk_deviation_op) = match external {
        Some(ext) => (
            estimate_deviation(raw.revenue_cy, ext.revenue),
            estimate_deviation(raw.op_cy, ext.operating_profit),
        ),
        None => {
            reasons.push(analyst_unavailable());
            (None, None)
        }
    };

    let metrics = DerivedMetrics {
        equity_ratio,
        revenue_growth_2y_1y,
        revenue_growth_1y_cy,
        revenue_growth_cy_ny,
        op_growth_2y_1y,
        op_growth_1y_cy,
        op_growth_cy_ny,
        operating_margin,
        roa,
        free_cf,
        tk_deviation_revenue,
        tk_deviation_op,
    };

    EnrichedRecord {
        raw,
        metrics,
        review_reasons: reasons.into_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_raw() -> RawFinancialRecord {
        RawFinancialRecord {
            revenue_2y: Some(100.0),
            revenue_1y: Some(110.0),
            revenue_cy: Some(120.0),
            revenue_ny: Some(130.0),
            op_2y: Some(10.0),
            op_1y: Some(12.0),
            op_cy: Some(14.0),
            op_ny: Some(16.0),
            total_assets: Some(200.0),
            equity: Some(80.0),
            net_income: Some(10.0),
            operating_cf: Some(15.0),
            investing_cf: Some(-5.0),
            ..RawFinancialRecord::new("9999", "Test Co")
        }
    }

    fn external(revenue: Option<f64>, op: Option<f64>) -> ExternalEstimateRecord {
        ExternalEstimateRecord {
            company_code: "9999".to_string(),
            revenue,
            operating_profit: op,
            ..Default::default()
        }
    }

    fn codes_for(record: &EnrichedRecord, field: &str) -> Vec<String> {
        record
            .review_reasons
            .iter()
            .filter(|r| r.field.as_deref() == Some(field))
            .map(|r| r.code.clone())
            .collect()
    }

    #[test]
    fn test_growth_rate() {
        let f = ScreenField::RevenueGrowth2y1y;
        assert_eq!(growth_rate(f, Some(100.0), Some(150.0)).unwrap(), 50.0);
        // negative base uses |prev|
        assert_eq!(growth_rate(f, Some(-10.0), Some(-5.0)).unwrap(), 50.0);

        let err = growth_rate(f, Some(0.0), Some(10.0)).unwrap_err();
        assert_eq!(err.code, codes::DIVISION_BY_ZERO);
        assert_eq!(err.field.as_deref(), Some("revenue_growth_2y_1y"));

        assert_eq!(growth_rate(f, None, Some(10.0)).unwrap_err().code, codes::DATA_MISSING);
        // missing operand wins over a zero base
        assert_eq!(growth_rate(f, Some(0.0), None).unwrap_err().code, codes::DATA_MISSING);
    }

    #[test]
    fn test_equity_ratio() {
        assert_eq!(equity_ratio(Some(30.0), Some(100.0)).unwrap(), 30.0);
        assert_eq!(equity_ratio(Some(30.0), Some(0.0)).unwrap_err().code, codes::MISSING_EQUITY_RATIO);
        assert_eq!(equity_ratio(None, Some(100.0)).unwrap_err().code, codes::MISSING_EQUITY_RATIO);
        assert_eq!(equity_ratio(Some(0.0), Some(100.0)).unwrap(), 0.0);
    }

    #[test]
    fn test_operating_margin_and_roa() {
        assert_eq!(operating_margin(Some(12.0), Some(120.0)).unwrap(), 10.0);
        let err = operating_margin(Some(12.0), Some(0.0)).unwrap_err();
        assert_eq!(err.code, codes::CALC_FAILED);
        assert_eq!(err.field.as_deref(), Some("operating_margin"));

        assert_eq!(return_on_assets(Some(9.0), Some(200.0)).unwrap(), 4.5);
        assert_eq!(return_on_assets(Some(9.0), None).unwrap_err().code, codes::MISSING_ROA);
    }

    #[test]
    fn test_free_cash_flow() {
        assert_eq!(free_cash_flow(Some(10.0), Some(-3.0)).unwrap(), 7.0);
        assert_eq!(free_cash_flow(Some(0.0), Some(0.0)).unwrap(), 0.0);
        let err = free_cash_flow(Some(10.0), None).unwrap_err();
        assert_eq!(err.code, codes::CALC_FAILED);
        assert_eq!(err.field.as_deref(), Some("free_cf"));
    }

    #[test]
    fn test_overflow_is_reported() {
        let err = growth_rate(ScreenField::OpGrowth2y1y, Some(1e-320), Some(f64::MAX)).unwrap_err();
        assert_eq!(err.code, codes::CALC_FAILED);
    }

    #[test]
    fn test_estimate_deviation() {
        assert_eq!(estimate_deviation(Some(110.0), Some(100.0)), Some(10.0));
        assert_eq!(estimate_deviation(Some(90.0), Some(100.0)), Some(-10.0));
        assert_eq!(estimate_deviation(Some(90.0), Some(0.0)), None);
        assert_eq!(estimate_deviation(None, Some(100.0)), None);
        assert_eq!(estimate_deviation(Some(90.0), None), None);
    }

    #[test]
    fn test_derive_complete_record_has_no_reasons() {
        let ext = external(Some(100.0), Some(10.0));
        let record = derive(complete_raw(), Some(&ext));

        assert!(record.review_reasons.is_empty(), "{:?}", record.review_reasons);
        let m = &record.metrics;
        assert_eq!(m.equity_ratio, Some(40.0));
        assert_eq!(m.revenue_growth_2y_1y, Some(10.0));
        assert_eq!(m.op_growth_2y_1y, Some(20.0));
        assert_eq!(m.operating_margin, Some(12.0 * 100.0 / 110.0));
        assert_eq!(m.roa, Some(5.0));
        assert_eq!(m.free_cf, Some(10.0));
        assert_eq!(m.tk_deviation_revenue, Some(20.0));
        assert_eq!(m.tk_deviation_op, Some(40.0));
    }

    #[test]
    fn test_missing_external_raises_single_reason() {
        let record = derive(complete_raw(), None);

        assert_eq!(record.metrics.tk_deviation_revenue, None);
        assert_eq!(record.metrics.tk_deviation_op, None);
        let analyst: Vec<_> = record
            .review_reasons
            .iter()
            .filter(|r| r.code == codes::ANALYST_DATA_UNAVAILABLE)
            .collect();
        assert_eq!(analyst.len(), 1);
        assert_eq!(analyst[0].field.as_deref(), Some(TK_DEVIATION_GROUP));
        assert_eq!(record.review_reasons.len(), 1);
    }

    #[test]
    fn test_partial_external_suppresses_unavailable_reason() {
        let ext = external(Some(100.0), None);
        let record = derive(complete_raw(), Some(&ext));

        assert_eq!(record.metrics.tk_deviation_revenue, Some(20.0));
        assert_eq!(record.metrics.tk_deviation_op, None);
        assert!(record.review_reasons.is_empty());
    }

    #[test]
    fn test_failures_are_independent_and_field_scoped() {
        let raw = RawFinancialRecord {
            revenue_1y: Some(0.0),
            total_assets: None,
            investing_cf: None,
            ..complete_raw()
        };
        let record = derive(raw, Some(&external(Some(100.0), Some(10.0))));

        assert_eq!(codes_for(&record, "revenue_growth_1y_cy"), vec![codes::DIVISION_BY_ZERO]);
        assert_eq!(codes_for(&record, "equity_ratio"), vec![codes::MISSING_EQUITY_RATIO]);
        assert_eq!(codes_for(&record, "roa"), vec![codes::MISSING_ROA]);
        assert_eq!(codes_for(&record, "operating_margin"), vec![codes::CALC_FAILED]);
        assert_eq!(codes_for(&record, "free_cf"), vec![codes::CALC_FAILED]);

        // revenue 2y→1y is still computed even though its neighbour failed
        assert_eq!(record.metrics.revenue_growth_2y_1y, Some(-100.0));
        assert!(codes_for(&record, "revenue_growth_2y_1y").is_empty());
        assert_eq!(record.metrics.op_growth_2y_1y, Some(20.0));
        assert_eq!(record.review_reasons.len(), 5);
    }

    #[test]
    fn test_six_growth_failures_each_reported() {
        let raw = RawFinancialRecord {
            revenue_2y: None,
            revenue_1y: None,
            revenue_cy: None,
            revenue_ny: None,
            op_2y: None,
            op_1y: None,
            op_cy: None,
            op_ny: None,
            ..complete_raw()
        };
        let record = derive(raw, Some(&external(None, None)));
        let growth_missing = record
            .review_reasons
            .iter()
            .filter(|r| r.code == codes::DATA_MISSING)
            .count();
        assert_eq!(growth_missing, 6);
    }

    #[test]
    fn test_fetch_failed_record_is_not_derived() {
        let raw = RawFinancialRecord::fetch_failed("1234", "HTTP 500");
        let record = derive(raw, None);

        assert_eq!(record.metrics, DerivedMetrics::default());
        assert_eq!(record.review_reasons.len(), 1);
        assert_eq!(record.review_reasons[0].code, codes::FETCH_FAILED);
        assert!(record.review_reasons[0].field.is_none());
        assert!(record.review_reasons[0].message.contains("HTTP 500"));
    }
}
