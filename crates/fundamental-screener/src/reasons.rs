//! Reason codes and the review-reason accumulator

use crate::conditions::ScreenField;
use screening_core::ReviewReason;

pub mod codes {
    pub const FETCH_FAILED: &str = "FETCH_FAILED";
    pub const PRICE_FETCH_FAILED: &str = "PRICE_FETCH_FAILED";
    pub const ANALYST_DATA_UNAVAILABLE: &str = "ANALYST_DATA_UNAVAILABLE";
    pub const MISSING_EQUITY_RATIO: &str = "MISSING_EQUITY_RATIO";
    pub const MISSING_ROA: &str = "MISSING_ROA";
    pub const DATA_MISSING: &str = "DATA_MISSING";
    pub const DIVISION_BY_ZERO: &str = "DIVISION_BY_ZERO";
    pub const CALC_FAILED: &str = "CALC_FAILED";
    pub const DIV_BY_ZERO_REVENUE_GROWTH_1Y_CY: &str = "DIV_BY_ZERO_REVENUE_GROWTH_1Y_CY";
    pub const DIV_BY_ZERO_OP_GROWTH_1Y_CY: &str = "DIV_BY_ZERO_OP_GROWTH_1Y_CY";
}

/// Human message for a reason code, for reports. Unknown codes render as themselves.
pub fn reason_message(code: &str) -> &str {
    match code {
        codes::FETCH_FAILED => "Data fetch failed",
        codes::PRICE_FETCH_FAILED => "Price fetch failed",
        codes::ANALYST_DATA_UNAVAILABLE => "External estimate unavailable (needs review)",
        codes::DIV_BY_ZERO_REVENUE_GROWTH_1Y_CY => "Cannot compute (last FY revenue = 0)",
        codes::DIV_BY_ZERO_OP_GROWTH_1Y_CY => "Cannot compute (last FY operating profit = 0)",
        codes::MISSING_EQUITY_RATIO => "Insufficient data for equity ratio",
        codes::MISSING_ROA => "Insufficient data for ROA",
        codes::DATA_MISSING => "Data unavailable (needs review)",
        codes::DIVISION_BY_ZERO => "Cannot compute (previous period = 0)",
        codes::CALC_FAILED => "Calculation failed",
        other => other,
    }
}

/// Ordered review reasons with at most one entry per field key
#[derive(Debug, Clone, Default)]
pub struct ReasonSet {
    reasons: Vec<ReviewReason>,
}

impl ReasonSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the first reason seen for each field key
    pub fn from_reasons(reasons: impl IntoIterator<Item = ReviewReason>) -> Self {
        let mut set = Self::new();
        for reason in reasons {
            set.push(reason);
        }
        set
    }

    /// Returns `false` and drops the reason if its field already has one.
    /// Record-scoped reasons are deduplicated by code instead.
    pub fn push(&mut self, reason: ReviewReason) -> bool {
        let duplicate = match &reason.field {
            Some(field) => self.has_field(field),
            None => self
                .reasons
                .iter()
                .any(|r| r.field.is_none() && r.code == reason.code),
        };
        if duplicate {
            return false;
        }
        self.reasons.push(reason);
        true
    }

    /// Records the reason of a failed derivation and passes a successful value through
    pub fn take(&mut self, derived: Result<f64, ReviewReason>) -> Option<f64> {
        match derived {
            Ok(value) => Some(value),
            Err(reason) => {
                self.push(reason);
                None
            }
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.reasons.iter().any(|r| r.field.as_deref() == Some(field))
    }

    /// Whether a reason keyed by the field, or by its record-scoped group, exists
    pub fn covers(&self, field: ScreenField) -> bool {
        self.has_field(field.name()) || field.group().is_some_and(|g| self.has_field(g))
    }

    pub fn len(&self) -> usize {
        self.reasons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn as_slice(&self) -> &[ReviewReason] {
        &self.reasons
    }

    pub fn into_vec(self) -> Vec<ReviewReason> {
        self.reasons
    }
}
