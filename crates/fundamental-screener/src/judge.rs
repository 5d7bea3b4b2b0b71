//! Screening judgment
//!
//! Status priority is REVIEW > FAIL > PASS: a record is never reported as cleanly
//! disqualified while any of its data is in doubt.

use crate::conditions::{ConditionTable, ScreeningCondition};
use crate::evaluator::evaluate;
use crate::reasons::{codes, reason_message, ReasonSet};
use chrono::Utc;
use screening_core::{
    DataStatus, EnrichedRecord, FailedReason, FieldValue, JudgedRecord, ReviewReason, RunSummary,
    ScreeningStatus,
};

fn resolve_status(review: &[ReviewReason], failed: &[FailedReason]) -> ScreeningStatus {
    if !review.is_empty() {
        ScreeningStatus::Review
    } else if !failed.is_empty() {
        ScreeningStatus::Fail
    } else {
        ScreeningStatus::Pass
    }
}

fn failed_reason(condition: &ScreeningCondition, value: &FieldValue) -> FailedReason {
    let description = condition.description();
    FailedReason {
        code: condition.fail_reason_code(),
        field: condition.field.name().to_string(),
        display_name: condition.label.clone(),
        observed_value: value.rounded(),
        message: format!("{}: {} does not satisfy {}", condition.label, value, description),
        condition_description: description,
    }
}

/// Judges one enriched record against `conditions`
pub fn judge(record: EnrichedRecord, conditions: &ConditionTable) -> JudgedRecord {
    let EnrichedRecord {
        mut raw,
        metrics,
        review_reasons,
    } = record;

    if raw.is_fetch_failed() {
        let review_reasons = if review_reasons.is_empty() {
            vec![ReviewReason::record(
                codes::FETCH_FAILED,
                reason_message(codes::FETCH_FAILED),
            )]
        } else {
            review_reasons
        };
        tracing::debug!("Judged {} -> REVIEW (fetch failed)", raw.company_code);
        return JudgedRecord {
            raw,
            metrics,
            status: ScreeningStatus::Review,
            review_reasons,
            failed_reasons: Vec::new(),
            judged_at: Utc::now(),
        };
    }

    let mut reasons = ReasonSet::from_reasons(review_reasons);
    let mut failed = Vec::new();

    for condition in conditions.screened() {
        match condition.field.value_of(&raw, &metrics) {
            None => {
                if !reasons.covers(condition.field) {
                    reasons.push(ReviewReason::for_field(
                        codes::DATA_MISSING,
                        condition.field.name(),
                        condition.label.clone(),
                        reason_message(codes::DATA_MISSING),
                    ));
                }
            }
            Some(value) => {
                if !evaluate(&value, &condition.op, &condition.threshold) {
                    failed.push(failed_reason(condition, &value));
                }
            }
        }
    }

    let review_reasons = reasons.into_vec();
    let status = resolve_status(&review_reasons, &failed);
    raw.data_status = DataStatus::Fresh;

    tracing::debug!("Judged {} -> {}", raw.company_code, status);

    JudgedRecord {
        raw,
        metrics,
        status,
        review_reasons,
        failed_reasons: failed,
        judged_at: Utc::now(),
    }
}

/// Judges a batch and reports the status totals
pub fn judge_all(
    records: impl IntoIterator<Item = EnrichedRecord>,
    conditions: &ConditionTable,
) -> (Vec<JudgedRecord>, RunSummary) {
    let judged: Vec<JudgedRecord> = records
        .into_iter()
        .map(|r| judge(r, conditions))
        .collect();
    let summary = RunSummary::tally(&judged);
    tracing::info!("Judgment complete: {}", summary);
    (judged, summary)
}
