//! Fundamental screener
//!
//! Derives ratios from raw financial figures and judges each entity against a fixed
//! condition table, producing PASS / FAIL / REVIEW with a reason for every missing,
//! uncomputable or failing field.

pub mod conditions;
pub mod derive;
pub mod evaluator;
pub mod judge;
pub mod reasons;

pub use conditions::{ConditionDisplay, ConditionTable, Operator, ScreenField, ScreeningCondition, Threshold};
pub use derive::derive;
pub use evaluator::evaluate;
pub use judge::{judge, judge_all};
pub use reasons::{codes, reason_message, ReasonSet};

use screening_core::{EnrichedRecord, ExternalEstimateRecord, JudgedRecord, RawFinancialRecord};

/// Derivation and judgment bound to one condition table. Holds no mutable state, so a
/// single engine can be shared across any number of concurrent tasks.
#[derive(Debug, Clone, Default)]
pub struct ScreeningEngine {
    conditions: ConditionTable,
}

impl ScreeningEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conditions(conditions: ConditionTable) -> Self {
        Self { conditions }
    }

    pub fn conditions(&self) -> &ConditionTable {
        &self.conditions
    }

    pub fn derive(&self, raw: RawFinancialRecord, external: Option<&ExternalEstimateRecord>) -> EnrichedRecord {
        derive::derive(raw, external)
    }

    pub fn judge(&self, record: EnrichedRecord) -> JudgedRecord {
        judge::judge(record, &self.conditions)
    }

    /// Derive then judge
    pub fn screen(&self, raw: RawFinancialRecord, external: Option<&ExternalEstimateRecord>) -> JudgedRecord {
        self.judge(self.derive(raw, external))
    }

    pub fn describe_conditions(&self) -> Vec<ConditionDisplay> {
        self.conditions.describe()
    }
}
