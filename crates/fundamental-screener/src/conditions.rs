//! Screening condition table
//!
//! The table is an ordered list of descriptors, one per screened field. Order is
//! significant: it is the evaluation order and the order reasons are reported in.

use screening_core::{DerivedMetrics, FieldValue, RawFinancialRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every field a screening condition can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScreenField {
    TkDeviationRevenue,
    TkDeviationOp,
    MarketCap,
    EquityRatio,
    RevenueGrowth2y1y,
    RevenueGrowth1yCy,
    RevenueGrowthCyNy,
    OperatingMargin,
    OpGrowth2y1y,
    OpGrowth1yCy,
    OpGrowthCyNy,
    OperatingCf,
    FreeCf,
    ListingDate,
    Roa,
    PerForward,
    Pbr,
    DividendYield,
}

/// Key used by the record-scoped reason that covers both estimate deviation fields
pub const TK_DEVIATION_GROUP: &str = "tk_deviation";

impl ScreenField {
    /// Column name, as used in serialized records and reason `field` keys
    pub fn name(&self) -> &'static str {
        match self {
            ScreenField::TkDeviationRevenue => "tk_deviation_revenue",
            ScreenField::TkDeviationOp => "tk_deviation_op",
            ScreenField::MarketCap => "market_cap",
            ScreenField::EquityRatio => "equity_ratio",
            ScreenField::RevenueGrowth2y1y => "revenue_growth_2y_1y",
            ScreenField::RevenueGrowth1yCy => "revenue_growth_1y_cy",
            ScreenField::RevenueGrowthCyNy => "revenue_growth_cy_ny",
            ScreenField::OperatingMargin => "operating_margin",
            ScreenField::OpGrowth2y1y => "op_growth_2y_1y",
            ScreenField::OpGrowth1yCy => "op_growth_1y_cy",
            ScreenField::OpGrowthCyNy => "op_growth_cy_ny",
            ScreenField::OperatingCf => "operating_cf",
            ScreenField::FreeCf => "free_cf",
            ScreenField::ListingDate => "listing_date",
            ScreenField::Roa => "roa",
            ScreenField::PerForward => "per_forward",
            ScreenField::Pbr => "pbr",
            ScreenField::DividendYield => "dividend_yield",
        }
    }

    pub fn default_label(&self) -> &'static str {
        match self {
            ScreenField::TkDeviationRevenue => "Estimate deviation, revenue (%)",
            ScreenField::TkDeviationOp => "Estimate deviation, operating profit (%)",
            ScreenField::MarketCap => "Market cap (100M JPY)",
            ScreenField::EquityRatio => "Equity ratio, last FY (%)",
            ScreenField::RevenueGrowth2y1y => "Revenue growth 2y→1y (%)",
            ScreenField::RevenueGrowth1yCy => "Revenue growth 1y→cy est (%)",
            ScreenField::RevenueGrowthCyNy => "Revenue growth cy est→ny est (%)",
            ScreenField::OperatingMargin => "Operating margin, last FY (%)",
            ScreenField::OpGrowth2y1y => "Operating profit growth 2y→1y (%)",
            ScreenField::OpGrowth1yCy => "Operating profit growth 1y→cy est (%)",
            ScreenField::OpGrowthCyNy => "Operating profit growth cy est→ny est (%)",
            ScreenField::OperatingCf => "Operating CF, last FY (100M JPY)",
            ScreenField::FreeCf => "Free CF, last FY (100M JPY)",
            ScreenField::ListingDate => "Listing date",
            ScreenField::Roa => "ROA, last FY (%)",
            ScreenField::PerForward => "Forward P/E (x)",
            ScreenField::Pbr => "P/B, latest quarter (x)",
            ScreenField::DividendYield => "Dividend yield (%)",
        }
    }

    /// Record-scoped reason key that also accounts for this field, if any
    pub fn group(&self) -> Option<&'static str> {
        match self {
            ScreenField::TkDeviationRevenue | ScreenField::TkDeviationOp => Some(TK_DEVIATION_GROUP),
            _ => None,
        }
    }

    pub fn value_of(&self, raw: &RawFinancialRecord, metrics: &DerivedMetrics) -> Option<FieldValue> {
        let number = match self {
            ScreenField::TkDeviationRevenue => metrics.tk_deviation_revenue,
            ScreenField::TkDeviationOp => metrics.tk_deviation_op,
            ScreenField::MarketCap => raw.market_cap,
            ScreenField::EquityRatio => metrics.equity_ratio,
            ScreenField::RevenueGrowth2y1y => metrics.revenue_growth_2y_1y,
            ScreenField::RevenueGrowth1yCy => metrics.revenue_growth_1y_cy,
            ScreenField::RevenueGrowthCyNy => metrics.revenue_growth_cy_ny,
            ScreenField::OperatingMargin => metrics.operating_margin,
            ScreenField::OpGrowth2y1y => metrics.op_growth_2y_1y,
            ScreenField::OpGrowth1yCy => metrics.op_growth_1y_cy,
            ScreenField::OpGrowthCyNy => metrics.op_growth_cy_ny,
            ScreenField::OperatingCf => raw.operating_cf,
            ScreenField::FreeCf => metrics.free_cf,
            ScreenField::ListingDate => return raw.listing_date.map(FieldValue::Date),
            ScreenField::Roa => metrics.roa,
            ScreenField::PerForward => raw.per_forward,
            ScreenField::Pbr => raw.pbr,
            ScreenField::DividendYield => raw.dividend_yield,
        };
        number.map(FieldValue::Number)
    }
}

/// Comparison operator of a condition. Symbols outside the supported set are kept so
/// a mis-configured condition fails closed instead of being dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Unsupported(String),
}

impl Operator {
    pub fn parse(symbol: &str) -> Self {
        match symbol.trim() {
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            "==" => Operator::Eq,
            other => Operator::Unsupported(other.to_string()),
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Eq => "==",
            Operator::Unsupported(s) => s,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Threshold of a condition. Text containing a `-` is treated as a `YYYY-MM-DD` date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    Number(f64),
    Text(String),
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Number(v) => write!(f, "{}", v),
            Threshold::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreeningCondition {
    pub field: ScreenField,
    pub op: Operator,
    pub threshold: Threshold,
    pub label: String,
    /// Reported but excluded from the PASS/FAIL/REVIEW decision
    pub display_only: bool,
}

impl ScreeningCondition {
    pub fn new(field: ScreenField, op: Operator, threshold: Threshold) -> Self {
        Self {
            field,
            op,
            threshold,
            label: field.default_label().to_string(),
            display_only: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn report_only(mut self) -> Self {
        self.display_only = true;
        self
    }

    /// `"{op} {threshold}"`, e.g. `">= 30"`
    pub fn description(&self) -> String {
        format!("{} {}", self.op, self.threshold)
    }

    /// `{FIELD}_BELOW_THRESHOLD` for lower bounds, `{FIELD}_ABOVE_THRESHOLD` for upper
    /// bounds, `{FIELD}_NOT_MET` for anything else
    pub fn fail_reason_code(&self) -> String {
        let field = self.field.name().to_uppercase();
        match self.op {
            Operator::Gt | Operator::Gte => format!("{}_BELOW_THRESHOLD", field),
            Operator::Lt | Operator::Lte => format!("{}_ABOVE_THRESHOLD", field),
            _ => format!("{}_NOT_MET", field),
        }
    }
}

/// Condition as listed for reports and the conditions page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionDisplay {
    pub field: String,
    pub name: String,
    pub operator: String,
    pub threshold: Threshold,
    pub display_only: bool,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct ConditionTable {
    conditions: Vec<ScreeningCondition>,
}

impl ConditionTable {
    pub fn new(conditions: Vec<ScreeningCondition>) -> Self {
        Self { conditions }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScreeningCondition> {
        self.conditions.iter()
    }

    /// Conditions that take part in the status decision, in table order
    pub fn screened(&self) -> impl Iterator<Item = &ScreeningCondition> {
        self.conditions.iter().filter(|c| !c.display_only)
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn describe(&self) -> Vec<ConditionDisplay> {
        self.conditions
            .iter()
            .map(|c| ConditionDisplay {
                field: c.field.name().to_string(),
                name: c.label.clone(),
                operator: c.op.symbol().to_string(),
                threshold: c.threshold.clone(),
                display_only: c.display_only,
                description: format!("{} {}", c.label, c.description()),
            })
            .collect()
    }
}

impl Default for ConditionTable {
    fn default() -> Self {
        use Operator::*;
        use ScreenField::*;

        let num = Threshold::Number;
        Self::new(vec![
            ScreeningCondition::new(TkDeviationRevenue, Gt, num(0.0)),
            ScreeningCondition::new(TkDeviationOp, Gt, num(0.0)),
            ScreeningCondition::new(MarketCap, Lte, num(700.0)),
            ScreeningCondition::new(EquityRatio, Gte, num(30.0)),
            ScreeningCondition::new(RevenueGrowth2y1y, Gt, num(0.0)),
            ScreeningCondition::new(RevenueGrowth1yCy, Gt, num(0.0)),
            ScreeningCondition::new(RevenueGrowthCyNy, Gt, num(0.0)),
            ScreeningCondition::new(OperatingMargin, Gte, num(10.0)),
            ScreeningCondition::new(OpGrowth2y1y, Gt, num(0.0)),
            ScreeningCondition::new(OpGrowth1yCy, Gt, num(0.0)),
            ScreeningCondition::new(OpGrowthCyNy, Gt, num(0.0)),
            ScreeningCondition::new(OperatingCf, Gt, num(0.0)),
            ScreeningCondition::new(FreeCf, Gt, num(0.0)),
            ScreeningCondition::new(ListingDate, Gt, Threshold::Text("2012-12-01".to_string())),
            ScreeningCondition::new(Roa, Gt, num(4.5)),
            ScreeningCondition::new(PerForward, Lt, num(40.0)),
            ScreeningCondition::new(Pbr, Lt, num(10.0)),
            ScreeningCondition::new(DividendYield, Gte, num(0.0)).report_only(),
        ])
    }
}
