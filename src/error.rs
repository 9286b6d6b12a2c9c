use thiserror::Error;

use crate::domain::MonthKey;

/// Reasons a bill-credit disclosure cannot be turned into a deterministic
/// rule. Every variant except `NoCredits` blocks the whole estimate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreditFailure {
    #[error("plan discloses no bill credits")]
    NoCredits,
    #[error("credit rule is missing its amount or usage range")]
    UnsupportedCreditShape,
    #[error("credit is gated on a dimension other than monthly usage")]
    UnsupportedCreditDimension,
    #[error("credit rules overlap; combined amount is ambiguous")]
    UnsupportedCreditCombination,
    #[error("credit disclosure cannot be evaluated deterministically")]
    NonDeterministicCredit,
}

impl CreditFailure {
    pub fn code(&self) -> &'static str {
        match self {
            CreditFailure::NoCredits => "NO_CREDITS",
            CreditFailure::UnsupportedCreditShape => "UNSUPPORTED_CREDIT_SHAPE",
            CreditFailure::UnsupportedCreditDimension => "UNSUPPORTED_CREDIT_DIMENSION",
            CreditFailure::UnsupportedCreditCombination => "UNSUPPORTED_CREDIT_COMBINATION",
            CreditFailure::NonDeterministicCredit => "NON_DETERMINISTIC_CREDIT",
        }
    }
}

/// Enumerated reasons an estimate is refused. The estimator never produces
/// an approximate number in place of one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimateFailure {
    #[error("month {0} is missing required usage buckets")]
    MissingRequiredBuckets(MonthKey),
    #[error("bill credits are ambiguous: {0}")]
    CreditAmbiguity(CreditFailure),
    #[error("indexed plan discloses no usable average-price anchors")]
    MissingEflAnchors,
    #[error("no delivery-charge snapshot for the plan's TDSP")]
    MissingDeliveryCharges,
    #[error("unsupported rate structure: {0}")]
    UnsupportedRateStructure(String),
    #[error("usage covers {actual} months but {expected} were requested")]
    UsageMonthsMismatch { expected: u32, actual: u32 },
    #[error("no usage months supplied")]
    NoUsage,
}

impl EstimateFailure {
    /// Stable machine-readable reason code, safe to persist and alert on.
    pub fn code(&self) -> &'static str {
        match self {
            EstimateFailure::MissingRequiredBuckets(_) => "MISSING_REQUIRED_BUCKETS",
            EstimateFailure::CreditAmbiguity(inner) => inner.code(),
            EstimateFailure::MissingEflAnchors => "MISSING_EFL_ANCHORS",
            EstimateFailure::MissingDeliveryCharges => "MISSING_DELIVERY_CHARGES",
            EstimateFailure::UnsupportedRateStructure(_) => "UNSUPPORTED_RATE_STRUCTURE",
            EstimateFailure::UsageMonthsMismatch { .. } => "USAGE_MONTHS_MISMATCH",
            EstimateFailure::NoUsage => "NO_USAGE",
        }
    }
}

impl From<CreditFailure> for EstimateFailure {
    fn from(value: CreditFailure) -> Self {
        EstimateFailure::CreditAmbiguity(value)
    }
}

/// Boundary-validation failures for rate structures arriving from the
/// extraction pipeline.
#[derive(Debug, Error)]
pub enum RateStructureError {
    #[error("malformed rate structure JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("contradictory pricing shapes: {0}")]
    ContradictoryShapes(String),
    #[error("{0} plan is missing its pricing shape")]
    MissingShape(String),
    #[error("non-finite number in {0}")]
    NonFiniteNumber(&'static str),
}
