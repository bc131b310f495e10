//! Versioned input schemas.
//!
//! Two feature-engineering contracts have existed for this model family and
//! they are not interchangeable. The model manifest names the one its
//! artifact was trained on; everything downstream branches on that.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a raw field is treated by cleaning and encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Record key, never a model input
    Identifier,
    Numeric,
    Categorical,
    Date,
    /// Training label, never a model input
    Target,
}

/// Declared raw field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

const SUBSCRIPTION_FIELDS: &[FieldSpec] = &[
    field("CustomerID", FieldKind::Identifier),
    field("Age", FieldKind::Numeric),
    field("Gender", FieldKind::Categorical),
    field("Tenure", FieldKind::Numeric),
    field("Usage_Frequency", FieldKind::Numeric),
    field("Support_Calls", FieldKind::Numeric),
    field("Payment_Delay", FieldKind::Numeric),
    field("Subscription_Type", FieldKind::Categorical),
    field("Contract_Length", FieldKind::Numeric),
    field("Total_Spend", FieldKind::Numeric),
    field("Last_Interaction", FieldKind::Date),
    field("Churn", FieldKind::Target),
];

const POLICY_RENEWAL_FIELDS: &[FieldSpec] = &[
    field("policy_id", FieldKind::Identifier),
    field("customer_id", FieldKind::Identifier),
    field("policy_type", FieldKind::Categorical),
    field("premium_amount", FieldKind::Numeric),
    field("previous_premium_amount", FieldKind::Numeric),
    field("total_claim_amount", FieldKind::Numeric),
    field("num_claims", FieldKind::Numeric),
    field("customer_tenure", FieldKind::Numeric),
    field("on_time_payments", FieldKind::Numeric),
    field("delayed_payments", FieldKind::Numeric),
    field("missed_payments", FieldKind::Numeric),
    field("last_claim_date", FieldKind::Date),
    field("renewal_date", FieldKind::Date),
    field("Churn", FieldKind::Target),
];

/// Feature-engineering contract a model artifact was trained against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaVersion {
    /// Subscription customers (usage, spend, contract)
    #[serde(rename = "subscription-v1")]
    SubscriptionV1,
    /// Insurance policy renewals (premiums, claims, payments)
    #[serde(rename = "policy-renewal-v1")]
    PolicyRenewalV1,
}

impl SchemaVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::SubscriptionV1 => "subscription-v1",
            SchemaVersion::PolicyRenewalV1 => "policy-renewal-v1",
        }
    }

    /// Raw fields a client may send
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            SchemaVersion::SubscriptionV1 => SUBSCRIPTION_FIELDS,
            SchemaVersion::PolicyRenewalV1 => POLICY_RENEWAL_FIELDS,
        }
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Columns removed before one-hot encoding
    pub fn excluded_columns(&self) -> Vec<&'static str> {
        let mut excluded: Vec<&'static str> = self
            .fields()
            .iter()
            .filter(|f| matches!(f.kind, FieldKind::Identifier | FieldKind::Target))
            .map(|f| f.name)
            .collect();
        if *self == SchemaVersion::SubscriptionV1 {
            excluded.push("Last_Interaction");
        }
        excluded
    }

    /// Names of the columns `engineer` adds
    pub fn derived_features(&self) -> &'static [&'static str] {
        match self {
            SchemaVersion::SubscriptionV1 => &[
                "usage_per_tenure",
                "spend_per_month",
                "days_since_last_interaction",
            ],
            SchemaVersion::PolicyRenewalV1 => &[
                "premium_change_pct",
                "days_since_last_claim",
                "avg_claim_amount",
                "loyalty_score",
            ],
        }
    }

    /// Entries of `names` this schema does not declare, sorted and deduplicated
    pub fn unknown_fields<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut unknown: Vec<String> = names
            .into_iter()
            .filter(|n| !self.is_declared(n))
            .map(str::to_string)
            .collect();
        unknown.sort();
        unknown.dedup();
        unknown
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
