//! Derived features for each schema version.
//!
//! A derivation whose inputs are absent produces an all-NaN column rather
//! than failing, and a zero denominator produces NaN for that row.

use crate::features::schema::SchemaVersion;
use crate::types::record::{Column, Frame};
use chrono::NaiveDate;

/// Add the schema's derived columns to `frame`.
///
/// `today` anchors the day-count features so repeated calls are reproducible.
pub fn engineer(frame: &mut Frame, schema: SchemaVersion, today: NaiveDate) {
    match schema {
        SchemaVersion::SubscriptionV1 => engineer_subscription(frame, today),
        SchemaVersion::PolicyRenewalV1 => engineer_policy_renewal(frame, today),
    }
}

fn engineer_subscription(frame: &mut Frame, today: NaiveDate) {
    let rows = frame.len();

    let usage_per_tenure = match (frame.numeric("Usage_Frequency"), frame.numeric("Tenure")) {
        (Some(usage), Some(tenure)) => ratio(usage, &offset(tenure, 1.0)),
        _ => nan_column(rows),
    };

    let spend_per_month = match (frame.numeric("Total_Spend"), frame.numeric("Contract_Length")) {
        (Some(spend), Some(contract)) => ratio(spend, &offset(contract, 1.0)),
        _ => nan_column(rows),
    };

    let days_since_last_interaction = match frame.dates("Last_Interaction") {
        Some(dates) => days_since(dates, today),
        None => nan_column(rows),
    };

    frame.set(Column::numeric("usage_per_tenure", usage_per_tenure));
    frame.set(Column::numeric("spend_per_month", spend_per_month));
    frame.set(Column::numeric(
        "days_since_last_interaction",
        days_since_last_interaction,
    ));
}

fn engineer_policy_renewal(frame: &mut Frame, today: NaiveDate) {
    let rows = frame.len();

    let premium_change_pct = match (
        frame.numeric("premium_amount"),
        frame.numeric("previous_premium_amount"),
    ) {
        (Some(current), Some(previous)) => {
            let change: Vec<f64> = current.iter().zip(previous).map(|(c, p)| c - p).collect();
            ratio(&change, previous)
        }
        _ => nan_column(rows),
    };

    let days_since_last_claim = match frame.dates("last_claim_date") {
        Some(dates) => days_since(dates, today),
        None => nan_column(rows),
    };

    let avg_claim_amount = match (
        frame.numeric("total_claim_amount"),
        frame.numeric("num_claims"),
    ) {
        (Some(total), Some(count)) => ratio(total, count),
        _ => nan_column(rows),
    };

    let loyalty_score = match (
        frame.numeric("customer_tenure"),
        frame.numeric("on_time_payments"),
        frame.numeric("delayed_payments"),
        frame.numeric("missed_payments"),
    ) {
        (Some(tenure), Some(on_time), Some(delayed), Some(missed)) => {
            let total: Vec<f64> = on_time
                .iter()
                .zip(delayed)
                .zip(missed)
                .map(|((o, d), m)| o + d + m)
                .collect();
            let payment_ratio = ratio(on_time, &total);
            tenure
                .iter()
                .zip(payment_ratio)
                .map(|(t, r)| t * r)
                .collect()
        }
        _ => nan_column(rows),
    };

    frame.set(Column::numeric("premium_change_pct", premium_change_pct));
    frame.set(Column::numeric("days_since_last_claim", days_since_last_claim));
    frame.set(Column::numeric("avg_claim_amount", avg_claim_amount));
    frame.set(Column::numeric("loyalty_score", loyalty_score));
}

/// Element-wise `num / den`, NaN where the denominator is zero
fn ratio(num: &[f64], den: &[f64]) -> Vec<f64> {
    num.iter()
        .zip(den)
        .map(|(n, d)| if *d == 0.0 { f64::NAN } else { n / d })
        .collect()
}

fn offset(values: &[f64], by: f64) -> Vec<f64> {
    values.iter().map(|v| v + by).collect()
}

fn days_since(dates: &[Option<NaiveDate>], today: NaiveDate) -> Vec<f64> {
    dates
        .iter()
        .map(|d| match d {
            Some(date) => (today - *date).num_days() as f64,
            None => f64::NAN,
        })
        .collect()
}

fn nan_column(rows: usize) -> Vec<f64> {
    vec![f64::NAN; rows]
}
