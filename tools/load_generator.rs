//! Load Generator
//!
//! Posts synthetic subscription customers to a running churn risk service.
//!
//! Usage: `load-generator [url] [count] [at_risk_rate] [delay_ms]`
//! with the API key taken from `CHURN_API_KEY`.

use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

/// Customer record in the `subscription-v1` layout
#[derive(Debug, Clone, Serialize)]
struct Customer {
    #[serde(rename = "CustomerID")]
    customer_id: String,
    #[serde(rename = "Age")]
    age: u32,
    #[serde(rename = "Tenure")]
    tenure: u32,
    #[serde(rename = "Usage_Frequency")]
    usage_frequency: u32,
    #[serde(rename = "Support_Calls")]
    support_calls: u32,
    #[serde(rename = "Payment_Delay")]
    payment_delay: u32,
    #[serde(rename = "Contract_Length")]
    contract_length: u32,
    #[serde(rename = "Total_Spend")]
    total_spend: f64,
    #[serde(rename = "Gender")]
    gender: String,
    #[serde(rename = "Subscription_Type")]
    subscription_type: String,
    #[serde(rename = "Last_Interaction")]
    last_interaction: String,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    churn_probability: f64,
    risk_tier: String,
}

/// Customer generator for load testing
struct CustomerGenerator {
    rng: rand::rngs::ThreadRng,
    customer_counter: u64,
}

impl CustomerGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            customer_counter: 0,
        }
    }

    /// Long-tenured, engaged customer
    fn generate_loyal(&mut self) -> Customer {
        self.customer_counter += 1;
        let contract_length = *self.random_choice(&[12, 24]);
        Customer {
            customer_id: format!("C{:08}", self.customer_counter),
            age: self.rng.gen_range(25..60),
            tenure: self.rng.gen_range(24..60),
            usage_frequency: self.rng.gen_range(15..30),
            support_calls: self.rng.gen_range(0..3),
            payment_delay: self.rng.gen_range(0..10),
            contract_length,
            total_spend: (self.rng.gen_range(500.0..1000.0_f64) * 100.0).round() / 100.0,
            gender: self.random_choice(&["Female", "Male"]).to_string(),
            subscription_type: self
                .random_choice(&["Basic", "Premium", "Standard"])
                .to_string(),
            last_interaction: self.days_ago(1..10),
        }
    }

    /// Short-tenured customer with frequent support calls and late payments
    fn generate_at_risk(&mut self) -> Customer {
        self.customer_counter += 1;
        Customer {
            customer_id: format!("C{:08}", self.customer_counter),
            age: self.rng.gen_range(18..65),
            tenure: self.rng.gen_range(1..12),
            usage_frequency: self.rng.gen_range(1..8),
            support_calls: self.rng.gen_range(5..11),
            payment_delay: self.rng.gen_range(15..31),
            contract_length: 1,
            total_spend: (self.rng.gen_range(100.0..400.0_f64) * 100.0).round() / 100.0,
            gender: self.random_choice(&["Female", "Male"]).to_string(),
            subscription_type: "Basic".to_string(),
            last_interaction: self.days_ago(20..31),
        }
    }

    fn days_ago(&mut self, range: std::ops::Range<i64>) -> String {
        let date = Utc::now().date_naive() - ChronoDuration::days(self.rng.gen_range(range));
        date.format("%Y-%m-%d").to_string()
    }

    fn random_choice<'a, T>(&mut self, choices: &'a [T]) -> &'a T {
        &choices[self.rng.gen_range(0..choices.len())]
    }

    fn generate(&mut self, at_risk_rate: f64) -> (Customer, bool) {
        if self.rng.gen_bool(at_risk_rate) {
            (self.generate_at_risk(), true)
        } else {
            (self.generate_loyal(), false)
        }
    }
}

/// Outcome tally for one run
#[derive(Debug, Default)]
struct RunStats {
    tiers: BTreeMap<String, u64>,
    loyal_count: u64,
    at_risk_count: u64,
    failures: u64,
    loyal_probability: f64,
    at_risk_probability: f64,
}

impl RunStats {
    /// Tally a successful response body; unparseable bodies count as failures
    fn record_body(&mut self, body: &[u8], at_risk: bool) {
        match serde_json::from_slice::<Prediction>(body) {
            Ok(prediction) => self.record_prediction(prediction, at_risk),
            Err(e) => {
                self.failures += 1;
                warn!(error = %e, "Unreadable prediction response");
            }
        }
    }

    fn record_prediction(&mut self, prediction: Prediction, at_risk: bool) {
        *self.tiers.entry(prediction.risk_tier).or_insert(0) += 1;
        if at_risk {
            self.at_risk_count += 1;
            self.at_risk_probability += prediction.churn_probability;
        } else {
            self.loyal_count += 1;
            self.loyal_probability += prediction.churn_probability;
        }
    }

    fn mean_loyal(&self) -> f64 {
        mean(self.loyal_probability, self.loyal_count)
    }

    fn mean_at_risk(&self) -> f64 {
        mean(self.at_risk_probability, self.at_risk_count)
    }
}

fn mean(sum: f64, n: u64) -> f64 {
    if n > 0 {
        sum / n as f64
    } else {
        0.0
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("load_generator=info".parse()?),
        )
        .init();

    info!("Starting Load Generator");

    let args: Vec<String> = std::env::args().collect();
    let base_url = args
        .get(1)
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or_else(|| "http://localhost:5000".to_string());
    let count: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100);
    let at_risk_rate: f64 = args
        .get(3)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.2_f64)
        .clamp(0.0, 1.0);
    let delay_ms: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(100);
    let api_key = std::env::var("CHURN_API_KEY").unwrap_or_default();

    info!(
        url = %base_url,
        count = count,
        at_risk_rate = at_risk_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    if let Err(e) = client.get(format!("{}/", base_url)).send().await {
        warn!(error = %e, "Service unreachable. Running in dry-run mode.");
        return run_dry_mode(count, at_risk_rate, delay_ms).await;
    }

    let mut generator = CustomerGenerator::new();
    let mut stats = RunStats::default();

    for i in 0..count {
        let (customer, at_risk) = generator.generate(at_risk_rate);

        let response = client
            .post(format!("{}/predict", base_url))
            .header("x-api-key", &api_key)
            .json(&customer)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                Ok(body) => stats.record_body(&body, at_risk),
                Err(e) => {
                    stats.failures += 1;
                    warn!(error = %e, "Failed to read prediction response");
                }
            },
            Ok(resp) => {
                stats.failures += 1;
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                warn!(status = %status, body = %body, "Prediction rejected");
            }
            Err(e) => {
                stats.failures += 1;
                warn!(error = %e, "Request failed");
            }
        }

        if (i + 1) % 10 == 0 {
            info!(
                "Sent {}/{} customers ({} loyal, {} at-risk, {} failed)",
                i + 1,
                count,
                stats.loyal_count,
                stats.at_risk_count,
                stats.failures
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        tiers = ?stats.tiers,
        failures = stats.failures,
        mean_loyal = format!("{:.3}", stats.mean_loyal()),
        mean_at_risk = format!("{:.3}", stats.mean_at_risk()),
        "Completed {} requests",
        count
    );

    Ok(())
}

async fn run_dry_mode(count: u64, at_risk_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no service connection)");

    let mut generator = CustomerGenerator::new();

    for i in 0..count {
        let (customer, _) = generator.generate(at_risk_rate);
        let json = serde_json::to_string_pretty(&customer)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample customer {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_body_counts_as_failure() {
        let mut stats = RunStats::default();

        stats.record_body(br#"{"churn_probability": 0.8, "risk_tier": "High"}"#, true);
        stats.record_body(b"<html>proxy error</html>", false);
        stats.record_body(br#"{"churn_probability": 0.1, "risk_tier": "Low"}"#, false);

        assert_eq!(stats.failures, 1);
        assert_eq!(stats.at_risk_count, 1);
        assert_eq!(stats.loyal_count, 1);
        assert_eq!(stats.tiers.get("High"), Some(&1));
        assert!((stats.mean_loyal() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_generated_customers_use_service_field_names() {
        let mut generator = CustomerGenerator::new();
        let value = serde_json::to_value(generator.generate_at_risk()).unwrap();
        for field in ["CustomerID", "Usage_Frequency", "Support_Calls", "Last_Interaction"] {
            assert!(value.get(field).is_some(), "missing {}", field);
        }
        assert!(value["Support_Calls"].as_u64().unwrap() >= 5);
    }
}
