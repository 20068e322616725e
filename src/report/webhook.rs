//! Webhook report: one embed summarizing the run.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::classifier::format_amount;
use crate::coordinator::RunSummary;
use crate::error::ReportError;
use crate::report::{ReportSink, format_duration};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Embed field values are capped by the receiving service.
const FIELD_LIMIT: usize = 1024;
const COLOR_OK: u32 = 0x2e_cc_71;
const COLOR_PARTIAL: u32 = 0xf1_c4_0f;
const COLOR_FAILED: u32 = 0xe7_4c_3c;

pub struct WebhookReport {
    client: Client,
    url: SecretString,
}

impl WebhookReport {
    pub fn new(url: SecretString) -> Result<Self, ReportError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ReportSink for WebhookReport {
    async fn deliver(&self, summary: &RunSummary) -> Result<(), ReportError> {
        let response = self
            .client
            .post(self.url.expose_secret())
            .json(&payload(summary))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::Rejected {
                status: status.as_u16(),
            });
        }
        tracing::info!(run_id = %summary.run_id, "report delivered");
        Ok(())
    }
}

fn truncate(mut text: String) -> String {
    if text.len() > FIELD_LIMIT {
        let mut cut = FIELD_LIMIT - 3;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}

fn field(name: &str, value: String) -> Value {
    json!({ "name": name, "value": truncate(value), "inline": false })
}

/// Embed payload for `summary`.
pub fn payload(summary: &RunSummary) -> Value {
    let tally = &summary.tally;
    let color = match (tally.succeeded(), tally.total()) {
        (ok, total) if ok == total => COLOR_OK,
        (0, _) => COLOR_FAILED,
        _ => COLOR_PARTIAL,
    };

    let mut fields = vec![field(
        "Statistics",
        format!(
            "Success rate: {:.1}% ({}/{})\nDuration: {}\nPer account: {}",
            summary.success_rate(),
            tally.succeeded(),
            tally.total(),
            format_duration(summary.elapsed),
            format_duration(summary.per_account())
        ),
    )];

    let analytics: Vec<String> = tally
        .tier_totals()
        .into_iter()
        .filter(|(_, totals)| totals.collected > 0)
        .map(|(tier, totals)| {
            format!(
                "{tier}: {} collected, {} commission ({} accounts)",
                format_amount(totals.collected),
                format_amount(totals.commission),
                totals.accounts
            )
        })
        .collect();
    if !analytics.is_empty() {
        fields.push(field("Collection", analytics.join("\n")));
    }

    let cooldowns: Vec<String> = tally
        .cooldowns()
        .flat_map(|report| {
            report
                .lines()
                .into_iter()
                .map(move |line| format!("{}: {line}", report.account))
        })
        .collect();
    if !cooldowns.is_empty() {
        fields.push(field("Cooldowns", cooldowns.join("\n")));
    }

    let failures: Vec<String> = tally
        .failures()
        .map(|failure| format!("{}: {}", failure.account, failure.reason))
        .collect();
    if !failures.is_empty() {
        fields.push(field("Failed operations", failures.join("\n")));
    }

    let errors: Vec<String> = tally
        .errors()
        .map(|(account, message)| format!("{account}: {message}"))
        .collect();
    if !errors.is_empty() {
        fields.push(field("Errors", errors.join("\n")));
    }

    json!({
        "embeds": [{
            "title": "Farmhand run report",
            "color": color,
            "fields": fields,
            "footer": { "text": format!("run {}", summary.run_id) },
            "timestamp": summary.started_at.to_rfc3339(),
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_summary;

    #[test]
    fn payload_lists_sections_with_content() {
        let value = payload(&sample_summary());
        let embed = &value["embeds"][0];
        assert_eq!(embed["color"], COLOR_PARTIAL);
        let names: Vec<&str> = embed["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec!["Statistics", "Collection", "Failed operations", "Errors"]
        );
        let stats = embed["fields"][0]["value"].as_str().unwrap();
        assert!(stats.starts_with("Success rate: 50.0% (1/2)"));
    }

    #[test]
    fn long_fields_are_truncated_on_char_boundary() {
        let text = "é".repeat(FIELD_LIMIT);
        let cut = truncate(text);
        assert!(cut.len() <= FIELD_LIMIT);
        assert!(cut.ends_with("..."));
    }
}
