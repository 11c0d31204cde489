use crate::models::transactions::{ProviderInvoice, ProviderPayout};

use anyhow::bail;
use serde::de::DeserializeOwned;
use serde_json::json;

/// Client for the payment provider handling deposits and payouts.
#[derive(Clone)]
pub struct PaymentGateway {
    auth_token: String,
    url: String,
    client: reqwest::Client,
}

impl PaymentGateway {
    pub fn new(auth_token: String, url: String) -> Self {
        Self {
            auth_token,
            url: url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn create_invoice(
        &self,
        amount_in_cents: i64,
        reference: &str,
    ) -> Result<ProviderInvoice, anyhow::Error> {
        let payload = json!({
            "amountInCents": amount_in_cents,
            "reference": reference
        });

        self.post("api/invoices", reference, &payload).await
    }

    pub async fn create_payout(
        &self,
        amount_in_cents: i64,
        destination: &str,
        reference: &str,
    ) -> Result<ProviderPayout, anyhow::Error> {
        let payload = json!({
            "amountInCents": amount_in_cents,
            "destination": destination,
            "reference": reference
        });

        self.post("api/payouts", reference, &payload).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        nonce: &str,
        payload: &serde_json::Value,
    ) -> Result<T, anyhow::Error> {
        let response = self
            .client
            .post(format!("{}/{}", self.url, path))
            .bearer_auth(&self.auth_token)
            .header("X-Nonce", nonce)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            bail!("Payment provider returned {}: {}", status, body);
        }

        parse_envelope(&body)
    }
}

fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T, anyhow::Error> {
    let response_json: serde_json::Value = serde_json::from_str(body)?;
    match response_json.get("response") {
        Some(r) => Ok(serde_json::from_value(r.clone())?),
        None => bail!("Payment provider: bad response format."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_invoice_envelope() {
        let invoice: ProviderInvoice = parse_envelope(
            r#"{"response": {"id": "inv-7", "paymentUrl": "https://pay.example/inv-7"}}"#,
        )
        .unwrap();
        assert_eq!(invoice.id, "inv-7");
        assert_eq!(invoice.payment_url, "https://pay.example/inv-7");
    }

    #[test]
    fn rejects_missing_envelope() {
        let result: Result<ProviderPayout, _> = parse_envelope(r#"{"id": "p-1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn trims_trailing_slash() {
        let gateway = PaymentGateway::new("t".to_string(), "https://pay.example/".to_string());
        assert_eq!(gateway.url, "https://pay.example");
    }
}
