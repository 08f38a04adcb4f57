//! Payment gateway seam and the Flutterwave implementation.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Errors from the payment gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Gateway unreachable (includes timeouts)
    #[error("network error: {0}")]
    Network(String),

    #[error("gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub email: String,
    pub phone: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub tx_ref: String,
    pub amount: u64,
    pub currency: String,
    pub customer: Customer,
    pub redirect_url: String,
    pub title: String,
    pub description: String,
}

/// A hosted checkout the user is sent to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub tx_ref: String,
    pub payment_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub succeeded: bool,
    /// Raw gateway status string
    pub status: String,
    pub amount: f64,
    pub currency: String,
    pub gateway_tx_id: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn id(&self) -> &str;

    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, GatewayError>;

    async fn verify(&self, tx_ref: &str) -> Result<Verification, GatewayError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlutterwaveConfig {
    pub secret_key: String,
    pub base_url: String,
    pub payment_options: String,
    pub logo_url: Option<String>,
    pub timeout_ms: u64,
}

impl FlutterwaveConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            base_url: "https://api.flutterwave.com/v3".to_string(),
            payment_options: "mobilemoneyuganda".to_string(),
            logo_url: None,
            timeout_ms: 30_000,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Flutterwave v3 Standard checkout.
pub struct FlutterwaveGateway {
    client: Client,
    config: FlutterwaveConfig,
}

impl FlutterwaveGateway {
    pub fn new(config: FlutterwaveConfig) -> Result<Self, GatewayError> {
        if config.secret_key.is_empty() {
            return Err(GatewayError::Config("Flutterwave secret key is empty".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn rejected(response: reqwest::Response) -> GatewayError {
        let status = response.status();
        let message = match response.json::<Envelope<serde_json::Value>>().await {
            Ok(env) => env.message,
            Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
        };
        GatewayError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[derive(Serialize)]
struct PaymentRequest<'a> {
    tx_ref: &'a str,
    amount: u64,
    currency: &'a str,
    redirect_url: &'a str,
    payment_options: &'a str,
    customer: CustomerBody<'a>,
    customizations: Customizations<'a>,
}

#[derive(Serialize)]
struct CustomerBody<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phonenumber: Option<&'a str>,
    name: &'a str,
}

#[derive(Serialize)]
struct Customizations<'a> {
    title: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    logo: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PaymentLink {
    link: String,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    id: Option<u64>,
    status: String,
    amount: f64,
    currency: String,
}

#[async_trait]
impl PaymentGateway for FlutterwaveGateway {
    fn id(&self) -> &str {
        "flutterwave"
    }

    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, GatewayError> {
        let body = PaymentRequest {
            tx_ref: &request.tx_ref,
            amount: request.amount,
            currency: &request.currency,
            redirect_url: &request.redirect_url,
            payment_options: &self.config.payment_options,
            customer: CustomerBody {
                email: &request.customer.email,
                phonenumber: request.customer.phone.as_deref(),
                name: &request.customer.name,
            },
            customizations: Customizations {
                title: &request.title,
                description: &request.description,
                logo: self.config.logo_url.as_deref(),
            },
        };

        let response = self
            .client
            .post(self.url("payments"))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.secret_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let envelope: Envelope<PaymentLink> = response.json().await?;
        match (envelope.status.as_str(), envelope.data) {
            ("success", Some(data)) => {
                debug!(tx_ref = %request.tx_ref, "Payment link created");
                Ok(Charge {
                    tx_ref: request.tx_ref.clone(),
                    payment_url: data.link,
                })
            }
            _ => Err(GatewayError::Rejected {
                status: StatusCode::OK.as_u16(),
                message: envelope.message,
            }),
        }
    }

    async fn verify(&self, tx_ref: &str) -> Result<Verification, GatewayError> {
        let response = self
            .client
            .get(self.url("transactions/verify_by_reference"))
            .query(&[("tx_ref", tx_ref)])
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.secret_key))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let envelope: Envelope<TransactionData> = response.json().await?;
        let data = envelope
            .data
            .ok_or_else(|| GatewayError::Parse("verification response has no data".into()))?;

        Ok(Verification {
            succeeded: envelope.status == "success" && data.status == "successful",
            status: data.status,
            amount: data.amount,
            currency: data.currency,
            gateway_tx_id: data.id.map(|id| id.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer) -> FlutterwaveGateway {
        FlutterwaveGateway::new(FlutterwaveConfig::new("FLWSECK_TEST").with_base_url(server.uri()))
            .unwrap()
    }

    fn charge_request() -> ChargeRequest {
        ChargeRequest {
            tx_ref: "TUG-1-u1".into(),
            amount: 25_000,
            currency: "UGX".into(),
            customer: Customer {
                email: "0772123456@tutorug.com".into(),
                phone: Some("0772123456".into()),
                name: "Amina".into(),
            },
            redirect_url: "http://localhost:3000/payment/success".into(),
            title: "TutorUG Subscription".into(),
            description: "Monthly Plan".into(),
        }
    }

    #[tokio::test]
    async fn test_create_charge_returns_link() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payments"))
            .and(header("authorization", "Bearer FLWSECK_TEST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "message": "Hosted Link",
                "data": { "link": "https://checkout.flutterwave.com/v3/hosted/pay/abc" }
            })))
            .mount(&server)
            .await;

        let charge = gateway(&server).create_charge(&charge_request()).await.unwrap();
        assert_eq!(charge.payment_url, "https://checkout.flutterwave.com/v3/hosted/pay/abc");
    }

    #[tokio::test]
    async fn test_verify_successful_transaction() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transactions/verify_by_reference"))
            .and(query_param("tx_ref", "TUG-1-u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "message": "Transaction fetched successfully",
                "data": { "id": 4975363, "status": "successful", "amount": 25000, "currency": "UGX" }
            })))
            .mount(&server)
            .await;

        let v = gateway(&server).verify("TUG-1-u1").await.unwrap();
        assert!(v.succeeded);
        assert_eq!(v.amount, 25_000.0);
        assert_eq!(v.gateway_tx_id.as_deref(), Some("4975363"));
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "status": "error",
                "message": "Service unavailable",
                "data": null
            })))
            .mount(&server)
            .await;

        let err = gateway(&server).verify("TUG-1-u1").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, GatewayError::Rejected { status: 503, .. }));
    }
}
