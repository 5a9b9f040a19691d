//! SMS gateway client.
//!
//! Sends auto-replies through a Twilio-compatible REST API:
//! `POST {api_base}/2010-04-01/Accounts/{sid}/Messages.json` with form fields
//! `To`, `From`, `Body` and HTTP basic auth. When no credentials are
//! configured the gateway is disabled and every send fails with
//! [`GatewayError::NotConfigured`].

use std::time::Duration;

use drivesafe_core::{GatewayError, MessagingGateway, ReplyReceipt, ReplyRequest, SmsConfig};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

/// Message resource returned by the gateway.
#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: Option<String>,
}

/// REST client for a Twilio-compatible messaging API.
#[derive(Debug, Clone)]
pub struct TwilioGateway {
    client: Client,
    messages_url: Url,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioGateway {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns an error if `api_base` is not a valid URL or the HTTP client
    /// cannot be constructed.
    pub fn new(
        api_base: &str,
        account_sid: String,
        auth_token: String,
        from_number: String,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let base = Url::parse(api_base)
            .map_err(|e| GatewayError::Transport(format!("invalid api_base '{api_base}': {e}")))?;
        let messages_url = base
            .join(&format!("2010-04-01/Accounts/{account_sid}/Messages.json"))
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            messages_url,
            account_sid,
            auth_token,
            from_number,
        })
    }

    /// Endpoint messages are posted to.
    #[must_use]
    pub const fn messages_url(&self) -> &Url {
        &self.messages_url
    }
}

impl MessagingGateway for TwilioGateway {
    async fn send(&self, request: &ReplyRequest) -> Result<ReplyReceipt, GatewayError> {
        debug!(to = %request.to, "Sending auto-reply");

        let response = self
            .client
            .post(self.messages_url.clone())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", request.to.as_str()),
                ("From", self.from_number.as_str()),
                ("Body", request.text.as_str()),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let resource: MessageResource = response
            .json()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(ReplyReceipt {
            message_id: resource.sid,
        })
    }
}

/// The gateway the server dispatches through.
#[derive(Debug, Clone)]
pub enum SmsGateway {
    /// Credentials configured.
    Twilio(TwilioGateway),
    /// No credentials; sends fail with `NotConfigured`.
    Disabled,
}

impl SmsGateway {
    /// Build the gateway described by the `[sms]` config section.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are present but the client cannot be
    /// built.
    pub fn from_config(config: &SmsConfig) -> Result<Self, GatewayError> {
        match (&config.account_sid, &config.auth_token, &config.from_number) {
            (Some(sid), Some(token), Some(from)) => Ok(Self::Twilio(TwilioGateway::new(
                &config.api_base,
                sid.clone(),
                token.clone(),
                from.clone(),
                Duration::from_secs(config.timeout_secs),
            )?)),
            _ => Ok(Self::Disabled),
        }
    }

    /// Whether sends can succeed.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Twilio(_))
    }
}

impl MessagingGateway for SmsGateway {
    async fn send(&self, request: &ReplyRequest) -> Result<ReplyReceipt, GatewayError> {
        match self {
            Self::Twilio(gateway) => gateway.send(request).await,
            Self::Disabled => Err(GatewayError::NotConfigured),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Form;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    fn request() -> ReplyRequest {
        ReplyRequest {
            to: "+15550001111".into(),
            text: "Driving".into(),
        }
    }

    /// Serves a fake Messages endpoint and returns its base URL.
    async fn fake_gateway(status: StatusCode) -> String {
        let app = Router::new().route(
            "/2010-04-01/Accounts/AC123/Messages.json",
            post(
                move |headers: HeaderMap, Form(form): Form<HashMap<String, String>>| async move {
                    assert!(headers.contains_key("authorization"));
                    assert_eq!(form.get("From").map(String::as_str), Some("+15559990000"));
                    (
                        status,
                        Json(serde_json::json!({ "sid": "SM42", "to": form.get("To") })),
                    )
                },
            ),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn gateway(api_base: &str) -> TwilioGateway {
        TwilioGateway::new(
            api_base,
            "AC123".into(),
            "secret".into(),
            "+15559990000".into(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_messages_url() {
        let gateway = gateway("https://api.twilio.com");
        assert_eq!(
            gateway.messages_url().as_str(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }

    #[test]
    fn test_from_config_without_credentials_is_disabled() {
        let gateway = SmsGateway::from_config(&SmsConfig::default()).unwrap();
        assert!(!gateway.is_enabled());
    }

    #[test]
    fn test_invalid_api_base_is_rejected() {
        let config = SmsConfig {
            account_sid: Some("AC123".into()),
            auth_token: Some("secret".into()),
            from_number: Some("+15559990000".into()),
            api_base: "not a url".into(),
            ..SmsConfig::default()
        };
        assert!(matches!(
            SmsGateway::from_config(&config),
            Err(GatewayError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_gateway_reports_not_configured() {
        let err = SmsGateway::Disabled.send(&request()).await.unwrap_err();
        assert_eq!(err, GatewayError::NotConfigured);
    }

    #[tokio::test]
    async fn test_send_returns_message_sid() {
        let base = fake_gateway(StatusCode::CREATED).await;
        let receipt = gateway(&base).send(&request()).await.unwrap();
        assert_eq!(receipt.message_id.as_deref(), Some("SM42"));
    }

    #[tokio::test]
    async fn test_error_status_is_rejected() {
        let base = fake_gateway(StatusCode::BAD_REQUEST).await;
        let err = gateway(&base).send(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { status: 400, .. }));
    }
}
