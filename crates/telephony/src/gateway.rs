//! Outbound gateway REST client

use std::time::Duration;

use serde::Deserialize;

use crate::credentials::PhoneCredentials;
use crate::TelephonyError;

/// Fields of a `/Calls/connect` request
#[derive(Debug, Clone)]
pub struct PlaceCallRequest {
    pub from: String,
    pub to: String,
    pub caller_id: String,
    /// Webhook URL the provider posts status transitions to
    pub status_callback: String,
    /// Opaque value echoed back on webhooks; carries the session uuid
    pub custom_field: String,
}

/// Provider response to a successful dial
#[derive(Debug, Clone, Deserialize)]
pub struct PlacedCall {
    /// Provider-assigned call id
    #[serde(rename = "Sid", alias = "sid", alias = "call_sid")]
    pub sid: String,
    #[serde(rename = "Status", alias = "status", default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct CallEnvelope {
    #[serde(rename = "Call", alias = "call")]
    call: PlacedCall,
}

/// Gateway HTTP client. Credentials are per-phone; one client serves all
/// phones.
#[derive(Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(request_timeout: Duration) -> Result<Self, TelephonyError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TelephonyError::Request(e.to_string()))?;
        Ok(Self { client })
    }

    /// Place an outbound call. Returns the provider-assigned call id.
    pub async fn place_call(
        &self,
        credentials: &PhoneCredentials,
        request: &PlaceCallRequest,
    ) -> Result<PlacedCall, TelephonyError> {
        let url = format!(
            "https://{}/v1/Accounts/{}/Calls/connect",
            credentials.subdomain, credentials.account_sid
        );

        let form = [
            ("From", request.from.as_str()),
            ("To", request.to.as_str()),
            ("CallerId", request.caller_id.as_str()),
            ("CallType", "trans"),
            ("StatusCallback", request.status_callback.as_str()),
            ("CustomField", request.custom_field.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&credentials.api_key, Some(&credentials.api_token))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                to = %request.to,
                status = status.as_u16(),
                "Gateway rejected dial"
            );
            return Err(TelephonyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // Some deployments wrap the call object, some return it bare.
        let body = response.text().await?;
        let placed = serde_json::from_str::<CallEnvelope>(&body)
            .map(|e| e.call)
            .or_else(|_| serde_json::from_str::<PlacedCall>(&body))
            .map_err(|e| TelephonyError::Request(format!("unparseable dial response: {}", e)))?;

        tracing::info!(to = %request.to, call_sid = %placed.sid, "Call placed");
        Ok(placed)
    }

    /// Terminate a live call at the provider
    pub async fn hangup(
        &self,
        credentials: &PhoneCredentials,
        external_call_id: &str,
    ) -> Result<(), TelephonyError> {
        let url = format!(
            "https://{}/v1/Accounts/{}/Calls/{}",
            credentials.subdomain, credentials.account_sid, external_call_id
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(&credentials.api_key, Some(&credentials.api_token))
            .form(&[("Status", "completed")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placed_call_field_aliases() {
        let bare: PlacedCall =
            serde_json::from_str(r#"{"Sid": "abc123", "Status": "queued"}"#).unwrap();
        assert_eq!(bare.sid, "abc123");

        let lower: PlacedCall = serde_json::from_str(r#"{"sid": "xyz"}"#).unwrap();
        assert_eq!(lower.sid, "xyz");
        assert!(lower.status.is_empty());

        let wrapped: CallEnvelope =
            serde_json::from_str(r#"{"Call": {"Sid": "wrapped", "Status": "in-progress"}}"#)
                .unwrap();
        assert_eq!(wrapped.call.sid, "wrapped");
    }
}
