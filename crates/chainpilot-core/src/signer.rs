use crate::config::SignerConfig;
use crate::error::{PilotError, Result};
use crate::types::PreparedTransaction;
use alloy_primitives::Bytes;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    pub status: u16,
    #[serde(default)]
    pub signed_transaction: Option<Bytes>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SignResponse {
    /// The signed payload, or a signing error describing why there is none.
    pub fn into_signed(self) -> Result<Bytes> {
        if self.status != 200 {
            return Err(PilotError::Signing(format!(
                "signer responded with status {}{}",
                self.status,
                self.error.map(|e| format!(": {e}")).unwrap_or_default()
            )));
        }
        self.signed_transaction
            .ok_or_else(|| PilotError::Signing("signer returned no signed transaction".into()))
    }
}

/// External service holding key material for logical wallet ids.
#[async_trait]
pub trait CustodialSigner: Send + Sync {
    async fn sign(&self, wallet_id: &str, tx: &PreparedTransaction) -> Result<SignResponse>;
}

pub struct HttpCustodialSigner {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCustodialSigner {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    pub fn from_config(config: &SignerConfig) -> Self {
        Self::new(config.base_url.clone(), config.api_key())
    }
}

#[async_trait]
impl CustodialSigner for HttpCustodialSigner {
    async fn sign(&self, wallet_id: &str, tx: &PreparedTransaction) -> Result<SignResponse> {
        if self.base_url.is_empty() {
            return Err(PilotError::Signing("signer.base_url is not configured".into()));
        }
        let url = format!(
            "{}/v1/w3s/developer/sign/transaction",
            self.base_url.trim_end_matches('/')
        );
        let body = json!({
            "walletId": wallet_id,
            "transaction": serde_json::to_string(tx)?,
        });
        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| PilotError::Signing(e.to_string()))?;
        let status = response.status().as_u16();
        let payload: Value = response.json().await.unwrap_or(Value::Null);
        let signed_transaction = payload
            .pointer("/data/signedTransaction")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<Bytes>().ok());
        let error = payload
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(SignResponse {
            status,
            signed_transaction,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GasParameters, UnsignedTransaction};
    use alloy_primitives::{Address, U256};
    use mockito::Matcher;

    fn prepared() -> PreparedTransaction {
        PreparedTransaction {
            transaction: UnsignedTransaction {
                chain_id: 1,
                from: Address::repeat_byte(1),
                to: Address::repeat_byte(2),
                value: U256::from(1u64),
                data: Bytes::new(),
            },
            gas: GasParameters {
                nonce: 3,
                gas_limit: 21_000,
                max_fee_per_gas: 2_000_000_000,
                max_priority_fee_per_gas: 1_000_000_000,
            },
        }
    }

    #[tokio::test]
    async fn signs_through_http_api() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/w3s/developer/sign/transaction")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJson(json!({"walletId": "w-1"})))
            .with_status(200)
            .with_body(r#"{"data":{"signedTransaction":"0x02f86b"}}"#)
            .create_async()
            .await;
        let signer = HttpCustodialSigner::new(server.url(), Some("secret".into()));
        let response = signer.sign("w-1", &prepared()).await.unwrap();
        mock.assert_async().await;
        assert_eq!(response.into_signed().unwrap(), Bytes::from(vec![0x02, 0xf8, 0x6b]));
    }

    #[tokio::test]
    async fn non_success_status_is_a_signing_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/w3s/developer/sign/transaction")
            .with_status(403)
            .with_body(r#"{"message":"wallet frozen"}"#)
            .create_async()
            .await;
        let signer = HttpCustodialSigner::new(server.url(), None);
        let err = signer
            .sign("w-1", &prepared())
            .await
            .unwrap()
            .into_signed()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "signing failed: signer responded with status 403: wallet frozen"
        );
    }

    #[tokio::test]
    async fn unconfigured_signer_refuses() {
        let signer = HttpCustodialSigner::new("", None);
        assert!(matches!(
            signer.sign("w", &prepared()).await,
            Err(PilotError::Signing(_))
        ));
    }
}
