use std::time::Duration;

use alloy::primitives::B256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConnectorError;

/// Signature as returned by the threshold-signing service. The recovery id
/// arrives under one of three names depending on the service build; it is
/// normalized exactly once, at this boundary (see `normalize`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawThresholdSignature {
    pub r: String,
    pub s: String,
    #[serde(default)]
    pub recid: Option<u8>,
    #[serde(default, rename = "recoveryParam")]
    pub recovery_param: Option<u8>,
    #[serde(default)]
    pub v: Option<u64>,
}

/// The single capability the external threshold signer exposes: sign one
/// 32-byte digest under one key handle. Asynchronous, single-shot.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait ThresholdSigner: Send + Sync {
    async fn sign_digest(&self, digest: B256, key_handle: &str) -> Result<RawThresholdSignature, ConnectorError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest<'a> {
    hash: String,
    key_handle: &'a str,
}

/// HTTP client for the signing service. The request timeout is the only
/// liveness bound signing gets; a timeout surfaces as an ordinary
/// per-member signing failure.
#[derive(Debug, Clone)]
pub struct HttpThresholdSigner {
    client: reqwest::Client,
    sign_url: String,
}

impl HttpThresholdSigner {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectorError::signer(format!("build http client: {e}")))?;
        Ok(Self {
            client,
            sign_url: format!("{}/sign", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ThresholdSigner for HttpThresholdSigner {
    async fn sign_digest(&self, digest: B256, key_handle: &str) -> Result<RawThresholdSignature, ConnectorError> {
        let request = SignRequest {
            hash: format!("{digest:#x}"),
            key_handle,
        };

        let response = self
            .client
            .post(&self.sign_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ConnectorError::signer(format!("sign request failed: {e}")))?
            .error_for_status()
            .map_err(|e| ConnectorError::signer(format!("sign request rejected: {e}")))?;

        response
            .json::<RawThresholdSignature>()
            .await
            .map_err(|e| ConnectorError::signer(format!("unparsable sign response: {e}")))
    }
}
