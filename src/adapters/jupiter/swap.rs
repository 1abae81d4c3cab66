//! Jupiter Swap Types
//!
//! Request and response structures for the Jupiter swap-transaction API.

use serde::{Deserialize, Serialize};

/// Body for `POST /swap`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTxRequest {
    /// Wallet that signs and pays
    pub user_public_key: String,
    /// The full quote response from /quote
    pub quote_response: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prioritization_fee_lamports: Option<u64>,
    #[serde(default = "default_true")]
    pub dynamic_compute_unit_limit: bool,
    /// Wrap and unwrap SOL around the swap
    #[serde(default = "default_true")]
    pub wrap_and_unwrap_sol: bool,
}

fn default_true() -> bool {
    true
}

impl SwapTxRequest {
    pub fn new(user_public_key: String, quote_response: serde_json::Value) -> Self {
        Self {
            user_public_key,
            quote_response,
            prioritization_fee_lamports: None,
            dynamic_compute_unit_limit: true,
            wrap_and_unwrap_sol: true,
        }
    }

    pub fn with_priority_fee(mut self, lamports: Option<u64>) -> Self {
        self.prioritization_fee_lamports = lamports;
        self
    }
}

/// Response from `POST /swap`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTxResponse {
    /// Base64 encoded unsigned versioned transaction
    pub swap_transaction: String,
    pub last_valid_block_height: u64,
    #[serde(default)]
    pub prioritization_fee_lamports: u64,
}

impl SwapTxResponse {
    pub fn transaction_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.decode(&self.swap_transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_request_serialization() {
        let quote = serde_json::json!({"inAmount": "10000"});
        let req = SwapTxRequest::new("wallet123".to_string(), quote).with_priority_fee(Some(5000));

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["userPublicKey"], "wallet123");
        assert_eq!(json["prioritizationFeeLamports"], 5000);
        assert_eq!(json["dynamicComputeUnitLimit"], true);
        assert_eq!(json["wrapAndUnwrapSol"], true);
        assert_eq!(json["quoteResponse"]["inAmount"], "10000");
    }

    #[test]
    fn test_priority_fee_omitted_when_unset() {
        let req = SwapTxRequest::new("w".to_string(), serde_json::json!({})).with_priority_fee(None);
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("prioritizationFeeLamports").is_none());
    }

    #[test]
    fn test_swap_response_parsing() {
        let json = r#"{
            "swapTransaction": "AQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=",
            "lastValidBlockHeight": 123456789,
            "prioritizationFeeLamports": 5000
        }"#;

        let response: SwapTxResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.last_valid_block_height, 123456789);
        assert!(response.transaction_bytes().is_ok());
    }

    #[test]
    fn test_swap_response_bad_base64() {
        let response = SwapTxResponse {
            swap_transaction: "%%%".to_string(),
            last_valid_block_height: 0,
            prioritization_fee_lamports: 0,
        };
        assert!(response.transaction_bytes().is_err());
    }
}
