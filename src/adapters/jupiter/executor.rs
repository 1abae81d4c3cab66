//! Jupiter swap executor
//!
//! quote -> swap transaction -> sign -> send and confirm. The fill is the
//! change in the wallet's output balance, not the quoted amount, so tokens
//! that tax or block transfers show up as a short or empty fill.
//!
//! Swaps that share a mint run one at a time. Each holds the locks of both
//! its mints from the first balance read to the last, so a concurrent swap
//! can never show up in another's balance delta.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use solana_sdk::transaction::VersionedTransaction;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::client::{JupiterClient, JupiterError};
use super::quote::QuoteRequest;
use super::swap::SwapTxRequest;
use crate::adapters::solana::{SolanaClient, SolanaClientError, WalletManager};
use crate::domain::to_base_units;
use crate::ports::{SwapError, SwapExecutor, SwapFill, SwapRequest};

/// Reads of the output balance after confirmation before declaring no fill
const FILL_READS: u32 = 3;
const FILL_READ_DELAY: Duration = Duration::from_millis(500);

/// One async lock per mint, created on first use
#[derive(Default)]
struct MintLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl MintLocks {
    /// Lock every listed mint. Locks are taken in sorted order so two swaps
    /// over the same pair of mints cannot deadlock.
    async fn acquire(&self, mints: &[&str]) -> Vec<OwnedMutexGuard<()>> {
        let mut mints = mints.to_vec();
        mints.sort_unstable();
        mints.dedup();

        let handles: Vec<Arc<AsyncMutex<()>>> = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            mints
                .iter()
                .map(|mint| Arc::clone(locks.entry((*mint).to_string()).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }
        guards
    }
}

pub struct JupiterExecutor {
    client: JupiterClient,
    rpc: SolanaClient,
    wallet: WalletManager,
    priority_fee_lamports: Option<u64>,
    decimals: Mutex<HashMap<String, u8>>,
    mint_locks: MintLocks,
}

impl JupiterExecutor {
    pub fn new(client: JupiterClient, rpc: SolanaClient, wallet: WalletManager) -> Self {
        Self {
            client,
            rpc,
            wallet,
            priority_fee_lamports: None,
            decimals: Mutex::new(HashMap::new()),
            mint_locks: MintLocks::default(),
        }
    }

    pub fn with_priority_fee(mut self, lamports: Option<u64>) -> Self {
        self.priority_fee_lamports = lamports;
        self
    }

    async fn mint_decimals(&self, mint: &str) -> Result<u8, SwapError> {
        if let Some(decimals) = self.cached_decimals(mint) {
            return Ok(decimals);
        }
        let decimals = self.rpc.get_mint_decimals(mint).await.map_err(rpc_error)?;
        self.decimals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(mint.to_string(), decimals);
        Ok(decimals)
    }

    fn cached_decimals(&self, mint: &str) -> Option<u8> {
        self.decimals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(mint)
            .copied()
    }

    async fn wallet_balance(&self, mint: &str) -> Result<Decimal, SwapError> {
        self.rpc
            .get_wallet_balance(self.wallet.pubkey(), mint)
            .await
            .map_err(rpc_error)
    }

    async fn send(&self, request: &SwapRequest, amount: u64) -> Result<String, SwapError> {
        let quote = self
            .client
            .get_quote(&QuoteRequest::new(
                request.input_mint.clone(),
                request.output_mint.clone(),
                amount,
                request.max_slippage_bps,
            ))
            .await
            .map_err(|e| jupiter_error(request, e))?;
        if quote.output_amount() == 0 {
            return Err(SwapError::NoRoute {
                input: request.input_mint.clone(),
                output: request.output_mint.clone(),
                reason: "quote returned zero output".into(),
            });
        }
        tracing::debug!(
            "Quote {} -> {}: in {} out {} via {:?}",
            request.input_mint,
            request.output_mint,
            amount,
            quote.out_amount,
            quote.route_labels()
        );

        let quote_json = serde_json::to_value(&quote).map_err(|e| SwapError::Api(e.to_string()))?;
        let built = self
            .client
            .get_swap_transaction(
                &SwapTxRequest::new(self.wallet.public_key(), quote_json).with_priority_fee(self.priority_fee_lamports),
            )
            .await
            .map_err(|e| jupiter_error(request, e))?;

        let bytes = built
            .transaction_bytes()
            .map_err(|e| SwapError::Api(format!("Invalid transaction encoding: {}", e)))?;
        let unsigned: VersionedTransaction = bincode::deserialize(&bytes)
            .map_err(|e| SwapError::Api(format!("Invalid transaction bytes: {}", e)))?;
        let signed = self
            .wallet
            .sign_versioned(unsigned)
            .map_err(|e| SwapError::Signing(e.to_string()))?;

        self.rpc.send_and_confirm_versioned(signed).await.map_err(rpc_error)
    }
}

#[async_trait]
impl SwapExecutor for JupiterExecutor {
    async fn swap(&self, request: &SwapRequest) -> Result<SwapFill, SwapError> {
        let input_decimals = self.mint_decimals(&request.input_mint).await?;
        // Resolved up front so an unknown output mint fails before anything is sent
        self.mint_decimals(&request.output_mint).await?;

        let amount = to_base_units(request.amount, input_decimals)
            .filter(|units| *units > 0)
            .ok_or_else(|| SwapError::InvalidAmount(format!("{} of {}", request.amount, request.input_mint)))?;

        let _held = self
            .mint_locks
            .acquire(&[request.input_mint.as_str(), request.output_mint.as_str()])
            .await;

        let available = self.wallet_balance(&request.input_mint).await?;
        if available < request.amount {
            return Err(SwapError::InsufficientFunds {
                needed: request.amount,
                available,
            });
        }

        let before = self.wallet_balance(&request.output_mint).await?;
        let signature = self.send(request, amount).await?;
        tracing::info!("Swap confirmed: {}", signature);

        for read in 0..FILL_READS {
            let after = self.wallet_balance(&request.output_mint).await?;
            let filled = after - before;
            if filled > Decimal::ZERO {
                return Ok(SwapFill {
                    filled_quantity: filled,
                    signature: Some(signature),
                });
            }
            if read + 1 < FILL_READS {
                tokio::time::sleep(FILL_READ_DELAY).await;
            }
        }

        tracing::warn!("Swap {} confirmed but output balance of {} did not grow", signature, request.output_mint);
        Err(SwapError::NoFill)
    }
}

fn jupiter_error(request: &SwapRequest, err: JupiterError) -> SwapError {
    match err {
        JupiterError::NoRoute(reason) => SwapError::NoRoute {
            input: request.input_mint.clone(),
            output: request.output_mint.clone(),
            reason,
        },
        JupiterError::SlippageExceeded => SwapError::SlippageExceeded,
        JupiterError::RateLimited => SwapError::Rejected("rate limited".into()),
        other => SwapError::Api(other.to_string()),
    }
}

fn rpc_error(err: SolanaClientError) -> SwapError {
    match err {
        SolanaClientError::TransactionError(msg) if msg.contains("6001") || msg.contains("0x1771") => {
            SwapError::SlippageExceeded
        }
        SolanaClientError::TransactionError(msg) => SwapError::Transaction(msg),
        SolanaClientError::InvalidPublicKey(key) => SwapError::InvalidAmount(format!("invalid mint {}", key)),
        other => SwapError::Api(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::jupiter::JupiterConfig;
    use crate::domain::NATIVE_SOL_MINT;
    use rust_decimal_macros::dec;

    fn executor() -> JupiterExecutor {
        JupiterExecutor::new(
            JupiterClient::with_config(JupiterConfig::default()).unwrap(),
            SolanaClient::new("http://127.0.0.1:1".to_string()),
            WalletManager::new_random(),
        )
    }

    #[tokio::test]
    async fn test_sub_unit_amount_is_invalid() {
        // SOL decimals never touch the RPC, so this fails before any network call
        let request = SwapRequest::new(NATIVE_SOL_MINT, NATIVE_SOL_MINT, dec!(0.0000000001), 300);
        let result = executor().swap(&request).await;
        assert!(matches!(result, Err(SwapError::InvalidAmount(_))));
    }

    #[test]
    fn test_error_mapping() {
        let request = SwapRequest::new("In", "Out", dec!(1), 300);
        match jupiter_error(&request, JupiterError::NoRoute("none".into())) {
            SwapError::NoRoute { input, output, .. } => {
                assert_eq!(input, "In");
                assert_eq!(output, "Out");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            rpc_error(SolanaClientError::TransactionError("custom program error: 0x1771".into())),
            SwapError::SlippageExceeded
        ));
        assert!(matches!(
            rpc_error(SolanaClientError::TransactionError("blockhash expired".into())),
            SwapError::Transaction(_)
        ));
    }

    #[test]
    fn test_decimals_cache() {
        let exec = executor();
        assert!(exec.cached_decimals("Mint").is_none());
        exec.decimals.lock().unwrap().insert("Mint".into(), 6);
        assert_eq!(exec.cached_decimals("Mint"), Some(6));
    }

    #[tokio::test]
    async fn test_swaps_sharing_a_mint_run_one_at_a_time() {
        let locks = Arc::new(MintLocks::default());
        let first = locks.acquire(&["USDC", "MintA"]).await;

        // A sell of another token into the same base mint waits
        let waiting = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guards = locks.acquire(&["MintB", "USDC"]).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        // Disjoint mints do not
        let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&["MintC", "MintD"])).await;
        assert!(other.is_ok());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("second swap should proceed once the first releases")
            .unwrap();
    }

    #[tokio::test]
    async fn test_same_mint_on_both_sides_locks_once() {
        let locks = MintLocks::default();
        let guards = locks.acquire(&[NATIVE_SOL_MINT, NATIVE_SOL_MINT]).await;
        assert_eq!(guards.len(), 1);
    }
}
