use async_trait::async_trait;
use rust_decimal::Decimal;
use solana_client::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    transaction::VersionedTransaction,
};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use super::wallet::WalletManager;
use crate::domain::units::{from_base_units, to_base_units};
use crate::domain::NATIVE_SOL_MINT;
use crate::ports::{BalanceError, BalanceQuery};

/// SPL Token program
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
/// Associated Token Account program
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

const SOL_DECIMALS: u8 = 9;

#[derive(Debug, Error)]
pub enum SolanaClientError {
    #[error("RPC request failed: {0}")]
    RpcError(String),
    #[error("Transaction failed: {0}")]
    TransactionError(String),
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("No wallet configured for balance queries")]
    NoOwner,
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Insufficient SOL: need {needed}, have {available}")]
    InsufficientSol { needed: Decimal, available: Decimal },
}

impl From<SolanaClientError> for BalanceError {
    fn from(err: SolanaClientError) -> Self {
        match err {
            SolanaClientError::InvalidPublicKey(key) => BalanceError::InvalidAsset(key),
            other => BalanceError::Query(other.to_string()),
        }
    }
}

/// Wrapper around Solana RPC client with async-compatible methods
#[derive(Clone)]
pub struct SolanaClient {
    client: Arc<RpcClient>,
    /// Wallet whose balances `BalanceQuery` reports
    owner: Option<Pubkey>,
}

impl SolanaClient {
    pub fn new(rpc_url: String) -> Self {
        let client = Arc::new(RpcClient::new_with_commitment(rpc_url, CommitmentConfig::confirmed()));
        Self { client, owner: None }
    }

    pub fn with_owner(mut self, owner: Pubkey) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Get SOL balance in lamports
    pub async fn get_balance(&self, pubkey: &str) -> Result<u64, SolanaClientError> {
        let pubkey = parse_pubkey(pubkey)?;

        // Spawn blocking to make sync RPC call async-compatible
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            client
                .get_balance(&pubkey)
                .map_err(|e| SolanaClientError::RpcError(e.to_string()))
        })
        .await
        .map_err(|e| SolanaClientError::RpcError(format!("Task join error: {}", e)))?
    }

    /// Decimals of a mint, from `getTokenSupply`
    pub async fn get_mint_decimals(&self, mint: &str) -> Result<u8, SolanaClientError> {
        if mint == NATIVE_SOL_MINT {
            return Ok(SOL_DECIMALS);
        }
        let mint = parse_pubkey(mint)?;

        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            client
                .get_token_supply(&mint)
                .map(|supply| supply.decimals)
                .map_err(|e| SolanaClientError::RpcError(e.to_string()))
        })
        .await
        .map_err(|e| SolanaClientError::RpcError(format!("Task join error: {}", e)))?
    }

    /// Balance of `mint` held by `owner`, in UI units.
    ///
    /// Native SOL reads the lamport balance. SPL tokens read the owner's
    /// associated token account; no account means zero.
    pub async fn get_wallet_balance(&self, owner: Pubkey, mint: &str) -> Result<Decimal, SolanaClientError> {
        if mint == NATIVE_SOL_MINT {
            let lamports = self.get_balance(&owner.to_string()).await?;
            return Ok(from_base_units(lamports, SOL_DECIMALS));
        }
        let mint = parse_pubkey(mint)?;

        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            let commitment = client.commitment();
            let rpc_err = |e: solana_client::client_error::ClientError| SolanaClientError::RpcError(e.to_string());

            // Token-2022 mints derive their ATA under their own program id
            let token_program = match client.get_account_with_commitment(&mint, commitment).map_err(rpc_err)?.value {
                Some(account) => account.owner,
                None => return Err(SolanaClientError::InvalidPublicKey(format!("mint {} not found", mint))),
            };
            let ata = associated_token_address(&owner, &mint, &token_program)?;

            if client.get_account_with_commitment(&ata, commitment).map_err(rpc_err)?.value.is_none() {
                return Ok(Decimal::ZERO);
            }

            let balance = client.get_token_account_balance(&ata).map_err(rpc_err)?;
            let units = balance
                .amount
                .parse::<u64>()
                .map_err(|e| SolanaClientError::RpcError(format!("Parse error: {}", e)))?;
            Ok(from_base_units(units, balance.decimals))
        })
        .await
        .map_err(|e| SolanaClientError::RpcError(format!("Task join error: {}", e)))?
    }

    pub async fn latest_blockhash(&self) -> Result<Hash, SolanaClientError> {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            client
                .get_latest_blockhash()
                .map_err(|e| SolanaClientError::RpcError(e.to_string()))
        })
        .await
        .map_err(|e| SolanaClientError::RpcError(format!("Task join error: {}", e)))?
    }

    /// Transfer `sol` SOL from `wallet` to `to` and wait for confirmation.
    /// Returns the signature.
    pub async fn transfer_sol(
        &self,
        wallet: &WalletManager,
        to: &str,
        sol: Decimal,
    ) -> Result<String, SolanaClientError> {
        let recipient = parse_pubkey(to)?;
        let lamports = to_base_units(sol, SOL_DECIMALS)
            .filter(|lamports| *lamports > 0)
            .ok_or_else(|| SolanaClientError::InvalidAmount(format!("{} SOL", sol)))?;

        let available = from_base_units(self.get_balance(&wallet.public_key()).await?, SOL_DECIMALS);
        if available < sol {
            return Err(SolanaClientError::InsufficientSol { needed: sol, available });
        }

        let blockhash = self.latest_blockhash().await?;
        let transaction = wallet.transfer_transaction(&recipient, lamports, blockhash);
        tracing::info!("Sending {} SOL ({} lamports) to {}", sol, lamports, recipient);
        self.send_and_confirm_versioned(transaction).await
    }

    /// Send a signed versioned transaction and wait for confirmation
    pub async fn send_and_confirm_versioned(
        &self,
        transaction: VersionedTransaction,
    ) -> Result<String, SolanaClientError> {
        let client = Arc::clone(&self.client);

        tokio::task::spawn_blocking(move || {
            client
                .send_and_confirm_transaction(&transaction)
                .map(|sig| sig.to_string())
                .map_err(|e| SolanaClientError::TransactionError(e.to_string()))
        })
        .await
        .map_err(|e| SolanaClientError::RpcError(format!("Task join error: {}", e)))?
    }
}

#[async_trait]
impl BalanceQuery for SolanaClient {
    async fn get_balance(&self, asset: &str) -> Result<Decimal, BalanceError> {
        let owner = self.owner.ok_or(SolanaClientError::NoOwner)?;
        Ok(self.get_wallet_balance(owner, asset).await?)
    }
}

fn parse_pubkey(value: &str) -> Result<Pubkey, SolanaClientError> {
    Pubkey::from_str(value).map_err(|e| SolanaClientError::InvalidPublicKey(format!("{}: {}", value, e)))
}

/// Associated token account of `owner` for `mint` under `token_program`
pub fn associated_token_address(
    owner: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
) -> Result<Pubkey, SolanaClientError> {
    let ata_program = parse_pubkey(ASSOCIATED_TOKEN_PROGRAM_ID)?;
    let (address, _bump) = Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ata_program,
    );
    Ok(address)
}
