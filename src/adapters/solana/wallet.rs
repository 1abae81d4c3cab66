use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction,
    transaction::{Transaction, VersionedTransaction},
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Failed to load keypair from file: {0}")]
    LoadError(String),
    #[error("Failed to sign transaction: {0}")]
    SigningError(String),
    #[error("Invalid keypair bytes: {0}")]
    InvalidKeypair(String),
}

/// Wallet manager for loading and signing with Solana keypairs
#[derive(Clone)]
pub struct WalletManager {
    keypair: Arc<Keypair>,
}

impl WalletManager {
    /// Load keypair from a file path (JSON array format). `~` is expanded.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        let raw = path.as_ref().to_string_lossy();
        let expanded = shellexpand::tilde(&raw).into_owned();
        let contents = fs::read_to_string(&expanded)
            .map_err(|e| WalletError::LoadError(format!("Failed to read {}: {}", expanded, e)))?;

        // Parse JSON array of bytes
        let bytes: Vec<u8> = serde_json::from_str(&contents)
            .map_err(|e| WalletError::LoadError(format!("Invalid JSON format: {}", e)))?;

        Self::from_bytes(&bytes)
    }

    /// Load keypair from a base58 secret key, as exported by Phantom and friends
    pub fn from_base58(secret: &str) -> Result<Self, WalletError> {
        let bytes = bs58::decode(secret.trim())
            .into_vec()
            .map_err(|e| WalletError::InvalidKeypair(format!("Invalid base58: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Load keypair from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        let keypair = Keypair::try_from(bytes)
            .map_err(|e| WalletError::InvalidKeypair(e.to_string()))?;

        Ok(Self { keypair: Arc::new(keypair) })
    }

    /// Create a new random keypair (for testing)
    pub fn new_random() -> Self {
        Self {
            keypair: Arc::new(Keypair::new()),
        }
    }

    /// Get the public key as a string
    pub fn public_key(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Re-sign a versioned transaction built by a third party with this wallet
    pub fn sign_versioned(&self, transaction: VersionedTransaction) -> Result<VersionedTransaction, WalletError> {
        VersionedTransaction::try_new(transaction.message, &[self.keypair.as_ref()])
            .map_err(|e| WalletError::SigningError(e.to_string()))
    }

    /// Signed SOL transfer from this wallet, which also pays the fee
    pub fn transfer_transaction(&self, to: &Pubkey, lamports: u64, recent_blockhash: Hash) -> VersionedTransaction {
        let instruction = system_instruction::transfer(&self.keypair.pubkey(), to, lamports);
        let transaction = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&self.keypair.pubkey()),
            &[self.keypair.as_ref()],
            recent_blockhash,
        );
        VersionedTransaction::from(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::message::{v0, VersionedMessage};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_new_random_wallet() {
        let wallet = WalletManager::new_random();
        let pubkey = wallet.public_key();
        assert!(pubkey.len() >= 32 && pubkey.len() <= 44);
    }

    #[test]
    fn test_from_bytes_and_base58() {
        let keypair = Keypair::new();
        let bytes = keypair.to_bytes();

        let from_bytes = WalletManager::from_bytes(&bytes).unwrap();
        assert_eq!(from_bytes.pubkey(), keypair.pubkey());

        let encoded = bs58::encode(&bytes).into_string();
        let from_b58 = WalletManager::from_base58(&encoded).unwrap();
        assert_eq!(from_b58.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_from_file() {
        let keypair = Keypair::new();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(json.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let wallet = WalletManager::from_file(temp_file.path()).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_clone_wallet() {
        let wallet1 = WalletManager::new_random();
        let wallet2 = wallet1.clone();
        assert_eq!(wallet1.public_key(), wallet2.public_key());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(WalletManager::from_bytes(&[0u8; 10]).is_err());
        assert!(WalletManager::from_base58("0OIl").is_err());

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"not valid json").unwrap();
        temp_file.flush().unwrap();
        assert!(WalletManager::from_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_sign_versioned() {
        let wallet = WalletManager::new_random();
        let message = v0::Message::try_compile(&wallet.pubkey(), &[], &[], Hash::default()).unwrap();
        let unsigned = VersionedTransaction {
            signatures: vec![Default::default()],
            message: VersionedMessage::V0(message),
        };

        let signed = wallet.sign_versioned(unsigned).unwrap();
        assert_eq!(signed.signatures.len(), 1);
        assert!(signed.verify_with_results().iter().all(|ok| *ok));
    }

    #[test]
    fn test_transfer_transaction_is_signed_by_payer() {
        let wallet = WalletManager::new_random();
        let to = Pubkey::new_unique();

        let tx = wallet.transfer_transaction(&to, 1_500_000, Hash::new_unique());
        let keys = tx.message.static_account_keys();
        assert_eq!(keys[0], wallet.pubkey());
        assert!(keys.contains(&to));
        assert_eq!(tx.signatures.len(), 1);
        assert!(tx.verify_with_results().iter().all(|ok| *ok));
    }
}
