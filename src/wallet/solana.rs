use solana_sdk::derivation_path::DerivationPath;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::signer::keypair::keypair_from_seed_and_derivation_path;

use crate::error::{CoordinatorError, Result};

pub struct SolanaWallet {
    keypair: Keypair,
}

impl SolanaWallet {
    /// Derives `m/44'/501'/0'/0'` (Phantom/Solflare default) from a BIP-39 seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let path = DerivationPath::new_bip44(Some(0), Some(0));
        let keypair = keypair_from_seed_and_derivation_path(seed, Some(path))
            .map_err(|e| CoordinatorError::WalletDerivation(e.to_string()))?;
        Ok(Self { keypair })
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn sign_message(&self, message: &[u8]) -> Signature {
        self.keypair.sign_message(message)
    }
}

impl std::fmt::Debug for SolanaWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaWallet")
            .field("pubkey", &self.pubkey())
            .field("keypair", &"[REDACTED]")
            .finish()
    }
}
