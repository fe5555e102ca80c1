//! Wallet handles and the key-derivation capability.
//!
//! Key material only exists inside `EvmWallet` / `SolanaWallet`. Nothing here
//! is `Serialize`, and `Debug` impls redact secrets. The coordinator stores the
//! resulting handles and never touches seed bytes.

pub mod evm;
pub mod solana;

use std::sync::Arc;
use tracing::info;

use crate::error::{CoordinatorError, Result};
use crate::network::{ChainFamily, NetworkSymbol};

pub use evm::EvmWallet;
pub use solana::SolanaWallet;

#[derive(Debug, Clone)]
pub enum WalletHandle {
    Evm(Arc<EvmWallet>),
    Solana(Arc<SolanaWallet>),
}

impl WalletHandle {
    pub fn family(&self) -> ChainFamily {
        match self {
            WalletHandle::Evm(_) => ChainFamily::Evm,
            WalletHandle::Solana(_) => ChainFamily::Solana,
        }
    }

    /// Public address in the chain's native text form.
    pub fn address(&self) -> String {
        match self {
            WalletHandle::Evm(w) => w.address_checksummed(),
            WalletHandle::Solana(w) => w.pubkey().to_string(),
        }
    }

    pub fn as_evm(&self) -> Option<&EvmWallet> {
        match self {
            WalletHandle::Evm(w) => Some(w.as_ref()),
            WalletHandle::Solana(_) => None,
        }
    }

    pub fn as_solana(&self) -> Option<&SolanaWallet> {
        match self {
            WalletHandle::Solana(w) => Some(w.as_ref()),
            WalletHandle::Evm(_) => None,
        }
    }
}

/// One wallet per chain family.
#[derive(Debug, Clone)]
pub struct WalletSet {
    pub evm: Arc<EvmWallet>,
    pub solana: Arc<SolanaWallet>,
}

impl WalletSet {
    pub fn handle_for(&self, symbol: NetworkSymbol) -> WalletHandle {
        match symbol.family() {
            ChainFamily::Evm => WalletHandle::Evm(Arc::clone(&self.evm)),
            ChainFamily::Solana => WalletHandle::Solana(Arc::clone(&self.solana)),
        }
    }
}

/// Anything able to produce the process wallets.
pub trait KeySource {
    fn derive(&self) -> Result<WalletSet>;
}

/// Derives both wallets from a BIP-39 English mnemonic.
pub struct MnemonicKeySource {
    phrase: String,
    passphrase: String,
}

impl MnemonicKeySource {
    pub fn new(phrase: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self { phrase: phrase.into(), passphrase: passphrase.into() }
    }

    fn seed(&self) -> Result<[u8; 64]> {
        let normalized = self.phrase.split_whitespace().collect::<Vec<_>>().join(" ");
        let mnemonic = bip39::Mnemonic::parse_in(bip39::Language::English, normalized.as_str())
            .map_err(|e| CoordinatorError::WalletDerivation(format!("invalid mnemonic: {e}")))?;
        Ok(mnemonic.to_seed(&self.passphrase))
    }
}

impl KeySource for MnemonicKeySource {
    fn derive(&self) -> Result<WalletSet> {
        let seed = self.seed()?;
        let evm = EvmWallet::from_seed(&seed)?;
        let solana = SolanaWallet::from_seed(&seed)?;
        info!(
            evm = %evm.address_checksummed(),
            solana = %solana.pubkey(),
            "wallet.derived"
        );
        Ok(WalletSet { evm: Arc::new(evm), solana: Arc::new(solana) })
    }
}

impl std::fmt::Debug for MnemonicKeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MnemonicKeySource")
            .field("phrase", &"[REDACTED]")
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HARDHAT: &str = "test test test test test test test test test test test junk";

    #[test]
    fn evm_networks_share_one_handle() {
        let set = MnemonicKeySource::new(HARDHAT, "").derive().unwrap();
        let eth = set.handle_for(NetworkSymbol::Eth);
        let base = set.handle_for(NetworkSymbol::Base);
        assert_eq!(eth.address(), "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        assert_eq!(eth.address(), base.address());
        assert_eq!(set.handle_for(NetworkSymbol::Sol).family(), ChainFamily::Solana);
    }

    #[test]
    fn extra_whitespace_is_tolerated() {
        let spaced = format!("  {}\n", HARDHAT.replace(' ', "   "));
        let a = MnemonicKeySource::new(HARDHAT, "").derive().unwrap();
        let b = MnemonicKeySource::new(spaced, "").derive().unwrap();
        assert_eq!(a.evm.address(), b.evm.address());
        assert_eq!(a.solana.pubkey(), b.solana.pubkey());
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let phrase = ["abandon"; 12].join(" ");
        let err = MnemonicKeySource::new(phrase, "").derive().unwrap_err();
        assert!(matches!(err, CoordinatorError::WalletDerivation(_)));
    }

    #[test]
    fn debug_never_shows_phrase() {
        let src = MnemonicKeySource::new(HARDHAT, "pw");
        assert!(!format!("{src:?}").contains("junk"));
    }
}
