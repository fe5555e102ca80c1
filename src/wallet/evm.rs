//! secp256k1 wallet shared by every EVM network.
//!
//! Keys are derived with BIP-32 along `m/44'/60'/0'/0/0`, the path used by
//! MetaMask and most EVM wallets for the first account.

use bip32::{DerivationPath, XPrv};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature, H256};
use ethers::utils::to_checksum;

use crate::error::{CoordinatorError, Result};

pub const EVM_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

pub struct EvmWallet {
    inner: LocalWallet,
}

impl EvmWallet {
    /// Derives the first account from a 64-byte BIP-39 seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let path: DerivationPath = EVM_DERIVATION_PATH.parse().map_err(derivation_err)?;
        let xprv = XPrv::derive_from_path(seed, &path).map_err(derivation_err)?;
        let inner = LocalWallet::from_bytes(&xprv.to_bytes()).map_err(derivation_err)?;
        Ok(Self { inner })
    }

    pub fn address(&self) -> Address {
        self.inner.address()
    }

    /// EIP-55 mixed-case address with `0x` prefix.
    pub fn address_checksummed(&self) -> String {
        to_checksum(&self.inner.address(), None)
    }

    /// Signs a 32-byte digest. `v` is 27 or 28.
    pub fn sign_hash(&self, hash: H256) -> Result<Signature> {
        self.inner.sign_hash(hash).map_err(derivation_err)
    }
}

impl std::fmt::Debug for EvmWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmWallet")
            .field("address", &self.address_checksummed())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

fn derivation_err(e: impl std::fmt::Display) -> CoordinatorError {
    CoordinatorError::WalletDerivation(e.to_string())
}
