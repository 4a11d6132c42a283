use alloy::primitives::{Address, B256, Bytes, U256, keccak256};
use alloy::sol_types::SolValue;
use serde::{Deserialize, Serialize};

/// One wallet's concrete operation, ready for signing and submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletOperation {
    pub sender: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub nonce: u64,
}

impl WalletOperation {
    /// The 32-byte digest handed to the delegated signer. Calldata is hashed
    /// first so the digest stays fixed-size regardless of payload length.
    pub fn digest(&self) -> B256 {
        let encoded = (
            self.sender,
            self.to,
            self.value,
            keccak256(&self.data),
            U256::from(self.nonce),
        )
            .abi_encode();
        keccak256(encoded)
    }
}

/// A signed operation as handed to the bundler. The signature is the
/// canonical 65-byte r || s || v form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOperation {
    pub operation: WalletOperation,
    pub signature: Bytes,
}
