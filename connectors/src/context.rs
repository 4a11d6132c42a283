use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::sol;
use async_trait::async_trait;

use fleetcast_core::template::WalletContext;

use crate::error::ConnectorError;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string memory);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
}

/// Fetches the live per-wallet state one resolution needs. Must fail fast
/// and independently per wallet: an error for one wallet never taints
/// another's context.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn get_context(&self, wallet: Address, required_tokens: &[Address]) -> Result<WalletContext, ConnectorError>;

    async fn transaction_count(&self, wallet: Address) -> Result<u64, ConnectorError>;

    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, ConnectorError>;
}

/// Explicit, caller-owned TTL cache for token metadata. Injected into the
/// provider instead of living as a module-level singleton.
pub struct TokenMetadataCache {
    ttl: Duration,
    entries: Mutex<HashMap<Address, (Instant, TokenMetadata)>>,
}

impl TokenMetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, token: &Address) -> Option<TokenMetadata> {
        let entries = self.entries.lock().ok()?;
        let (inserted_at, meta) = entries.get(token)?;
        if inserted_at.elapsed() > self.ttl {
            return None;
        }
        Some(meta.clone())
    }

    pub fn insert(&self, token: Address, meta: TokenMetadata) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(token, (Instant::now(), meta));
        }
    }
}

pub struct EvmContextProvider<P> {
    provider: P,
    metadata_cache: TokenMetadataCache,
}

impl<P> EvmContextProvider<P> {
    pub fn new(provider: P, metadata_cache: TokenMetadataCache) -> Self {
        Self {
            provider,
            metadata_cache,
        }
    }
}

#[async_trait]
impl<P> ContextProvider for EvmContextProvider<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn get_context(&self, wallet: Address, required_tokens: &[Address]) -> Result<WalletContext, ConnectorError> {
        let native_balance = self
            .provider
            .get_balance(wallet)
            .await
            .map_err(|e| ConnectorError::context(format!("native balance for {wallet:#x}: {e}")))?;

        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| ConnectorError::context(format!("latest block: {e}")))?
            .ok_or_else(|| ConnectorError::context("latest block not available".to_string()))?;

        let mut token_balances = HashMap::with_capacity(required_tokens.len());
        for token in required_tokens {
            let balance: U256 = IERC20::new(*token, self.provider.clone())
                .balanceOf(wallet)
                .call()
                .await
                .map_err(|e| ConnectorError::context(format!("balanceOf({wallet:#x}) on {token:#x}: {e}")))?;
            token_balances.insert(*token, balance);
        }

        Ok(WalletContext {
            wallet_address: wallet,
            native_balance,
            token_balances,
            block_timestamp: block.header.timestamp,
        })
    }

    async fn transaction_count(&self, wallet: Address) -> Result<u64, ConnectorError> {
        self.provider
            .get_transaction_count(wallet)
            .await
            .map_err(|e| ConnectorError::context(format!("transaction count for {wallet:#x}: {e}")))
    }

    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, ConnectorError> {
        if let Some(meta) = self.metadata_cache.get(&token) {
            return Ok(meta);
        }

        let contract = IERC20::new(token, self.provider.clone());
        let symbol = contract
            .symbol()
            .call()
            .await
            .map_err(|e| ConnectorError::context(format!("symbol() on {token:#x}: {e}")))?;
        let decimals = contract
            .decimals()
            .call()
            .await
            .map_err(|e| ConnectorError::context(format!("decimals() on {token:#x}: {e}")))?;

        let meta = TokenMetadata { symbol, decimals };
        self.metadata_cache.insert(token, meta.clone());
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_cache_expires_entries() {
        let token: Address = "0x6b175474e89094c44da98b954eedeac495271d0f".parse().unwrap();
        let meta = TokenMetadata {
            symbol: "DAI".to_string(),
            decimals: 18,
        };

        let cache = TokenMetadataCache::new(Duration::from_secs(60));
        assert_eq!(cache.get(&token), None);
        cache.insert(token, meta.clone());
        assert_eq!(cache.get(&token), Some(meta.clone()));

        let expired = TokenMetadataCache::new(Duration::ZERO);
        expired.insert(token, meta);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(expired.get(&token), None);
    }
}
