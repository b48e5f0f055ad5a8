// src/client.rs
use std::sync::Arc;

use async_trait::async_trait;
use ethers::providers::{Middleware, MiddlewareError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest};
use tracing::debug;

use crate::error::{KernelError, Result};

/// Chain reads the kernel account needs from its embedder.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    async fn get_code(&self, address: Address) -> Result<Bytes>;

    /// `eth_call` against `to`, or a deployless call when `to` is `None`.
    /// A revert surfaces as [`KernelError::Reverted`] carrying the revert data.
    async fn call(&self, to: Option<Address>, data: Bytes) -> Result<Bytes>;
}

/// Resolves the chain id and rejects clients that report none.
pub async fn require_chain_id(client: &dyn ChainClient) -> Result<u64> {
    match client.chain_id().await? {
        0 => Err(KernelError::ChainNotConfigured),
        id => Ok(id),
    }
}

/// [`ChainClient`] over any ethers middleware.
#[derive(Debug)]
pub struct ProviderClient<M> {
    provider: Arc<M>,
    chain_id: Option<u64>,
}

impl<M: Middleware> ProviderClient<M> {
    pub fn new(provider: Arc<M>) -> Self {
        Self {
            provider,
            chain_id: None,
        }
    }

    /// Skips `eth_chainId` and reports this id instead.
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }
}

#[async_trait]
impl<M> ChainClient for ProviderClient<M>
where
    M: Middleware + 'static,
{
    async fn chain_id(&self) -> Result<u64> {
        if let Some(chain_id) = self.chain_id {
            return Ok(chain_id);
        }
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| KernelError::Provider(e.to_string()))?;
        Ok(chain_id.low_u64())
    }

    async fn get_code(&self, address: Address) -> Result<Bytes> {
        self.provider
            .get_code(address, None)
            .await
            .map_err(|e| KernelError::Provider(e.to_string()))
    }

    async fn call(&self, to: Option<Address>, data: Bytes) -> Result<Bytes> {
        let mut request = TransactionRequest::new().data(data);
        if let Some(to) = to {
            request = request.to(to);
        }
        let tx: TypedTransaction = request.into();

        match self.provider.call(&tx, None).await {
            Ok(output) => Ok(output),
            Err(err) => {
                let revert = err
                    .as_error_response()
                    .and_then(|response| response.as_revert_data());
                match revert {
                    Some(data) => {
                        debug!("eth_call reverted with {}", data);
                        Err(KernelError::Reverted(data))
                    }
                    None => Err(KernelError::Provider(err.to_string())),
                }
            }
        }
    }
}
