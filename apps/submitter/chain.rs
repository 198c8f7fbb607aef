use crate::forms::ContractAction;
use alloy::{
    dyn_abi::{DynSolValue, JsonAbiExt},
    json_abi::Function,
    network::TransactionBuilder,
    primitives::{Address, Bytes, TxHash, U256},
    providers::Provider,
    rpc::types::TransactionRequest,
};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// A strongly typed contract call argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum CallArg {
    Address(Address),
    Uint(U256),
    Bytes(Bytes),
    String(String),
}

impl From<CallArg> for DynSolValue {
    fn from(arg: CallArg) -> Self {
        match arg {
            CallArg::Address(address) => DynSolValue::Address(address),
            CallArg::Uint(value) => DynSolValue::Uint(value, 256),
            CallArg::Bytes(bytes) => DynSolValue::Bytes(bytes.to_vec()),
            CallArg::String(text) => DynSolValue::String(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCall {
    pub action: ContractAction,
    pub target: Address,
    pub args: Vec<CallArg>,
}

impl ContractCall {
    pub fn calldata(&self) -> Result<Bytes, InvocationError> {
        let function = Function::parse(self.action.signature())
            .map_err(|e| InvocationError::Encoding(e.to_string()))?;
        let values: Vec<DynSolValue> = self.args.iter().cloned().map(DynSolValue::from).collect();
        function
            .abi_encode_input(&values)
            .map(Bytes::from)
            .map_err(|e| InvocationError::Encoding(e.to_string()))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvocationError {
    #[error("transaction rejected by signer: {0}")]
    Rejected(String),
    #[error("failed to send transaction: {0}")]
    Send(String),
    #[error("transaction {0} reverted")]
    Reverted(TxHash),
    #[error("transaction {0} not confirmed in time")]
    Timeout(TxHash),
    #[error("failed to encode call: {0}")]
    Encoding(String),
}

/// Executes contract calls on behalf of the connected account.
///
/// `send` returns once the signer hands back a hash; that is the commit point.
/// `confirm` waits for inclusion.
#[async_trait]
pub trait ContractInvoker: Send + Sync {
    async fn send(&self, call: &ContractCall, from: Address) -> Result<TxHash, InvocationError>;

    async fn confirm(&self, tx_hash: TxHash) -> Result<(), InvocationError>;
}

fn is_rejection(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("user denied") || message.contains("rejected") || message.contains("user refused")
}

/// Sends Moloch and minion calls through an alloy provider with a wallet.
#[derive(Debug, Clone)]
pub struct MolochInvoker<P> {
    provider: P,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl<P> MolochInvoker<P> {
    pub fn new(provider: P, confirmation_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            provider,
            confirmation_timeout,
            poll_interval,
        }
    }
}

#[async_trait]
impl<P> ContractInvoker for MolochInvoker<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    #[instrument(skip(self, call), fields(action = %call.action, target = %call.target))]
    async fn send(&self, call: &ContractCall, from: Address) -> Result<TxHash, InvocationError> {
        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(call.target)
            .with_input(call.calldata()?);

        let pending = self.provider.send_transaction(request).await.map_err(|e| {
            let message = e.to_string();
            if is_rejection(&message) {
                InvocationError::Rejected(message)
            } else {
                InvocationError::Send(message)
            }
        })?;

        let tx_hash = *pending.tx_hash();
        info!(%tx_hash, "Transaction sent");
        Ok(tx_hash)
    }

    #[instrument(skip(self))]
    async fn confirm(&self, tx_hash: TxHash) -> Result<(), InvocationError> {
        let wait = async {
            loop {
                match self.provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => {
                        return if receipt.status() {
                            info!(block = ?receipt.block_number, "Transaction confirmed");
                            Ok(())
                        } else {
                            warn!("Transaction reverted");
                            Err(InvocationError::Reverted(tx_hash))
                        };
                    }
                    Ok(None) => debug!("Receipt not available yet"),
                    Err(e) => warn!(error = %e, "Failed to fetch receipt, retrying"),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(self.confirmation_timeout, wait)
            .await
            .map_err(|_| InvocationError::Timeout(tx_hash))?
    }
}
