use alloy::{primitives::Address, providers::Provider};
use alloy_ens::ProviderEnsExt;
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Name to address lookups. `None` is a definitive "no record" for that call.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Option<Address>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
}

/// Display data for a member address.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn profile(&self, address: Address) -> Option<Profile>;
}

/// ENS forward and reverse resolution through an alloy provider.
#[derive(Debug, Clone)]
pub struct EnsResolver<P> {
    provider: P,
}

impl<P> EnsResolver<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P> NameResolver for EnsResolver<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    #[instrument(skip(self))]
    async fn resolve(&self, name: &str) -> Option<Address> {
        match self.provider.resolve_name(name).await {
            Ok(address) if address != Address::ZERO => Some(address),
            Ok(_) => {
                debug!(name, "ENS name resolves to the zero address");
                None
            }
            Err(e) => {
                debug!(name, error = %e, "ENS name not resolved");
                None
            }
        }
    }
}

#[async_trait]
impl<P> ProfileLookup for EnsResolver<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn profile(&self, address: Address) -> Option<Profile> {
        match self.provider.lookup_address(&address).await {
            Ok(name) if !name.is_empty() => Some(Profile { name }),
            Ok(_) => None,
            Err(e) => {
                debug!(%address, error = %e, "No reverse record for member");
                None
            }
        }
    }
}
