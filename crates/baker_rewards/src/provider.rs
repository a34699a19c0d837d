//! Backend selection: builds [`ChainQueryPort`] implementations from configuration.

use crate::chain::{
    normalize_base_url, Cache, ChainQueryPort, FetchConfig, Fetcher, MirrorApi, MirrorSelector,
    NodeRpc, TransportError,
};
use crate::compute::RewardCalculator;
use crate::network::{ConfigError, NetworkParameters};
use crate::verify::RewardCrossValidator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

const PUBLIC_RPC_URL: &str = "https://{}.tezrpc.me/";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Node given by `node_url`.
    Rpc,
    /// Public node for the configured network.
    PublicRpc,
    /// Third-party indexer mirrors.
    Mirror,
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rpc" => Ok(Provider::Rpc),
            "prpc" => Ok(Provider::PublicRpc),
            "mirror" => Ok(Provider::Mirror),
            _ => Err(ConfigError::UnknownProvider(s.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::Rpc => "rpc",
            Provider::PublicRpc => "prpc",
            Provider::Mirror => "mirror",
        })
    }
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub network: NetworkParameters,
    pub node_url: Option<String>,
    pub mirrors: Vec<String>,
    pub fetch: FetchConfig,
}

/// Public node URL for a network name.
pub fn public_rpc_url(network: &str) -> Result<String, ConfigError> {
    let prefix = match network.trim().to_uppercase().as_str() {
        "MAINNET" => "mainnet",
        "ALPHANET" => "alphanet",
        "ZERONET" => "zeronet",
        _ => return Err(ConfigError::UnknownNetwork(network.to_string())),
    };
    Ok(PUBLIC_RPC_URL.replace("{}", prefix))
}

/// Owns the shared HTTP fetcher and, when a mirror provider is requested, the
/// mirror selector. Both are built once and handed to every port.
pub struct ProviderFactory {
    config: ProviderConfig,
    params: Arc<NetworkParameters>,
    fetcher: Arc<Fetcher>,
    mirror_selector: Option<Arc<MirrorSelector>>,
}

impl ProviderFactory {
    pub async fn new(
        config: ProviderConfig,
        providers: &[Provider],
        cache: Option<Arc<Cache>>,
    ) -> Result<Self, ProviderError> {
        config.network.validate()?;
        let fetcher = Arc::new(Fetcher::new(config.fetch.clone(), cache)?);

        let mirror_selector = if providers.contains(&Provider::Mirror) {
            let mirrors = config
                .mirrors
                .iter()
                .map(|m| normalize_base_url(m.as_str()))
                .collect::<Result<Vec<_>, _>>()?;
            let selector = if config.fetch.offline {
                MirrorSelector::from_healthy(mirrors)?
            } else {
                MirrorSelector::initialize(&mirrors, &fetcher).await?
            };
            info!(mirrors = selector.mirrors().len(), "mirror selector ready");
            Some(Arc::new(selector))
        } else {
            None
        };

        Ok(Self {
            params: Arc::new(config.network.clone()),
            config,
            fetcher,
            mirror_selector,
        })
    }

    pub fn params(&self) -> Arc<NetworkParameters> {
        Arc::clone(&self.params)
    }

    pub fn chain_port(&self, provider: Provider) -> Result<Arc<dyn ChainQueryPort>, ProviderError> {
        match provider {
            Provider::Rpc => {
                let url = self.config.node_url.as_deref().ok_or_else(|| {
                    ConfigError::Invalid("provider rpc requires a node url".into())
                })?;
                let base = normalize_base_url(url)?;
                Ok(Arc::new(NodeRpc::new(base, Arc::clone(&self.fetcher))))
            }
            Provider::PublicRpc => {
                let base = normalize_base_url(&public_rpc_url(&self.config.network.name)?)?;
                Ok(Arc::new(NodeRpc::new(base, Arc::clone(&self.fetcher))))
            }
            Provider::Mirror => {
                let selector = self.mirror_selector.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("mirror provider was not initialized".into())
                })?;
                Ok(Arc::new(MirrorApi::new(
                    Arc::clone(selector),
                    Arc::clone(&self.fetcher),
                )))
            }
        }
    }

    pub fn calculator(
        &self,
        provider: Provider,
        delegate: &str,
    ) -> Result<RewardCalculator, ProviderError> {
        Ok(RewardCalculator::new(
            self.params(),
            self.chain_port(provider)?,
            delegate,
        ))
    }

    /// Primary calculator plus an optional reference calculator for validation.
    pub fn cross_validator(
        &self,
        primary: Provider,
        reference: Option<Provider>,
        delegate: &str,
    ) -> Result<RewardCrossValidator, ProviderError> {
        if reference == Some(primary) {
            return Err(ConfigError::Invalid(format!(
                "reference provider {} must differ from primary",
                primary
            ))
            .into());
        }
        let primary = self.calculator(primary, delegate)?;
        let reference = reference
            .map(|p| self.calculator(p, delegate))
            .transpose()?;
        Ok(RewardCrossValidator::new(primary, reference))
    }

    pub fn request_count(&self) -> u64 {
        self.fetcher.request_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            network: NetworkParameters::mainnet(),
            node_url: Some("127.0.0.1:8732".into()),
            mirrors: vec!["https://api1.mirror.example".into()],
            fetch: FetchConfig {
                offline: true,
                ..Default::default()
            },
        }
    }

    #[test]
    fn provider_names() {
        assert_eq!("rpc".parse::<Provider>().unwrap(), Provider::Rpc);
        assert_eq!("PRPC".parse::<Provider>().unwrap(), Provider::PublicRpc);
        assert_eq!("mirror".parse::<Provider>().unwrap(), Provider::Mirror);
        assert!("tzscan".parse::<Provider>().is_err());
        assert_eq!(Provider::PublicRpc.to_string(), "prpc");
    }

    #[test]
    fn public_urls() {
        assert_eq!(
            public_rpc_url("MAINNET").unwrap(),
            "https://mainnet.tezrpc.me/"
        );
        assert!(public_rpc_url("devnet").is_err());
    }

    #[tokio::test]
    async fn builds_ports_by_provider() {
        let factory = ProviderFactory::new(config(), &[Provider::Rpc, Provider::Mirror], None)
            .await
            .unwrap();
        assert_eq!(factory.chain_port(Provider::Rpc).unwrap().name(), "node");
        assert_eq!(factory.chain_port(Provider::PublicRpc).unwrap().name(), "node");
        assert_eq!(factory.chain_port(Provider::Mirror).unwrap().name(), "mirror");
        let v = factory
            .cross_validator(Provider::Rpc, Some(Provider::Mirror), "tz1b")
            .unwrap();
        assert!(v.validates());
    }

    #[tokio::test]
    async fn mirror_needs_initialization() {
        let factory = ProviderFactory::new(config(), &[Provider::Rpc], None)
            .await
            .unwrap();
        assert!(factory.chain_port(Provider::Mirror).is_err());
        assert!(factory
            .cross_validator(Provider::Rpc, Some(Provider::Rpc), "tz1b")
            .is_err());
    }

    #[tokio::test]
    async fn rpc_without_url_is_rejected() {
        let mut cfg = config();
        cfg.node_url = None;
        let factory = ProviderFactory::new(cfg, &[Provider::Rpc], None).await.unwrap();
        assert!(matches!(
            factory.chain_port(Provider::Rpc),
            Err(ProviderError::Config(ConfigError::Invalid(_)))
        ));
    }
}
