//! Chain data access: the query port, node and mirror backends, caching, and
//! response normalization.

mod cache;
pub(crate) mod fetch;
pub mod memory;
pub mod mirror;
pub mod node;
mod normalize;
mod port;

pub use cache::{Cache, CacheError};
pub use fetch::{normalize_base_url, Caching, FetchConfig, Fetcher};
pub use memory::InMemoryChain;
pub use mirror::{MirrorApi, MirrorSelector};
pub use node::NodeRpc;
pub use normalize::{parse_amount, parse_signed, NormalizeError};
pub use port::{
    BalanceUpdateEntry, BlockMetadata, BlockRef, ChainQueryPort, DelegateRecord, Head,
    TransportError,
};
