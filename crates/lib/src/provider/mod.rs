//! Provider resolution: turning a planned target into a [`ProviderRecord`].
//!
//! [`ProviderResolver`] consults the persisted [`ProviderStore`], invokes the
//! toolchain executor on a miss and propagates build metadata along edges.
//! Private dependencies' metadata reaches the dependent's own action but is
//! never forwarded to the dependent's consumers.

mod resolver;
mod store;
mod types;

pub use resolver::{ProviderResolver, ResolvedInput};
pub use store::{CacheEntry, CacheError, ProviderStore, StoreStats};
pub use types::{BuildMetadata, ProviderRecord};
