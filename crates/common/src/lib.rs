/**
 * Where storage nodes come from.
 *  Docker Engine discovery and a static
 *  node list behind one trait.
 */
pub mod discovery;
/**
 * Validated object identifiers.
 */
pub mod object_id;
/**
 * The live node pool. Holds an immutable
 *  membership snapshot and swaps it
 *  atomically on refresh.
 */
pub mod pool;
/**
 * Hash-based shard routing over the
 *  current membership, with a fallback
 *  scan for reads.
 */
pub mod router;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub mod prelude {
    pub use crate::discovery::{
        CredentialVars, DiscoveryError, DockerDiscovery, DynDiscovery, MembershipDiscovery,
        NodeDescriptor, NodeQuery, StaticDiscovery, StaticNode,
    };
    pub use crate::object_id::{ObjectId, ObjectIdError};
    pub use crate::pool::{run_refresh_loop, Membership, NodePool, PoolConfig, PoolError};
    pub use crate::router::{fnv1a_32, RouteError, Router};
    pub use crate::version::build_info;
}
