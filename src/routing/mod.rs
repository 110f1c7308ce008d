//! Traffic admission.
//!
//! # Data Flow
//! ```text
//! relayed datagram to/from peer (ip, port)
//!     → filter.rs (FilteredConn asks the listener's PeerFilter)
//!     → cache.rs (peer ip → cluster name, cleared on routing epoch change)
//!         - hit:  live cluster by name → port check
//!         - miss: router.rs scans the listener's routes
//!     → router.rs (first cluster containing ip, then ip+port match)
//!     → endpoint.rs (prefix / domain + port range matching)
//!     → allow, or deny (write rejected / datagram dropped)
//! ```
//!
//! # Design Decisions
//! - Deny by default: no route, no cluster, no match
//! - The cache only changes cost, never the decision
//! - Nothing on this path awaits or takes a lock across I/O

pub mod cache;
pub mod endpoint;
pub mod filter;
pub mod router;

pub use cache::{Epoch, PermissionCache, PERMISSION_CACHE_SIZE};
pub use endpoint::{DomainEndpoint, Endpoint, EndpointError};
pub use filter::{FilteredConn, PeerFilter};
pub use router::ClusterLookup;
