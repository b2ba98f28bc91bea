//! Distance-vector routing over an in-memory graph.
//!
//! Routers know only the cost of their own links. They converge on
//! shortest-path tables by exchanging split-horizon filtered distance vectors
//! with their neighbors, and react to link changes with triggered updates.
//!
//! ```
//! use dv_routing::{Cost, Topology};
//!
//! let mut net = Topology::new();
//! for id in ["R1", "R2", "R3"] {
//!     net.add_node(id)?;
//! }
//! net.add_edge("R1", "R2", 8)?;
//! net.add_edge("R2", "R3", 4)?;
//!
//! let route = net.router("R1").unwrap().route("R3").unwrap();
//! assert_eq!(route.cost, Cost::Finite(12));
//! assert_eq!(route.next_hop, "R2");
//! # Ok::<(), dv_routing::Error>(())
//! ```

pub mod algorithms;
pub mod config;
pub mod display;
mod error;
pub mod network;
pub mod protocol;
pub mod router;
pub mod runtime;
pub mod types;

pub use config::{Scenario, Step, TopologyConfig};
pub use error::{Error, Result};
pub use network::{DeliveryStats, Edge, EdgeKey, Topology};
pub use protocol::{DistanceVector, Envelope, Message, RoutingEntry, RoutingTable};
pub use router::Router;
pub use runtime::AsyncTopology;
pub use types::Cost;

pub type RouterId = String;
