pub mod edge;
pub mod topology;

pub use edge::{Edge, EdgeKey};
pub use topology::{DeliveryStats, Topology};
