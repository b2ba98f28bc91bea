use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::RouterId;
use super::RoutingEntry;

/// Point-in-time copy of a router's table as advertised to one neighbor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistanceVector {
    entries: BTreeMap<RouterId, RoutingEntry>,
}

impl DistanceVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, destination: &str) -> Option<&RoutingEntry> {
        self.entries.get(destination)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RouterId, &RoutingEntry)> {
        self.entries.iter()
    }
}

impl FromIterator<(RouterId, RoutingEntry)> for DistanceVector {
    fn from_iter<I: IntoIterator<Item = (RouterId, RoutingEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Split-horizon filtered distance vector.
    Vector(DistanceVector),
    /// Asks the recipient to answer with its current vector.
    Request,
}

/// A message in transit between two routers. The topology does the delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: RouterId,
    pub to: RouterId,
    pub message: Message,
}

impl Envelope {
    pub fn vector(from: impl Into<RouterId>, to: impl Into<RouterId>, vector: DistanceVector) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            message: Message::Vector(vector),
        }
    }

    pub fn request(from: impl Into<RouterId>, to: impl Into<RouterId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            message: Message::Request,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self.message, Message::Request)
    }
}
