use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// Route or link cost. `Infinite` marks an unreachable destination or a severed link.
///
/// Ordering puts every finite cost below `Infinite`. On the wire (JSON) a
/// finite cost is a plain number and `Infinite` is `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Option<u64>", into = "Option<u64>")]
pub enum Cost {
    Finite(u64),
    Infinite,
}

impl Cost {
    pub const ZERO: Cost = Cost::Finite(0);

    pub fn is_finite(&self) -> bool {
        matches!(self, Cost::Finite(_))
    }

    pub fn value(&self) -> Option<u64> {
        match self {
            Cost::Finite(v) => Some(*v),
            Cost::Infinite => None,
        }
    }

    /// Normalises any finite cost at or above `infinity` to `Infinite`.
    pub fn capped(self, infinity: u64) -> Cost {
        match self {
            Cost::Finite(v) if v < infinity => self,
            _ => Cost::Infinite,
        }
    }

    /// Moves a route cost from an old first-hop link cost to a new one.
    pub fn rebase(self, old_link: u64, new_link: u64) -> Cost {
        match self {
            Cost::Finite(v) => Cost::Finite(v.saturating_sub(old_link).saturating_add(new_link)),
            Cost::Infinite => Cost::Infinite,
        }
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        match (self, rhs) {
            (Cost::Finite(a), Cost::Finite(b)) => a.checked_add(b).map_or(Cost::Infinite, Cost::Finite),
            _ => Cost::Infinite,
        }
    }
}

impl From<u64> for Cost {
    fn from(value: u64) -> Self {
        Cost::Finite(value)
    }
}

impl From<Option<u64>> for Cost {
    fn from(value: Option<u64>) -> Self {
        value.map_or(Cost::Infinite, Cost::Finite)
    }
}

impl From<Cost> for Option<u64> {
    fn from(cost: Cost) -> Self {
        cost.value()
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cost::Finite(v) => fmt::Display::fmt(v, f),
            Cost::Infinite => f.pad("inf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_sorts_above_every_finite_cost() {
        assert!(Cost::Finite(u64::MAX) < Cost::Infinite);
        assert!(Cost::Finite(3) < Cost::Finite(4));
        assert_eq!(Cost::ZERO.min(Cost::Infinite), Cost::ZERO);
    }

    #[test]
    fn addition_saturates_to_infinite() {
        assert_eq!(Cost::Finite(3) + Cost::Finite(4), Cost::Finite(7));
        assert_eq!(Cost::Finite(3) + Cost::Infinite, Cost::Infinite);
        assert_eq!(Cost::Finite(u64::MAX) + Cost::Finite(1), Cost::Infinite);
    }

    #[test]
    fn capping_and_rebasing() {
        assert_eq!(Cost::Finite(15).capped(16), Cost::Finite(15));
        assert_eq!(Cost::Finite(16).capped(16), Cost::Infinite);
        assert_eq!(Cost::Finite(12).rebase(8, 2), Cost::Finite(6));
        assert_eq!(Cost::Infinite.rebase(8, 2), Cost::Infinite);
    }

    #[test]
    fn json_uses_null_for_infinite() {
        assert_eq!(serde_json::to_string(&Cost::Finite(5)).unwrap(), "5");
        assert_eq!(serde_json::to_string(&Cost::Infinite).unwrap(), "null");
        let parsed: Cost = serde_json::from_str("null").unwrap();
        assert_eq!(parsed, Cost::Infinite);
    }

    #[test]
    fn display_pads_like_a_number() {
        assert_eq!(format!("{:<5}|", Cost::Infinite), "inf  |");
        assert_eq!(format!("{:<5}|", Cost::Finite(12)), "12   |");
    }
}
