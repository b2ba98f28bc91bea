//! Text rendering of routing-table snapshots.

use std::collections::BTreeMap;
use std::fmt;

use crate::RouterId;
use crate::protocol::RoutingTable;

/// Fixed-width view of one router's table.
pub struct TableView<'a> {
    pub owner: &'a str,
    pub table: &'a RoutingTable,
}

impl fmt::Display for TableView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Routing table of {}:", self.owner)?;
        writeln!(f, "{:<14} {:<8} {:<14}", "Destination", "Cost", "Next Hop")?;
        writeln!(f, "{}", "-".repeat(38))?;
        for (destination, entry) in self.table.iter() {
            writeln!(f, "{:<14} {:<8} {:<14}", destination, entry.cost, entry.next_hop)?;
        }
        Ok(())
    }
}

pub fn format_table(owner: &str, table: &RoutingTable) -> String {
    TableView { owner, table }.to_string()
}

/// Every table, one block per router, in identifier order.
pub fn format_tables(tables: &BTreeMap<RouterId, RoutingTable>) -> String {
    if tables.is_empty() {
        return "No routers\n".to_string();
    }
    tables
        .iter()
        .map(|(owner, table)| format_table(owner, table))
        .collect::<Vec<_>>()
        .join("\n")
}
