//! Read-driven replication policy.
//!
//! Every shared lock on a file counts as a read. The file wants
//! `reads * REPLICATION_PERCENT / 100` replicas, capped at one per
//! registered node other than the primary, and gains at most one replica per
//! read. An exclusive lock drops every replica and resets the count.

use dfs_types::constants::REPLICATION_PERCENT;

use crate::tree::{FileEntry, NodeHandle};

/// Replicas a file should have after `reads` reads with `registered` nodes.
pub fn wanted_replicas(reads: u64, registered: usize) -> usize {
    let by_demand = reads.saturating_mul(REPLICATION_PERCENT) / 100;
    let cap = registered.saturating_sub(1) as u64;
    by_demand.min(cap) as usize
}

/// Count a read. Returns the node a new replica should be copied to, which
/// is recorded as in flight until [`finish_copy`] is called.
///
/// Candidates are taken in registration order.
pub fn record_read(entry: &mut FileEntry, nodes: &[NodeHandle]) -> Option<NodeHandle> {
    entry.reads += 1;
    let wanted = wanted_replicas(entry.reads, nodes.len());
    if entry.replicas.len() + entry.copying.len() >= wanted {
        return None;
    }

    let target = nodes
        .iter()
        .find(|node| !entry.is_hosted_by(node) && !entry.copying.contains(node))?
        .clone();
    entry.copying.push(target.clone());
    Some(target)
}

/// Settle a copy started by [`record_read`].
pub fn finish_copy(entry: &mut FileEntry, node: &NodeHandle, copied: bool) {
    entry.copying.retain(|n| n != node);
    if copied && !entry.is_hosted_by(node) {
        entry.replicas.push(node.clone());
    }
}

/// Reset for a write. Returns the replicas that must be deleted.
pub fn invalidate(entry: &mut FileEntry) -> Vec<NodeHandle> {
    entry.reads = 0;
    std::mem::take(&mut entry.replicas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfs_types::{CommandStub, StorageStub};
    use std::net::SocketAddr;

    fn nodes(n: u16) -> Vec<NodeHandle> {
        (0..n)
            .map(|i| NodeHandle {
                storage: StorageStub::new(SocketAddr::from(([127, 0, 0, 1], 7000 + i))),
                command: CommandStub::new(SocketAddr::from(([127, 0, 0, 1], 8000 + i))),
            })
            .collect()
    }

    #[test]
    fn test_wanted_replicas() {
        assert_eq!(wanted_replicas(0, 10), 0);
        assert_eq!(wanted_replicas(19, 10), 0);
        assert_eq!(wanted_replicas(20, 10), 1);
        assert_eq!(wanted_replicas(100, 10), 5);
        assert_eq!(wanted_replicas(1000, 10), 9);
        assert_eq!(wanted_replicas(1000, 1), 0);
        assert_eq!(wanted_replicas(1000, 0), 0);
    }

    #[test]
    fn test_hundred_reads_on_ten_nodes() {
        let nodes = nodes(10);
        let mut entry = FileEntry::new(nodes[3].clone());

        for _ in 0..100 {
            if let Some(target) = record_read(&mut entry, &nodes) {
                assert_ne!(target, nodes[3], "primary is never a replica target");
                finish_copy(&mut entry, &target, true);
            }
        }
        assert_eq!(entry.replicas.len(), 5);
        assert_eq!(entry.reads, 100);
        // Registration order, skipping the primary.
        assert_eq!(entry.replicas, vec![
            nodes[0].clone(),
            nodes[1].clone(),
            nodes[2].clone(),
            nodes[4].clone(),
            nodes[5].clone(),
        ]);

        let dropped = invalidate(&mut entry);
        assert_eq!(dropped.len(), 5);
        assert!(entry.replicas.is_empty());
        assert_eq!(entry.reads, 0);
    }

    #[test]
    fn test_failed_copy_is_not_recorded() {
        let nodes = nodes(2);
        let mut entry = FileEntry::new(nodes[0].clone());
        entry.reads = 19;

        let target = record_read(&mut entry, &nodes).unwrap();
        assert_eq!(entry.copying, vec![target.clone()]);
        finish_copy(&mut entry, &target, false);
        assert!(entry.replicas.is_empty());
        assert!(entry.copying.is_empty());

        // The next read tries again.
        assert_eq!(record_read(&mut entry, &nodes), Some(nodes[1].clone()));
    }

    #[test]
    fn test_in_flight_copy_counts_toward_wanted() {
        let nodes = nodes(3);
        let mut entry = FileEntry::new(nodes[0].clone());
        entry.reads = 19;

        assert!(record_read(&mut entry, &nodes).is_some());
        // Still wants only one; the in-flight copy covers it.
        assert!(record_read(&mut entry, &nodes).is_none());
    }
}
