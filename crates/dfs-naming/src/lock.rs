//! Per-path FIFO reader/writer lock queues.
//!
//! The table only records who is queued and who holds what. Waiting is done
//! by the caller, which re-checks [`LockTable::try_grant`] every time the
//! table changes.
//!
//! Grant rules for a queue ordered by arrival:
//! - shared: no exclusive request is queued ahead of it
//! - exclusive: it is at the head of the queue

use std::collections::{HashMap, VecDeque};

use dfs_types::DfsPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl LockMode {
    pub fn from_exclusive(exclusive: bool) -> Self {
        if exclusive {
            LockMode::Exclusive
        } else {
            LockMode::Shared
        }
    }
}

/// Identifies one queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

#[derive(Debug)]
struct Request {
    ticket: Ticket,
    mode: LockMode,
    granted: bool,
}

/// Lock queues keyed by path. A queue exists only while something is
/// queued on its path, so locks never depend on the tree node still being
/// there.
#[derive(Debug, Default)]
pub struct LockTable {
    queues: HashMap<DfsPath, VecDeque<Request>>,
    next_ticket: u64,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request at the back of `path`'s queue.
    pub fn enqueue(&mut self, path: &DfsPath, mode: LockMode) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.queues.entry(path.clone()).or_default().push_back(Request {
            ticket,
            mode,
            granted: false,
        });
        ticket
    }

    /// Grant the request if the rules allow it now. Once granted, stays
    /// granted until released.
    pub fn try_grant(&mut self, path: &DfsPath, ticket: Ticket) -> bool {
        let Some(queue) = self.queues.get_mut(path) else {
            return false;
        };
        let Some(index) = queue.iter().position(|r| r.ticket == ticket) else {
            return false;
        };

        let grantable = queue[index].granted
            || match queue[index].mode {
                LockMode::Shared => queue
                    .iter()
                    .take(index)
                    .all(|r| r.mode == LockMode::Shared),
                LockMode::Exclusive => index == 0,
            };
        if grantable {
            queue[index].granted = true;
        }
        grantable
    }

    /// Drop a request that is still waiting, e.g. after its target vanished.
    pub fn cancel(&mut self, path: &DfsPath, ticket: Ticket) {
        if let Some(queue) = self.queues.get_mut(path) {
            queue.retain(|r| r.ticket != ticket);
        }
        self.drop_if_empty(path);
    }

    /// Whether some granted request of `mode` is queued on `path`.
    pub fn is_held(&self, path: &DfsPath, mode: LockMode) -> bool {
        self.queues
            .get(path)
            .is_some_and(|q| q.iter().any(|r| r.granted && r.mode == mode))
    }

    /// Release the earliest granted request of `mode` on `path`.
    pub fn release(&mut self, path: &DfsPath, mode: LockMode) -> bool {
        let Some(queue) = self.queues.get_mut(path) else {
            return false;
        };
        let Some(index) = queue.iter().position(|r| r.granted && r.mode == mode) else {
            return false;
        };
        queue.remove(index);
        self.drop_if_empty(path);
        true
    }

    /// Number of granted shared requests on `path`.
    #[cfg(test)]
    fn shared_holders(&self, path: &DfsPath) -> usize {
        self.queues.get(path).map_or(0, |q| {
            q.iter()
                .filter(|r| r.granted && r.mode == LockMode::Shared)
                .count()
        })
    }

    /// Number of requests, granted or waiting, on `path`.
    #[cfg(test)]
    fn queued(&self, path: &DfsPath) -> usize {
        self.queues.get(path).map_or(0, VecDeque::len)
    }

    fn drop_if_empty(&mut self, path: &DfsPath) {
        if self.queues.get(path).is_some_and(VecDeque::is_empty) {
            self.queues.remove(path);
        }
    }
}
