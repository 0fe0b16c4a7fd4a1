use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowKey {
    Order(Uuid),
    Rider(Uuid),
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Order(id) => write!(f, "order {id}"),
            RowKey::Rider(id) => write!(f, "rider {id}"),
        }
    }
}

/// Exclusive per-row locks. Callers take an order row before any rider
/// row, and rider rows in ascending id order.
pub struct RowLocks {
    cells: DashMap<RowKey, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl RowLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            cells: DashMap::new(),
            timeout,
        }
    }

    pub async fn acquire(&self, key: RowKey) -> Result<OwnedMutexGuard<()>, AppError> {
        let cell = self
            .cells
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        tokio::time::timeout(self.timeout, cell.lock_owned())
            .await
            .map_err(|_| {
                AppError::TransactionAborted(format!(
                    "timed out after {:?} waiting for {key} lock",
                    self.timeout
                ))
            })
    }

    /// Forgets cells nobody holds or waits on.
    pub fn prune(&self) -> usize {
        let before = self.cells.len();
        self.cells.retain(|_, cell| Arc::strong_count(cell) > 1);
        before.saturating_sub(self.cells.len())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
