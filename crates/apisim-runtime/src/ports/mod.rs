//! Port allocation for mock API instances.
//!
//! Every mock API that has ever been started owns one port from a configured range.
//! The allocation survives stop/start cycles (it only goes `inactive`) and is removed
//! when the mock API itself is deleted.

use crate::config::PortsConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Ports below this are never handed out.
pub const MIN_ELIGIBLE_PORT: u16 = 1024;

/// Lifecycle of a port allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Allocated,
    Active,
    Inactive,
}

/// One mock API's claim on a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortAllocation {
    pub api_id: String,
    pub port: u16,
    pub state: PortState,
    pub allocated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Port {0} is not available")]
    PortUnavailable(u16),
    #[error("No ports available in range {start}-{end}")]
    NoPortsAvailable { start: u16, end: u16 },
    #[error("No port allocation found for mock API {0}")]
    AllocationNotFound(String),
}

#[derive(Default)]
struct AllocationTable {
    by_api: HashMap<String, PortAllocation>,
    /// port -> api_id
    by_port: BTreeMap<u16, String>,
}

/// Tracks which port belongs to which mock API.
///
/// All mutations go through one mutex so concurrent start/stop/restore paths cannot
/// hand out the same port twice.
pub struct PortAllocator {
    range_start: u16,
    range_end: u16,
    reserved: HashSet<u16>,
    table: Mutex<AllocationTable>,
}

impl PortAllocator {
    /// Create an allocator over `start..=end`. A start below 1024 is raised to 1024.
    pub fn new(start: u16, end: u16, reserved: impl IntoIterator<Item = u16>) -> Self {
        Self {
            range_start: start.max(MIN_ELIGIBLE_PORT),
            range_end: end,
            reserved: reserved.into_iter().collect(),
            table: Mutex::new(AllocationTable::default()),
        }
    }

    pub fn from_config(config: &PortsConfig) -> Self {
        Self::new(
            config.range_start,
            config.range_end,
            config.reserved.iter().copied(),
        )
    }

    pub fn range(&self) -> (u16, u16) {
        (self.range_start, self.range_end)
    }

    fn is_eligible(&self, port: u16) -> bool {
        port >= self.range_start && port <= self.range_end && !self.reserved.contains(&port)
    }

    /// Assign a port to `api_id`.
    ///
    /// Returns the existing port if the api already has one. A `preferred` port must be
    /// in range, unreserved and unclaimed; otherwise the range is scanned ascending.
    pub fn allocate(&self, api_id: &str, preferred: Option<u16>) -> Result<u16, PortError> {
        let mut table = self.table.lock();

        if let Some(existing) = table.by_api.get(api_id) {
            debug!(api_id, port = existing.port, "Reusing existing port allocation");
            return Ok(existing.port);
        }

        let port = match preferred {
            Some(port) => {
                if !self.is_eligible(port) || table.by_port.contains_key(&port) {
                    return Err(PortError::PortUnavailable(port));
                }
                port
            }
            None => (self.range_start..=self.range_end)
                .find(|p| !self.reserved.contains(p) && !table.by_port.contains_key(p))
                .ok_or(PortError::NoPortsAvailable {
                    start: self.range_start,
                    end: self.range_end,
                })?,
        };

        table.by_port.insert(port, api_id.to_string());
        table.by_api.insert(
            api_id.to_string(),
            PortAllocation {
                api_id: api_id.to_string(),
                port,
                state: PortState::Allocated,
                allocated_at: Utc::now(),
            },
        );
        info!(api_id, port, "Allocated port");
        Ok(port)
    }

    /// Drop the api's allocation, freeing the port.
    pub fn deallocate(&self, api_id: &str) {
        let mut table = self.table.lock();
        match table.by_api.remove(api_id) {
            Some(allocation) => {
                table.by_port.remove(&allocation.port);
                info!(api_id, port = allocation.port, "Released port");
            }
            None => warn!(api_id, "No port allocation to release"),
        }
    }

    pub fn mark_active(&self, api_id: &str) -> Result<(), PortError> {
        self.set_state(api_id, PortState::Active)
    }

    pub fn mark_inactive(&self, api_id: &str) -> Result<(), PortError> {
        self.set_state(api_id, PortState::Inactive)
    }

    fn set_state(&self, api_id: &str, state: PortState) -> Result<(), PortError> {
        let mut table = self.table.lock();
        let allocation = table
            .by_api
            .get_mut(api_id)
            .ok_or_else(|| PortError::AllocationNotFound(api_id.to_string()))?;
        allocation.state = state;
        Ok(())
    }

    /// `false` for ports out of range, reserved, or already claimed.
    pub fn is_available(&self, port: u16) -> bool {
        self.is_eligible(port) && !self.table.lock().by_port.contains_key(&port)
    }

    /// Seed the table with ports already recorded against mock APIs.
    ///
    /// Each entry is recorded as `inactive`. Entries that conflict with an existing
    /// allocation are skipped. Ports outside the range are still claimed so they are
    /// never handed to another api, but `allocate` will not return them as fresh picks.
    pub fn reconcile(&self, assignments: impl IntoIterator<Item = (String, u16)>) -> usize {
        let mut table = self.table.lock();
        let mut seeded = 0;

        for (api_id, port) in assignments {
            if port < MIN_ELIGIBLE_PORT {
                warn!(api_id = %api_id, port, "Ignoring persisted port below {}", MIN_ELIGIBLE_PORT);
                continue;
            }
            if let Some(existing) = table.by_api.get(&api_id) {
                if existing.port != port {
                    warn!(
                        api_id = %api_id,
                        port,
                        existing = existing.port,
                        "Persisted port differs from current allocation, keeping current"
                    );
                }
                continue;
            }
            if let Some(owner) = table.by_port.get(&port) {
                warn!(api_id = %api_id, port, owner = %owner, "Persisted port already claimed");
                continue;
            }

            table.by_port.insert(port, api_id.clone());
            table.by_api.insert(
                api_id.clone(),
                PortAllocation {
                    api_id,
                    port,
                    state: PortState::Inactive,
                    allocated_at: Utc::now(),
                },
            );
            seeded += 1;
        }

        if seeded > 0 {
            info!("Reconciled {} persisted port assignments", seeded);
        }
        seeded
    }

    pub fn allocation(&self, api_id: &str) -> Option<PortAllocation> {
        self.table.lock().by_api.get(api_id).cloned()
    }

    /// Snapshot of all allocations ordered by port.
    pub fn allocations(&self) -> Vec<PortAllocation> {
        let table = self.table.lock();
        table
            .by_port
            .values()
            .filter_map(|api_id| table.by_api.get(api_id).cloned())
            .collect()
    }

    pub fn allocated_count(&self) -> usize {
        self.table.lock().by_api.len()
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::from_config(&PortsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_range_availability() {
        let allocator = PortAllocator::default();

        assert!(!allocator.is_available(80));
        assert!(!allocator.is_available(1023));
        assert!(!allocator.is_available(3000));
        assert!(!allocator.is_available(5000));
        assert!(!allocator.is_available(10000));
        assert!(allocator.is_available(3001));
        assert!(allocator.is_available(9999));
    }

    #[test]
    fn test_allocate_is_idempotent() {
        let allocator = PortAllocator::default();

        let first = allocator.allocate("api-1", None).unwrap();
        let second = allocator.allocate("api-1", None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, 3001);

        // A preferred port is ignored once the api already holds one
        let third = allocator.allocate("api-1", Some(4000)).unwrap();
        assert_eq!(third, first);
        assert_eq!(allocator.allocated_count(), 1);
    }

    #[test]
    fn test_allocate_scans_ascending_and_skips_reserved() {
        let allocator = PortAllocator::new(4999, 5001, [5000]);

        assert_eq!(allocator.allocate("a", None).unwrap(), 4999);
        assert_eq!(allocator.allocate("b", None).unwrap(), 5001);
        assert_eq!(
            allocator.allocate("c", None),
            Err(PortError::NoPortsAvailable {
                start: 4999,
                end: 5001
            })
        );
    }

    #[test]
    fn test_preferred_port_validation() {
        let allocator = PortAllocator::default();

        assert_eq!(allocator.allocate("a", Some(4000)).unwrap(), 4000);
        assert_eq!(
            allocator.allocate("b", Some(4000)),
            Err(PortError::PortUnavailable(4000))
        );
        assert_eq!(
            allocator.allocate("b", Some(5000)),
            Err(PortError::PortUnavailable(5000))
        );
        assert_eq!(
            allocator.allocate("b", Some(80)),
            Err(PortError::PortUnavailable(80))
        );
        assert!(!allocator.is_available(4000));
    }

    #[test]
    fn test_range_start_is_clamped() {
        let allocator = PortAllocator::new(80, 1030, []);
        assert_eq!(allocator.range(), (1024, 1030));
        assert_eq!(allocator.allocate("a", None).unwrap(), 1024);
    }

    #[test]
    fn test_state_transitions() {
        let allocator = PortAllocator::default();
        allocator.allocate("a", None).unwrap();
        assert_eq!(allocator.allocation("a").unwrap().state, PortState::Allocated);

        allocator.mark_active("a").unwrap();
        assert_eq!(allocator.allocation("a").unwrap().state, PortState::Active);

        allocator.mark_inactive("a").unwrap();
        assert_eq!(allocator.allocation("a").unwrap().state, PortState::Inactive);

        assert_eq!(
            allocator.mark_active("missing"),
            Err(PortError::AllocationNotFound("missing".to_string()))
        );
    }

    #[test]
    fn test_deallocate_frees_port() {
        let allocator = PortAllocator::default();
        let port = allocator.allocate("a", None).unwrap();
        allocator.deallocate("a");
        assert!(allocator.is_available(port));
        assert!(allocator.allocation("a").is_none());

        // Second release is a warning, not an error
        allocator.deallocate("a");
    }

    #[test]
    fn test_reconcile_blocks_known_ports() {
        let allocator = PortAllocator::default();
        let seeded = allocator.reconcile(vec![
            ("a".to_string(), 3001),
            ("b".to_string(), 3001),
            ("c".to_string(), 22),
            ("d".to_string(), 12000),
        ]);
        assert_eq!(seeded, 2);

        assert_eq!(allocator.allocation("a").unwrap().state, PortState::Inactive);
        assert!(allocator.allocation("b").is_none());
        assert!(allocator.allocation("c").is_none());

        // Known ports are skipped by fresh allocations, and the owner gets its own back
        assert_eq!(allocator.allocate("e", None).unwrap(), 3002);
        assert_eq!(allocator.allocate("a", None).unwrap(), 3001);
        assert_eq!(allocator.allocate("d", None).unwrap(), 12000);
    }

    #[test]
    fn test_concurrent_allocations_are_unique() {
        use std::sync::Arc;

        let allocator = Arc::new(PortAllocator::new(20000, 20199, []));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let allocator = Arc::clone(&allocator);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|i| allocator.allocate(&format!("api-{t}-{i}"), None).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ports: Vec<u16> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ports.sort_unstable();
        ports.dedup();
        assert_eq!(ports.len(), 200);
    }
}
