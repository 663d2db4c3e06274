//! Host allocation for the offload cluster.
//!
//! Nodes are handed out in groups of three: a head node that only hosts the
//! offload lane (no ranks) followed by two accelerator nodes with up to
//! `ACCELERATOR_SLOTS` ranks each. Every call starts over at node 1, the pool
//! itself is never tracked.

#[cfg(test)]
mod allocation_test;

use std::{fmt, fs, io, path::Path, str::FromStr};
use thiserror::Error;
use tracing::{debug, instrument};

/// ranks placed on each of the two accelerator nodes of a full group
pub const ACCELERATOR_SLOTS: u32 = 5;
/// ranks served by one full group of three nodes
pub const GROUP_CAPACITY: u32 = 2 * ACCELERATOR_SLOTS;
/// file name of the host file inside a run directory
pub const HOSTS_FILE_NAME: &str = "hosts";

#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("Invalid argument: process count must be positive, got {0}")]
    InvalidArgument(u32),
    #[error("Malformed host file line {line}: {content:?}")]
    Parse { line: usize, content: String },
    #[error("Failed to write host file")]
    Io(#[from] io::Error),
}

/// A single host file record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSlot {
    /// 1-based node index
    pub node: u32,
    /// ranks placed on that node, 0 is a valid placement
    pub slots: u32,
}

impl HostSlot {
    pub fn new(node: u32, slots: u32) -> Self {
        Self { node, slots }
    }
}

impl fmt::Display for HostSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}:{}", self.node, self.slots)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostAllocation {
    entries: Vec<HostSlot>,
}

impl HostAllocation {
    pub fn entries(&self) -> &[HostSlot] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// total number of ranks placed by this allocation
    pub fn total_slots(&self) -> u32 {
        self.entries.iter().map(|entry| entry.slots).sum()
    }

    /// pairs of (node index, slot count) in emission order
    pub fn pairs(&self) -> Vec<(u32, u32)> {
        self.entries
            .iter()
            .map(|entry| (entry.node, entry.slots))
            .collect()
    }

    fn push_group(&mut self, head: u32, first: u32, second: u32) {
        self.entries.push(HostSlot::new(head, 0));
        self.entries.push(HostSlot::new(head + 1, first));
        self.entries.push(HostSlot::new(head + 2, second));
    }

    /// write the allocation as host file, replacing an existing one
    pub fn write_to(&self, path: &Path) -> Result<(), AllocationError> {
        fs::write(path, self.to_string())?;
        debug!(path = ?path, records = self.len(), "Wrote host file");

        Ok(())
    }

    /// read a host file back into an allocation
    pub fn read_from(path: &Path) -> Result<Self, AllocationError> {
        fs::read_to_string(path)?.parse()
    }
}

/// compute the placement for `process_count` ranks
#[instrument(level = "debug")]
pub fn allocate(process_count: u32) -> Result<HostAllocation, AllocationError> {
    if process_count == 0 {
        return Err(AllocationError::InvalidArgument(process_count));
    }

    let mut allocation = HostAllocation::default();
    let mut node = 1;
    let mut remaining = process_count;

    while remaining > GROUP_CAPACITY {
        allocation.push_group(node, ACCELERATOR_SLOTS, ACCELERATOR_SLOTS);
        node += 3;
        remaining -= GROUP_CAPACITY;
    }

    // a remainder of exactly GROUP_CAPACITY lands here, not in the loop
    if remaining > ACCELERATOR_SLOTS {
        allocation.push_group(node, ACCELERATOR_SLOTS, remaining - ACCELERATOR_SLOTS);
    } else {
        allocation.push_group(node, remaining, 0);
    }

    assert_eq!(
        allocation.total_slots(),
        process_count,
        "host allocation lost ranks"
    );

    Ok(allocation)
}

impl fmt::Display for HostAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.entries
            .iter()
            .try_for_each(|entry| writeln!(f, "{entry}"))
    }
}

impl FromStr for HostAllocation {
    type Err = AllocationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let entries = input
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| parse_line(line).ok_or_else(|| AllocationError::Parse {
                line: index + 1,
                content: line.to_string(),
            }))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entries })
    }
}

fn parse_line(line: &str) -> Option<HostSlot> {
    let (node, slots) = line.trim().strip_prefix("node")?.split_once(':')?;

    Some(HostSlot::new(node.parse().ok()?, slots.parse().ok()?))
}
