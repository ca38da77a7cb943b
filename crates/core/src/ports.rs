//! Provisional listener-port allocation for platform outputs.
//!
//! Ports are assigned once per orchestration run, before any network call,
//! so downstream payloads can reference `srt://<device-ip>:<port>`
//! deterministically. The assignment is held only in memory: the port that
//! actually sticks is whatever the device reports back for the output entry.

use std::collections::{BTreeMap, HashSet};

use crate::error::CoreError;

/// First port of the default listener range.
pub const DEFAULT_PORT_START: u16 = 10001;

/// Last port (inclusive) of the default listener range.
pub const DEFAULT_PORT_END: u16 = 10100;

/// An inclusive range of listener ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_PORT_START,
            end: DEFAULT_PORT_END,
        }
    }
}

impl PortRange {
    /// Build a range, rejecting empty or privileged ranges.
    pub fn new(start: u16, end: u16) -> Result<Self, CoreError> {
        if start > end {
            return Err(CoreError::Validation(format!(
                "Port range start {start} is greater than end {end}"
            )));
        }
        if start < 1024 {
            return Err(CoreError::Validation(format!(
                "Port range must not include privileged ports (start {start})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse a `start-end` string such as `"10001-10100"`.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let (start, end) = raw
            .split_once('-')
            .ok_or_else(|| CoreError::Validation(format!("Invalid port range \"{raw}\"")))?;
        let parse = |s: &str| {
            s.trim()
                .parse::<u16>()
                .map_err(|_| CoreError::Validation(format!("Invalid port range \"{raw}\"")))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    /// Number of ports in the range (never zero).
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }
}

/// Sequential allocator over a [`PortRange`].
#[derive(Debug, Clone, Default)]
pub struct PortAllocator {
    range: PortRange,
}

impl PortAllocator {
    pub fn new(range: PortRange) -> Self {
        Self { range }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Assign a distinct port to every id in `intent_ids`.
    ///
    /// Ports are pulled in ascending order, skipping anything in `in_use`.
    /// Fails with [`CoreError::RangeExhausted`] when fewer free ports remain
    /// than requested; nothing is allocated in that case.
    pub fn allocate<'a, I>(
        &self,
        intent_ids: I,
        in_use: &HashSet<u16>,
    ) -> Result<BTreeMap<String, u16>, CoreError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let ids: Vec<&str> = intent_ids.into_iter().collect();
        let free: Vec<u16> = (self.range.start..=self.range.end)
            .filter(|p| !in_use.contains(p))
            .collect();

        if ids.len() > free.len() {
            return Err(CoreError::RangeExhausted {
                requested: ids.len(),
                available: free.len(),
            });
        }

        let assigned = ids
            .into_iter()
            .zip(free)
            .map(|(id, port)| (id.to_string(), port))
            .collect();
        Ok(assigned)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("intent-{i}")).collect()
    }

    #[test]
    fn allocates_distinct_ports_within_range() {
        let allocator = PortAllocator::default();
        let ids = ids(5);
        let ports = allocator
            .allocate(ids.iter().map(String::as_str), &HashSet::new())
            .unwrap();

        assert_eq!(ports.len(), 5);
        let distinct: HashSet<u16> = ports.values().copied().collect();
        assert_eq!(distinct.len(), 5);
        assert!(ports.values().all(|p| allocator.range().contains(*p)));
        assert_eq!(ports["intent-0"], DEFAULT_PORT_START);
    }

    #[test]
    fn skips_ports_in_use() {
        let allocator = PortAllocator::default();
        let in_use: HashSet<u16> = [10001, 10002].into_iter().collect();
        let ports = allocator.allocate(["a", "b"], &in_use).unwrap();

        assert_eq!(ports["a"], 10003);
        assert_eq!(ports["b"], 10004);
    }

    #[test]
    fn whole_range_can_be_allocated() {
        let allocator = PortAllocator::new(PortRange::new(20000, 20009).unwrap());
        let ids = ids(10);
        let ports = allocator
            .allocate(ids.iter().map(String::as_str), &HashSet::new())
            .unwrap();
        assert_eq!(ports.len(), 10);
    }

    #[test]
    fn over_request_fails_and_allocates_nothing() {
        let allocator = PortAllocator::new(PortRange::new(20000, 20002).unwrap());
        let ids = ids(4);
        let result = allocator.allocate(ids.iter().map(String::as_str), &HashSet::new());

        assert_matches!(
            result,
            Err(CoreError::RangeExhausted {
                requested: 4,
                available: 3
            })
        );
    }

    #[test]
    fn in_use_ports_shrink_capacity() {
        let allocator = PortAllocator::new(PortRange::new(20000, 20001).unwrap());
        let in_use: HashSet<u16> = [20000].into_iter().collect();
        assert!(allocator.allocate(["a", "b"], &in_use).is_err());
        assert_eq!(allocator.allocate(["a"], &in_use).unwrap()["a"], 20001);
    }

    #[test]
    fn parse_range() {
        let range = PortRange::parse("10001-10100").unwrap();
        assert_eq!(range.len(), 100);
        assert!(PortRange::parse("10100-10001").is_err());
        assert!(PortRange::parse("80-90").is_err());
        assert!(PortRange::parse("abc").is_err());
    }
}
