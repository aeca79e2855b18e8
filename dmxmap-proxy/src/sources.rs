//! Recently seen DMX sources.
//!
//! Tracks which peer IPs are feeding which universes, so the status endpoint
//! can show where traffic is actually coming from. Entries expire after a
//! minute of silence; a source that stops sending disappears from the view.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use dmxmap_protocol::Universe;

/// Sources unseen for this long are dropped.
pub const SOURCE_EXPIRY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SourceKey {
    universe: Universe,
    ip: IpAddr,
}

/// One active source, as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub universe: Universe,
    pub ip: IpAddr,
}

/// Per-universe sender table behind a single small mutex; the critical
/// section is one map insert.
#[derive(Default)]
pub struct SourceTable {
    entries: Mutex<HashMap<SourceKey, Instant>>,
}

impl SourceTable {
    /// Note a frame from `ip` on `universe`.
    pub fn record(&self, universe: Universe, ip: IpAddr) {
        self.entries
            .lock()
            .insert(SourceKey { universe, ip }, Instant::now());
    }

    /// Drop entries last seen before the cutoff.
    pub fn expire_older_than(&self, cutoff: Instant) {
        self.entries.lock().retain(|_, seen| *seen >= cutoff);
    }

    /// Convenience wrapper using [`SOURCE_EXPIRY`].
    pub fn expire(&self) {
        if let Some(cutoff) = Instant::now().checked_sub(SOURCE_EXPIRY) {
            self.expire_older_than(cutoff);
        }
    }

    /// Snapshot of the active sources. Order is unspecified.
    pub fn snapshot(&self) -> Vec<SourceInfo> {
        self.entries
            .lock()
            .keys()
            .map(|k| SourceInfo {
                universe: k.universe,
                ip: k.ip,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn records_are_deduplicated_per_universe_and_ip() {
        let table = SourceTable::default();
        table.record(Universe::artnet(0), ip("10.0.0.1"));
        table.record(Universe::artnet(0), ip("10.0.0.1"));
        table.record(Universe::artnet(0), ip("10.0.0.2"));
        table.record(Universe::sacn(1), ip("10.0.0.1"));

        assert_eq!(table.snapshot().len(), 3);
    }

    #[test]
    fn stale_entries_expire() {
        let table = SourceTable::default();
        table.record(Universe::artnet(0), ip("10.0.0.1"));

        table.expire_older_than(Instant::now() + Duration::from_secs(1));
        assert!(table.snapshot().is_empty());
    }

    #[test]
    fn fresh_entries_survive_expiry() {
        let table = SourceTable::default();
        table.record(Universe::artnet(0), ip("10.0.0.1"));
        table.expire();
        assert_eq!(table.snapshot().len(), 1);
    }
}
