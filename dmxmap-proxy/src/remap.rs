//! The channel remapping engine.
//!
//! Built once from the compiled mapping table, the engine keeps one
//! persistent merge buffer per destination universe. Each incoming frame is
//! copied range-by-range into the buffers its source universe maps to; dirty
//! buffers are then drained by the dispatcher. Buffers persist across frames,
//! so a partial-channel mapping never zeroes unrelated channels in its
//! destination.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::config::NormalizedMapping;
use dmxmap_protocol::{Protocol, Universe};

/// A snapshot of one dirty destination universe.
#[derive(Debug, Clone)]
pub struct Output {
    pub universe: Universe,
    pub data: [u8; 512],
}

struct SourceEntry {
    mappings: Vec<NormalizedMapping>,
    /// Frames remapped from this source since the last stats swap.
    counter: AtomicU64,
}

struct MergeBuffer {
    data: [u8; 512],
    dirty: bool,
}

/// The remap engine. All methods take `&self`; each merge buffer carries its
/// own lock and the engine never holds two at once.
pub struct Engine {
    by_source: HashMap<Universe, SourceEntry>,
    outputs: HashMap<Universe, Mutex<MergeBuffer>>,
}

impl Engine {
    pub fn new(mappings: Vec<NormalizedMapping>) -> Self {
        let mut by_source: HashMap<Universe, SourceEntry> = HashMap::new();
        let mut outputs: HashMap<Universe, Mutex<MergeBuffer>> = HashMap::new();

        for m in mappings {
            by_source
                .entry(m.from)
                .or_insert_with(|| SourceEntry {
                    mappings: Vec::new(),
                    counter: AtomicU64::new(0),
                })
                .mappings
                .push(m);
            outputs.entry(m.to).or_insert_with(|| {
                Mutex::new(MergeBuffer {
                    data: [0; 512],
                    dirty: false,
                })
            });
        }

        Engine { by_source, outputs }
    }

    /// Apply the mapping table to one incoming frame. A source universe with
    /// no mappings is a no-op.
    pub fn remap(&self, src: Universe, frame: &[u8; 512]) {
        let Some(entry) = self.by_source.get(&src) else {
            return;
        };
        entry.counter.fetch_add(1, Ordering::Relaxed);

        for m in &entry.mappings {
            // Compile-time invariants keep these in range; clamp anyway so a
            // bad table cannot reach out of bounds.
            let count = m
                .count
                .min(512usize.saturating_sub(m.from_chan))
                .min(512usize.saturating_sub(m.to_chan));
            if count == 0 {
                continue;
            }
            let Some(buffer) = self.outputs.get(&m.to) else {
                continue;
            };
            let mut buffer = buffer.lock();
            buffer.data[m.to_chan..m.to_chan + count]
                .copy_from_slice(&frame[m.from_chan..m.from_chan + count]);
            buffer.dirty = true;
        }
    }

    /// Drain every dirty destination buffer, snapshotting the full 512 bytes
    /// and clearing the flag. Order is unspecified.
    pub fn take_dirty(&self) -> Vec<Output> {
        let mut result = Vec::new();
        for (universe, buffer) in &self.outputs {
            let mut buffer = buffer.lock();
            if buffer.dirty {
                buffer.dirty = false;
                result.push(Output {
                    universe: *universe,
                    data: buffer.data,
                });
            }
        }
        result
    }

    /// Swap every per-source frame counter to zero, returning the prior
    /// values.
    pub fn swap_stats(&self) -> HashMap<Universe, u64> {
        self.by_source
            .iter()
            .map(|(u, entry)| (*u, entry.counter.swap(0, Ordering::Relaxed)))
            .collect()
    }

    pub fn source_artnet_universes(&self) -> Vec<u16> {
        self.source_universes(Protocol::ArtNet)
    }

    pub fn source_sacn_universes(&self) -> Vec<u16> {
        self.source_universes(Protocol::Sacn)
    }

    pub fn dest_artnet_universes(&self) -> Vec<u16> {
        self.dest_universes(Protocol::ArtNet)
    }

    pub fn dest_sacn_universes(&self) -> Vec<u16> {
        self.dest_universes(Protocol::Sacn)
    }

    fn source_universes(&self, protocol: Protocol) -> Vec<u16> {
        self.by_source
            .keys()
            .filter(|u| u.protocol == protocol)
            .map(|u| u.number)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn dest_universes(&self, protocol: Protocol) -> Vec<u16> {
        self.outputs
            .keys()
            .filter(|u| u.protocol == protocol)
            .map(|u| u.number)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn engine(toml: &str) -> Engine {
        Engine::new(Config::parse(toml).unwrap().normalized())
    }

    fn pattern() -> [u8; 512] {
        let mut frame = [0u8; 512];
        for (i, b) in frame.iter_mut().enumerate() {
            *b = i as u8;
        }
        frame
    }

    #[test]
    fn passthrough_full_universe() {
        let engine = engine(
            r#"
            [[mapping]]
            from = "artnet:0"
            to = "artnet:1"
            "#,
        );
        let frame = pattern();
        engine.remap(Universe::artnet(0), &frame);

        let outputs = engine.take_dirty();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].universe, Universe::artnet(1));
        assert_eq!(outputs[0].data[..], frame[..]);
    }

    #[test]
    fn split_across_protocols() {
        let engine = engine(
            r#"
            [[mapping]]
            from = "artnet:0:1-256"
            to = "artnet:1:1"

            [[mapping]]
            from = "artnet:0:257-512"
            to = "sacn:1:1"
            "#,
        );
        let frame = pattern();
        engine.remap(Universe::artnet(0), &frame);

        let outputs = engine.take_dirty();
        assert_eq!(outputs.len(), 2);
        for out in outputs {
            if out.universe == Universe::artnet(1) {
                assert_eq!(out.data[..256], frame[..256]);
                assert!(out.data[256..].iter().all(|&b| b == 0));
            } else {
                assert_eq!(out.universe, Universe::sacn(1));
                assert_eq!(out.data[..256], frame[256..]);
                assert!(out.data[256..].iter().all(|&b| b == 0));
            }
        }
    }

    #[test]
    fn shifted_range() {
        let engine = engine(
            r#"
            [[mapping]]
            from = "artnet:0:100-200"
            to = "artnet:0.0.2:50"
            "#,
        );
        let frame = pattern();
        engine.remap(Universe::artnet(0), &frame);

        let outputs = engine.take_dirty();
        assert_eq!(outputs.len(), 1);
        let out = &outputs[0];
        // Source channel 100 (index 99) lands on destination channel 50
        // (index 49).
        assert_eq!(out.data[49], frame[99]);
        assert_eq!(out.data[49..150], frame[99..200]);
        assert!(out.data[..49].iter().all(|&b| b == 0));
        assert!(out.data[150..].iter().all(|&b| b == 0));
    }

    #[test]
    fn unmatched_source_is_a_no_op() {
        let engine = engine(
            r#"
            [[mapping]]
            from = "artnet:0"
            to = "artnet:1"
            "#,
        );
        engine.remap(Universe::artnet(99), &pattern());
        assert!(engine.take_dirty().is_empty());
        assert_eq!(engine.swap_stats()[&Universe::artnet(0)], 0);
    }

    #[test]
    fn fan_out_dirties_each_destination_once() {
        let engine = engine(
            r#"
            [[mapping]]
            from = "artnet:0:1-10"
            to = "artnet:1:1"

            [[mapping]]
            from = "artnet:0:1-10"
            to = "artnet:2:1"
            "#,
        );
        engine.remap(Universe::artnet(0), &pattern());

        let outputs = engine.take_dirty();
        assert_eq!(outputs.len(), 2);
        // Drained means clean: nothing left until the next frame.
        assert!(engine.take_dirty().is_empty());

        engine.remap(Universe::artnet(0), &pattern());
        assert_eq!(engine.take_dirty().len(), 2);
    }

    #[test]
    fn merge_preserves_untouched_bytes() {
        let engine = engine(
            r#"
            [[mapping]]
            from = "artnet:0:1-10"
            to = "artnet:5:1"

            [[mapping]]
            from = "artnet:1:1-10"
            to = "artnet:5:101"
            "#,
        );

        let ones = [1u8; 512];
        let twos = [2u8; 512];
        engine.remap(Universe::artnet(0), &ones);
        engine.remap(Universe::artnet(1), &twos);

        let outputs = engine.take_dirty();
        assert_eq!(outputs.len(), 1);
        let out = &outputs[0];
        assert!(out.data[..10].iter().all(|&b| b == 1));
        assert!(out.data[100..110].iter().all(|&b| b == 2));
        assert!(out.data[10..100].iter().all(|&b| b == 0));

        // A later frame on one source must not clear the other's range.
        engine.remap(Universe::artnet(1), &twos);
        let outputs = engine.take_dirty();
        assert!(outputs[0].data[..10].iter().all(|&b| b == 1));
    }

    #[test]
    fn swap_stats_resets_counters() {
        let engine = engine(
            r#"
            [[mapping]]
            from = "artnet:0"
            to = "artnet:1"
            "#,
        );
        let frame = pattern();
        engine.remap(Universe::artnet(0), &frame);
        engine.remap(Universe::artnet(0), &frame);
        engine.remap(Universe::artnet(99), &frame);

        let stats = engine.swap_stats();
        assert_eq!(stats[&Universe::artnet(0)], 2);
        assert_eq!(engine.swap_stats()[&Universe::artnet(0)], 0);
    }

    #[test]
    fn universe_views_are_deduplicated() {
        let engine = engine(
            r#"
            [[mapping]]
            from = "artnet:0"
            to = "sacn:1"

            [[mapping]]
            from = "artnet:0:1-10"
            to = "sacn:1:100"

            [[mapping]]
            from = "sacn:2"
            to = "artnet:3"
            "#,
        );
        assert_eq!(engine.source_artnet_universes(), vec![0]);
        assert_eq!(engine.source_sacn_universes(), vec![2]);
        assert_eq!(engine.dest_artnet_universes(), vec![3]);
        assert_eq!(engine.dest_sacn_universes(), vec![1]);
    }
}
