//! Fragment reassembly.
//!
//! State is keyed by the header timestamp: all fragments of one NAL
//! share a timestamp, and two NALs in flight never do (the 90 kHz clock
//! advances per frame; the audio counter advances per packet). Records
//! live until they complete or fall out of the GC window.
//!
//! The reassembler is owned by a single receive loop; no locking.

use std::collections::HashMap;

use crate::packet::{PacketHeader, FLAG_KEYFRAME};
use crate::transport::NalUnit;

// ── FragmentRecord ───────────────────────────────────────────────

/// Collected fragments for one in-flight NAL.
#[derive(Debug, Default)]
struct FragmentRecord {
    /// Declared fragment count; last write wins (the protocol makes
    /// all fragments of one NAL agree).
    expected: u16,
    /// Full flags byte of the start fragment, kept for emission.
    start_flags: Option<u8>,
    /// Payloads by fragment index. Index-keyed insertion makes
    /// duplicates idempotent.
    fragments: HashMap<u16, Vec<u8>>,
}

impl FragmentRecord {
    fn is_complete(&self) -> bool {
        self.expected >= 1
            && self.fragments.len() >= self.expected as usize
            && (0..self.expected).all(|i| self.fragments.contains_key(&i))
    }

    fn into_nal(mut self, timestamp: u32) -> NalUnit {
        let mut data = Vec::new();
        for i in 0..self.expected {
            data.append(self.fragments.get_mut(&i).expect("complete record"));
        }
        let is_keyframe = self
            .start_flags
            .map(|f| f & FLAG_KEYFRAME != 0)
            .unwrap_or(false);
        NalUnit::new(data, is_keyframe, timestamp)
    }
}

// ── Reassembler ──────────────────────────────────────────────────

/// Reassembles headered datagrams back into NALs.
pub struct Reassembler {
    records: HashMap<u32, FragmentRecord>,
    /// GC cutoff in timestamp ticks.
    gc_window: u32,
}

impl Reassembler {
    pub fn new(gc_window: u32) -> Self {
        Self {
            records: HashMap::new(),
            gc_window,
        }
    }

    /// Feed one raw datagram.
    ///
    /// Returns a complete NAL as soon as its last missing fragment
    /// arrives; completion order, not timestamp order. Truncated
    /// datagrams are dropped. Every call also garbage-collects records
    /// older than the GC window relative to this datagram's timestamp.
    pub fn ingest(&mut self, datagram: &[u8]) -> Option<NalUnit> {
        let header = match PacketHeader::decode(datagram) {
            Ok(h) => h,
            Err(_) => return None,
        };
        let payload = &datagram[PacketHeader::SIZE..];

        let record = self.records.entry(header.timestamp).or_default();
        record.expected = header.fragment_count;
        if header.is_start() {
            record.start_flags = Some(header.flags);
        }
        record.fragments.insert(header.fragment_index, payload.to_vec());

        let out = if record.is_complete() {
            self.records
                .remove(&header.timestamp)
                .map(|r| r.into_nal(header.timestamp))
        } else {
            None
        };

        self.gc(header.timestamp);
        out
    }

    /// Number of incomplete records currently held.
    pub fn pending(&self) -> usize {
        self.records.len()
    }

    /// Drop records older than `arrived - gc_window`.
    ///
    /// Ages are computed with wrapping subtraction so the comparison
    /// survives 32-bit clock wrap; a timestamp "in the future" relative
    /// to `arrived` lands in the upper half-range and is never dropped.
    fn gc(&mut self, arrived: u32) {
        let window = self.gc_window;
        self.records.retain(|&ts, _| {
            let age = arrived.wrapping_sub(ts);
            age >= 0x8000_0000 || age <= window
        });
    }
}

// ── Tests ────────────────────────────────────────────────────────
