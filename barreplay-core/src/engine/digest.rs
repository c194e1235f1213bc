//! BLAKE3 fingerprint of a dispatch stream.
//!
//! Each dispatched bar contributes `symbol|seq|ts\n` in dispatch order, so two
//! replays with identical (symbol, sequence, timestamp) streams hash the same.

use crate::domain::{iso_utc, Bar};

#[derive(Debug, Clone, Default)]
pub struct DispatchDigest {
    hasher: blake3::Hasher,
    count: u64,
}

impl DispatchDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bar: &Bar) {
        let line = format!("{}|{}|{}\n", bar.symbol, bar.seq, iso_utc(bar.ts));
        self.hasher.update(line.as_bytes());
        self.count += 1;
    }

    /// Bars folded in so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Hex digest of everything seen so far.
    pub fn hex(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}
