// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Channel Manager (§4.3): a 10 s sliding-window loss/RSSI tracker per
//! channel, blacklist hysteresis with a 3-channel floor, clear-channel
//! assessment, and the adaptive hop sequence.

use crate::error::RadioError;
use link_hal::radio::{RadioError as PhyError, RadioPhy};

/// 10 one-second buckets give the 10 s sliding window named in the
/// component design.
const WINDOW_BUCKETS: usize = 10;
const BLACKLIST_LOSS_PCT: u32 = 30;
const REHABILITATE_LOSS_PCT: u32 = 10;
const MIN_ACTIVE_CHANNELS: usize = 3;
const CCA_CLEAR_RSSI_DBM: i8 = -65;

/// Galois LFSR feedback taps for the hop-sequence generator.
const LFSR_TAPS: u16 = 0xB400;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    tx: u16,
    ack: u16,
    crc_err: u16,
    rssi_sum: i32,
    rssi_samples: u16,
}

#[derive(Debug, Clone, Copy)]
struct ChannelStats {
    buckets: [Bucket; WINDOW_BUCKETS],
    head: usize,
    blacklisted: bool,
}

impl Default for ChannelStats {
    fn default() -> Self {
        ChannelStats {
            buckets: [Bucket::default(); WINDOW_BUCKETS],
            head: 0,
            blacklisted: false,
        }
    }
}

impl ChannelStats {
    fn current_bucket(&mut self) -> &mut Bucket {
        &mut self.buckets[self.head]
    }

    fn window_totals(&self) -> Bucket {
        let mut total = Bucket::default();
        for b in &self.buckets {
            total.tx += b.tx;
            total.ack += b.ack;
            total.crc_err += b.crc_err;
            total.rssi_sum += b.rssi_sum;
            total.rssi_samples += b.rssi_samples;
        }
        total
    }

    fn loss_rate_pct(&self) -> Option<u32> {
        let totals = self.window_totals();
        if totals.tx == 0 {
            return None;
        }
        let lost = u32::from(totals.tx).saturating_sub(u32::from(totals.ack));
        Some(lost * 100 / u32::from(totals.tx))
    }

    fn average_rssi(&self) -> Option<i8> {
        let totals = self.window_totals();
        if totals.rssi_samples == 0 {
            return None;
        }
        Some((totals.rssi_sum / i32::from(totals.rssi_samples)) as i8)
    }

    fn advance_window(&mut self) {
        self.head = (self.head + 1) % WINDOW_BUCKETS;
        self.buckets[self.head] = Bucket::default();
    }
}

/// Tracks per-channel quality and derives the hop sequence for a fixed set
/// of `N` physical channels (the RF channel numbers named in `table`).
pub struct ChannelManager<const N: usize> {
    table: [u8; N],
    stats: [ChannelStats; N],
    lfsr_state: u16,
}

impl<const N: usize> ChannelManager<N> {
    pub fn new(table: [u8; N]) -> Self {
        assert!(N >= MIN_ACTIVE_CHANNELS, "channel table must cover the active-channel floor");
        ChannelManager { table, stats: [ChannelStats::default(); N], lfsr_state: 1 }
    }

    pub fn active_count(&self) -> usize {
        self.stats.iter().filter(|s| !s.blacklisted).count()
    }

    pub fn is_blacklisted(&self, channel_idx: usize) -> bool {
        self.stats[channel_idx].blacklisted
    }

    /// Record the outcome of one TX attempt on `channel_idx` (§9 design note:
    /// the channel manager takes only value-typed feedback per call, it does
    /// not hold a reference back into the link state).
    pub fn record_tx(&mut self, channel_idx: usize, acked: bool, rssi: Option<i8>) {
        let bucket = self.stats[channel_idx].current_bucket();
        bucket.tx += 1;
        if acked {
            bucket.ack += 1;
        }
        if let Some(r) = rssi {
            bucket.rssi_sum += i32::from(r);
            bucket.rssi_samples += 1;
        }
    }

    pub fn record_crc_error(&mut self, channel_idx: usize) {
        self.stats[channel_idx].current_bucket().crc_err += 1;
    }

    /// Called once per second: rolls the window forward and re-evaluates
    /// the blacklist for every channel. §4.3: a channel blacklists once its
    /// 10 s window loss exceeds 30%, and rehabilitates once that same
    /// window (now flushed of the bad history) itself reads under 10% —
    /// there is no additional hold-off beyond the window's own 10 s reach.
    pub fn tick(&mut self) {
        for stats in &mut self.stats {
            stats.advance_window();
        }

        for stats in &mut self.stats {
            match stats.loss_rate_pct() {
                Some(loss) if loss > BLACKLIST_LOSS_PCT => stats.blacklisted = true,
                Some(loss) if stats.blacklisted && loss < REHABILITATE_LOSS_PCT => stats.blacklisted = false,
                _ => {}
            }
        }

        self.enforce_active_floor();
    }

    /// If rehabilitation and blacklisting together would drop the active
    /// set below the floor, force-reactivate the least-bad blacklisted
    /// channel (lowest window loss rate).
    fn enforce_active_floor(&mut self) {
        while self.active_count() < MIN_ACTIVE_CHANNELS {
            let least_bad = self
                .stats
                .iter()
                .enumerate()
                .filter(|(_, s)| s.blacklisted)
                .min_by_key(|(_, s)| s.loss_rate_pct().unwrap_or(0));
            match least_bad {
                Some((idx, _)) => self.stats[idx].blacklisted = false,
                None => break,
            }
        }
    }

    fn nearest_active(&self, idx: usize) -> usize {
        if !self.stats[idx].blacklisted {
            return idx;
        }
        for distance in 1..N {
            if idx >= distance && !self.stats[idx - distance].blacklisted {
                return idx - distance;
            }
            if idx + distance < N && !self.stats[idx + distance].blacklisted {
                return idx + distance;
            }
        }
        idx
    }

    fn lfsr_step(&mut self) -> u16 {
        let lsb = self.lfsr_state & 1;
        let mut next = self.lfsr_state >> 1;
        if lsb != 0 {
            next ^= LFSR_TAPS;
        }
        self.lfsr_state = next;
        next
    }

    /// Regenerate the 8-entry hop sequence carried in the sync beacon,
    /// rewriting any blacklisted channel index to the nearest active one.
    pub fn hop_sequence(&mut self, network_key: u32, frame_number: u16) -> [u8; 8] {
        let seed = ((network_key ^ u32::from(frame_number)) & 0xFFFF) as u16;
        self.lfsr_state = if seed == 0 { 1 } else { seed };

        let mut out = [0u8; 8];
        for slot in &mut out {
            let raw = self.lfsr_step();
            let idx = (raw as usize) % N;
            let active_idx = self.nearest_active(idx);
            *slot = self.table[active_idx];
        }
        out
    }

    /// Clear-channel assessment: sample RSSI on up to `max_retries`
    /// candidate channels, returning the first one under the clear
    /// threshold, or the current channel if none qualify.
    pub fn pick_clear_channel(
        &mut self,
        phy: &mut impl RadioPhy,
        candidates: &[u8],
        max_retries: u8,
    ) -> Result<u8, RadioError> {
        for &channel in candidates.iter().take(max_retries as usize) {
            phy.set_channel(channel).map_err(phy_err)?;
            if let Some(rssi) = phy.sample_rssi() {
                if rssi < CCA_CLEAR_RSSI_DBM {
                    return Ok(channel);
                }
            }
        }
        candidates.first().copied().ok_or(RadioError::NoClearChannel)
    }
}

fn phy_err(_: PhyError) -> RadioError {
    RadioError::Phy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_loss(mgr: &mut ChannelManager<4>, idx: usize, cycles: usize, loss_pct: u32) {
        for _ in 0..cycles {
            let tx = 100u16;
            let ack = (tx as u32 * (100 - loss_pct) / 100) as u16;
            for _ in 0..ack {
                mgr.record_tx(idx, true, Some(-70));
            }
            for _ in ack..tx {
                mgr.record_tx(idx, false, Some(-70));
            }
            mgr.tick();
        }
    }

    #[test]
    fn blacklists_at_35_percent_loss() {
        let mut mgr = ChannelManager::new([11, 15, 20, 25]);
        feed_loss(&mut mgr, 0, WINDOW_BUCKETS, 35);
        assert!(mgr.is_blacklisted(0));
    }

    #[test]
    fn does_not_rehabilitate_at_20_percent_loss() {
        let mut mgr = ChannelManager::new([11, 15, 20, 25]);
        feed_loss(&mut mgr, 0, WINDOW_BUCKETS, 35);
        assert!(mgr.is_blacklisted(0));
        feed_loss(&mut mgr, 0, WINDOW_BUCKETS, 20);
        assert!(mgr.is_blacklisted(0), "20% loss must not rehabilitate");
    }

    #[test]
    fn rehabilitates_after_a_full_window_below_10_percent() {
        let mut mgr = ChannelManager::new([11, 15, 20, 25]);
        feed_loss(&mut mgr, 0, WINDOW_BUCKETS, 35);
        assert!(mgr.is_blacklisted(0));
        feed_loss(&mut mgr, 0, WINDOW_BUCKETS, 5);
        assert!(!mgr.is_blacklisted(0));
    }

    #[test]
    fn active_channel_floor_is_never_breached() {
        let mut mgr = ChannelManager::new([11, 15, 20, 25]);
        for idx in 0..4 {
            feed_loss(&mut mgr, idx, WINDOW_BUCKETS, 90);
        }
        assert!(mgr.active_count() >= MIN_ACTIVE_CHANNELS);
    }

    #[test]
    fn hop_sequence_rewrites_blacklisted_entries() {
        let mut mgr = ChannelManager::new([11, 15, 20, 25]);
        feed_loss(&mut mgr, 1, WINDOW_BUCKETS, 35);
        assert!(mgr.is_blacklisted(1));
        let hop = mgr.hop_sequence(0x1234_5678, 42);
        for &ch in &hop {
            assert_ne!(ch, 15, "blacklisted channel 15 should have been rewritten");
        }
    }
}
