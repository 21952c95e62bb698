// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Receiver personality (§2): the superframe master. Owns the sync beacon
//! cadence, the channel hop sequence, the pairing window, USB HID
//! republishing, and the persisted network key + roster, all wired over
//! the board-supplied `RadioPhy`/`NvStorage`/`UsbHid`/`Gpio`
//! implementations (§5/§6).

#![cfg_attr(not(test), no_std)]

use link_core::pairing::{handle_request, PairingWindow};
use link_core::receiver::BeaconFrame;
use link_core::{Clock, LinkConfig, ReceiverLink, Roster, RosterEntry};
use link_hal::event::Event;
use link_hal::gpio::{Gpio, GpioEdge};
use link_hal::radio::RadioPhy;
use link_hal::storage::NvStorage;
use link_hal::usb::UsbHid;
use link_hal::LinkError;
use link_radio::ChannelManager;
use link_storage::DoubleBufferedRecord;

/// Network-key record offsets (§6 persisted-storage layout).
const NETWORK_KEY_BANK_A: usize = 0x0300;
const NETWORK_KEY_BANK_B: usize = 0x0B00;

/// Pairing record offsets (§6: "pairing: network key, roster"). The roster
/// half lives here, one slot per possible tracker id, each
/// `{tracker_id: u8, hw_addr: [u8; 6]}` (7 bytes); the wire beacon's
/// `roster_mask` caps a roster at 24 trackers, so 24 slots covers every
/// `ReceiverBoard<N, ..>` this crate can build regardless of `N`.
const PAIRING_RECORD_BANK_A: usize = 0x0200;
const PAIRING_RECORD_BANK_B: usize = 0x0A00;
const MAX_PERSISTED_TRACKERS: usize = 24;
const PAIRING_RECORD_CAP: usize = 1 + MAX_PERSISTED_TRACKERS * 7;

pub struct ReceiverBoard<const N: usize, const CAP: usize, const N_CHANNELS: usize> {
    link: ReceiverLink<N, CAP>,
    channels: ChannelManager<N_CHANNELS>,
    clock: Clock,
    pairing_window: Option<PairingWindow>,
    network_key: u32,
    network_key_record: DoubleBufferedRecord<4>,
    roster_record: DoubleBufferedRecord<PAIRING_RECORD_CAP>,
    config: LinkConfig,
}

impl<const N: usize, const CAP: usize, const N_CHANNELS: usize> ReceiverBoard<N, CAP, N_CHANNELS> {
    pub fn new(network_key: u32, channel_table: [u8; N_CHANNELS], config: LinkConfig) -> Self {
        ReceiverBoard {
            link: ReceiverLink::new(network_key, config),
            channels: ChannelManager::new(channel_table),
            clock: Clock::new(),
            pairing_window: None,
            network_key,
            network_key_record: DoubleBufferedRecord::new(NETWORK_KEY_BANK_A, NETWORK_KEY_BANK_B),
            roster_record: DoubleBufferedRecord::new(PAIRING_RECORD_BANK_A, PAIRING_RECORD_BANK_B),
            config,
        }
    }

    /// Restore a previously-persisted network key, rebuilding the receiver
    /// link around it (§4.8: a fresh `StorageCorrupt` boot instead generates
    /// a new key and re-persists, handled by the caller via [`Self::reset_network_key`]).
    /// This replaces `self.link`, so call [`Self::load_roster`] afterward,
    /// not before, when restoring full boot state.
    pub fn load_network_key(&mut self, storage: &mut impl NvStorage) -> Result<(), LinkError> {
        let bytes = self.network_key_record.read(storage)?;
        if bytes.len() == 4 {
            let key = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            self.network_key = key;
            self.link = ReceiverLink::new(key, self.config);
        }
        Ok(())
    }

    /// Restore every previously-paired tracker into the roster (§4.8: the
    /// `pairing` record holds the network key and the roster; call after
    /// [`Self::load_network_key`] so a fresh `ReceiverLink` isn't discarded
    /// along with it).
    pub fn load_roster(&mut self, storage: &mut impl NvStorage) -> Result<(), LinkError> {
        let bytes = self.roster_record.read(storage)?;
        let Some(&count) = bytes.first() else { return Ok(()) };
        for slot in bytes[1..].chunks_exact(7).take(count as usize) {
            let tracker_id = slot[0];
            let hw_addr: [u8; 6] = slot[1..7].try_into().unwrap();
            self.link.roster_mut().restore(tracker_id, hw_addr, 0);
        }
        Ok(())
    }

    /// Serialize the full roster to the `pairing` record (§4.7: "...writes
    /// roster, persists"). Called once per newly-allocated tracker; cheap
    /// since a roster tops out at [`MAX_PERSISTED_TRACKERS`] entries.
    fn persist_roster(&mut self, storage: &mut impl NvStorage) -> Result<(), LinkError> {
        let mut bytes = heapless::Vec::<u8, PAIRING_RECORD_CAP>::new();
        bytes.push(0).unwrap(); // count, filled in below
        let mut count = 0u8;
        for (tracker_id, entry) in self.link.roster().iter() {
            if bytes.extend_from_slice(&[tracker_id]).is_err() {
                break;
            }
            if bytes.extend_from_slice(&entry.hw_addr).is_err() {
                break;
            }
            count += 1;
        }
        bytes[0] = count;
        self.roster_record.write(storage, &bytes).map_err(LinkError::from)
    }

    /// Generate-and-persist path for first boot or `StorageCorrupt` recovery
    /// (§7): the board supplies entropy since this crate has no RNG of its
    /// own.
    pub fn reset_network_key(&mut self, storage: &mut impl NvStorage, new_key: u32) -> Result<(), LinkError> {
        self.network_key = new_key;
        self.link = ReceiverLink::new(new_key, self.config);
        self.network_key_record.write(storage, &new_key.to_le_bytes()).map_err(LinkError::from)
    }

    pub fn roster(&self) -> &Roster<N> {
        self.link.roster()
    }

    pub fn is_pairing(&self) -> bool {
        self.pairing_window.is_some()
    }

    /// Enter pairing mode (button gesture or `0x11` HID host command), good
    /// for `LinkConfig::pairing_timeout_s` unless refreshed by traffic.
    pub fn open_pairing(&mut self, now_ms: u32) {
        self.pairing_window = Some(PairingWindow::open(now_ms, self.config.pairing_timeout_s));
    }

    pub fn close_pairing(&mut self) {
        self.pairing_window = None;
    }

    fn service_tick(&mut self, now_ms: u32) {
        self.clock.on_tick();
        if let Some(window) = &self.pairing_window {
            if window.is_expired(now_ms) {
                self.pairing_window = None;
            }
        }
    }

    /// Step 1 of the superframe (§4.6): emit the sync beacon on the data
    /// pipe, re-seeding the hop sequence from the current frame number.
    pub fn emit_beacon(&mut self, radio: &mut impl RadioPhy, now_ms: u32) -> Result<BeaconFrame, LinkError> {
        let hop_seq = self.channels.hop_sequence(self.network_key, self.link.frame_number());
        let beacon = self.link.emit_beacon(now_ms, hop_seq);
        radio.transmit(&beacon).map_err(|_| LinkError::HalFault)?;
        Ok(beacon)
    }

    /// Step 4 of the superframe: drain up to `receiver_reports_per_ms` HID
    /// reports, called once per millisecond.
    pub fn service_usb<U: UsbHid>(&mut self, usb: &mut U, now_ms: u32) -> Result<(), LinkError> {
        self.link.service_usb(usb, now_ms)
    }

    /// Once per second: roll the channel-quality window and re-evaluate the
    /// blacklist (§4.3).
    pub fn service_channels(&mut self) {
        self.channels.tick();
    }

    pub fn handle_event(
        &mut self,
        event: Event,
        radio: &mut impl RadioPhy,
        storage: &mut impl NvStorage,
        gpio: &impl Gpio,
        now_ms: u32,
    ) -> Result<(), LinkError> {
        match event {
            Event::Tick => self.service_tick(now_ms),
            Event::ImuReady => {}
            Event::RadioRx(frame) => self.service_radio_rx(&frame.bytes, frame.rssi, radio, storage, now_ms)?,
            Event::Gpio(edge) => self.service_gpio(edge, gpio, now_ms),
        }
        Ok(())
    }

    fn service_radio_rx(
        &mut self,
        bytes: &[u8],
        rssi: i8,
        radio: &mut impl RadioPhy,
        storage: &mut impl NvStorage,
        now_ms: u32,
    ) -> Result<(), LinkError> {
        if self.pairing_window.is_some() && bytes.len() == link_core::pairing::FRAME_LEN {
            let frame: [u8; link_core::pairing::FRAME_LEN] = bytes.try_into().unwrap();
            if let Ok(response) = handle_request(&frame, self.link.roster_mut(), self.network_key, now_ms) {
                if let Some(window) = &mut self.pairing_window {
                    window.on_request_received(now_ms);
                }
                let _ = self.persist_roster(storage);
                radio.transmit(&response).map_err(|_| LinkError::HalFault)?;
            }
            return Ok(());
        }
        self.link.on_rx_frame(bytes, rssi, now_ms)
    }

    fn service_gpio(&mut self, edge: GpioEdge, _gpio: &impl Gpio, now_ms: u32) {
        match edge {
            GpioEdge::ButtonDoubleTap => {
                if self.pairing_window.is_some() {
                    self.close_pairing();
                } else {
                    self.open_pairing(now_ms);
                }
            }
            GpioEdge::ButtonTap | GpioEdge::ButtonLongPress | GpioEdge::ChargerChanged { .. } => {}
        }
    }

    pub fn roster_entry(&self, tracker_id: u8) -> Option<&RosterEntry> {
        self.link.roster().get(tracker_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use link_core::mock::{MockNvStorage, MockRadioPhy, MockUsbHid};

    struct StubGpio;
    impl Gpio for StubGpio {
        fn battery_percent(&self) -> u8 {
            100
        }
        fn battery_millivolts(&self) -> u16 {
            4200
        }
    }

    #[test]
    fn network_key_survives_a_reload() {
        let mut storage: MockNvStorage<4096> = MockNvStorage::new();
        let mut board: ReceiverBoard<10, 32, 4> = ReceiverBoard::new(0, [11, 15, 20, 25], LinkConfig::default());
        board.reset_network_key(&mut storage, 0x1234_5678).unwrap();

        let mut reloaded: ReceiverBoard<10, 32, 4> = ReceiverBoard::new(0, [11, 15, 20, 25], LinkConfig::default());
        reloaded.load_network_key(&mut storage).unwrap();
        assert_eq!(reloaded.network_key, 0x1234_5678);
    }

    #[test]
    fn a_pairing_request_while_in_pairing_mode_allocates_a_tracker_and_replies() {
        let mut board: ReceiverBoard<10, 32, 4> = ReceiverBoard::new(0xAAAA_BBBB, [11, 15, 20, 25], LinkConfig::default());
        board.open_pairing(0);
        assert!(board.is_pairing());

        let mut radio = MockRadioPhy::new();
        let mut storage: MockNvStorage<4096> = MockNvStorage::new();
        let gpio = StubGpio;

        let request = link_core::pairing::build_request([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        let mut bytes = heapless::Vec::<u8, { link_hal::radio::MAX_FRAME_LEN }>::new();
        bytes.extend_from_slice(&request).unwrap();

        board
            .handle_event(
                Event::RadioRx(link_hal::radio::RxFrame { bytes, rssi: -40, channel: 2 }),
                &mut radio,
                &mut storage,
                &gpio,
                0,
            )
            .unwrap();

        assert_eq!(board.roster().len(), 1);
        assert!(radio.last_tx.is_some());
    }

    #[test]
    fn the_roster_survives_a_reload_after_a_pairing_request() {
        let mut board: ReceiverBoard<10, 32, 4> = ReceiverBoard::new(0xAAAA_BBBB, [11, 15, 20, 25], LinkConfig::default());
        board.open_pairing(0);

        let mut radio = MockRadioPhy::new();
        let mut storage: MockNvStorage<4096> = MockNvStorage::new();
        let gpio = StubGpio;

        let request = link_core::pairing::build_request([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        let mut bytes = heapless::Vec::<u8, { link_hal::radio::MAX_FRAME_LEN }>::new();
        bytes.extend_from_slice(&request).unwrap();
        board
            .handle_event(Event::RadioRx(link_hal::radio::RxFrame { bytes, rssi: -40, channel: 2 }), &mut radio, &mut storage, &gpio, 0)
            .unwrap();
        assert_eq!(board.roster().len(), 1);

        let mut reloaded: ReceiverBoard<10, 32, 4> = ReceiverBoard::new(0xAAAA_BBBB, [11, 15, 20, 25], LinkConfig::default());
        reloaded.load_roster(&mut storage).unwrap();
        assert_eq!(reloaded.roster().len(), 1);
        let entry = reloaded.roster_entry(0).expect("tracker 0 should have been restored");
        assert_eq!(entry.hw_addr, [0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(entry.detect_count, 0, "a restored entry's runtime counters start fresh");
    }

    #[test]
    fn pairing_mode_times_out_without_activity() {
        let mut board: ReceiverBoard<10, 32, 4> = ReceiverBoard::new(1, [11, 15, 20, 25], LinkConfig::default());
        board.open_pairing(0);

        let mut radio = MockRadioPhy::new();
        let mut storage: MockNvStorage<4096> = MockNvStorage::new();
        let gpio = StubGpio;

        board.handle_event(Event::Tick, &mut radio, &mut storage, &gpio, 61_000).unwrap();
        assert!(!board.is_pairing());
    }

    #[test]
    fn beacon_emission_transmits_and_advances_the_frame_counter() {
        let mut board: ReceiverBoard<10, 32, 4> = ReceiverBoard::new(0x1111_2222, [11, 15, 20, 25], LinkConfig::default());
        let mut radio = MockRadioPhy::new();
        let beacon = board.emit_beacon(&mut radio, 0).unwrap();
        assert_eq!(beacon[0], 0xBE);
        assert_eq!(radio.last_tx.as_deref(), Some(beacon.as_slice()));
    }

    #[test]
    fn usb_service_delegates_to_the_underlying_link() {
        let mut board: ReceiverBoard<10, 32, 4> = ReceiverBoard::new(1, [11, 15, 20, 25], LinkConfig::default());
        let mut usb = MockUsbHid::new();
        board.service_usb(&mut usb, 0).unwrap();
        assert!(usb.reports.is_empty());
    }
}
