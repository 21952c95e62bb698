// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The tagged event ring every ISR source deposits into.
//!
//! Four ISR sources feed shared state (§5): radio RX, IMU data-ready, the
//! 1 kHz tick, and GPIO. Each is modeled as a variant of [`Event`]; an ISR's
//! entire body is "build one `Event` and push it", and all decision logic
//! lives in the cooperative main loop that drains the ring and dispatches by
//! `match`. This is the message-passing redesign called out for
//! function-pointer callbacks in the design notes.

use crate::gpio::GpioEdge;
use crate::radio::RxFrame;
use core::cell::RefCell;
use critical_section::Mutex;
use heapless::Deque;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    RadioRx(RxFrame),
    ImuReady,
    Tick,
    Gpio(GpioEdge),
}

/// A bounded single-producer/single-consumer mailbox, safe to push from an
/// ISR (via [`EventMailbox::push`], which never blocks and drops the event
/// on overflow rather than stalling the interrupt) and drain from the main
/// loop (via [`EventMailbox::pop`]).
pub struct EventMailbox<const N: usize> {
    queue: Mutex<RefCell<Deque<Event, N>>>,
}

impl<const N: usize> EventMailbox<N> {
    pub const fn new() -> Self {
        EventMailbox {
            queue: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Push an event from interrupt context. Returns `false` (and drops the
    /// event) if the mailbox is full; callers should count this as loss
    /// rather than retry, since retrying from an ISR risks re-entrancy.
    pub fn push(&self, event: Event) -> bool {
        critical_section::with(|cs| {
            let mut q = self.queue.borrow_ref_mut(cs);
            q.push_back(event).is_ok()
        })
    }

    /// Drain one event from the main loop.
    pub fn pop(&self) -> Option<Event> {
        critical_section::with(|cs| self.queue.borrow_ref_mut(cs).pop_front())
    }

    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.queue.borrow_ref(cs).is_empty())
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.queue.borrow_ref(cs).len())
    }
}

impl<const N: usize> Default for EventMailbox<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_fifo() {
        let mailbox: EventMailbox<4> = EventMailbox::new();
        assert!(mailbox.push(Event::Tick));
        assert!(mailbox.push(Event::ImuReady));
        assert!(matches!(mailbox.pop(), Some(Event::Tick)));
        assert!(matches!(mailbox.pop(), Some(Event::ImuReady)));
        assert!(mailbox.pop().is_none());
    }

    #[test]
    fn overflow_drops_and_reports_false() {
        let mailbox: EventMailbox<2> = EventMailbox::new();
        assert!(mailbox.push(Event::Tick));
        assert!(mailbox.push(Event::Tick));
        assert!(!mailbox.push(Event::Tick));
        assert_eq!(mailbox.len(), 2);
    }
}
