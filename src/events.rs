//! Interrupt-driven event system.
//!
//! Events are produced by:
//! - Debounce timer callbacks (confirmed button presses)
//! - The periodic sample timer
//!
//! Events are consumed by the main loop, which drains the queue once per
//! iteration.
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Debounce timers  │────▶│  Event Queue │────▶│  Main Loop   │
//! │ Sample timer     │────▶│  (lock-free) │     │  (consumer)  │
//! └──────────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! BLE stack events carry payloads and travel through their own queue in
//! [`adapters::ble`](crate::adapters::ble).

use core::sync::atomic::{AtomicU8, Ordering};

/// Maximum number of pending events (one slot is kept free).
const EVENT_QUEUE_CAP: usize = 16;

/// System event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    /// Periodic battery sample timer fired.
    SampleTick = 10,
    /// Debounced press on the primary button.
    PrimaryButton = 20,
    /// Debounced press on the secondary button.
    SecondaryButton = 21,
}

impl Event {
    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            10 => Some(Self::SampleTick),
            20 => Some(Self::PrimaryButton),
            21 => Some(Self::SecondaryButton),
            _ => None,
        }
    }
}

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// Timer callbacks write (produce), main loop reads (consume). The main
// loop never pushes.
// Slots are atomics so the queue can live in a `static` without
// `static mut`.

pub struct EventQueue {
    head: AtomicU8,
    tail: AtomicU8,
    slots: [AtomicU8; EVENT_QUEUE_CAP],
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
            slots: [const { AtomicU8::new(0) }; EVENT_QUEUE_CAP],
        }
    }

    /// Push an event. Safe from timer/ISR context (single producer).
    /// Returns `false` if the queue is full (event dropped).
    pub fn push(&self, event: Event) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

        if next_head == tail {
            return false;
        }

        self.slots[head as usize].store(event as u8, Ordering::Relaxed);
        self.head.store(next_head, Ordering::Release);
        true
    }

    /// Pop the next event (single consumer).
    pub fn pop(&self) -> Option<Event> {
        loop {
            let tail = self.tail.load(Ordering::Relaxed);
            let head = self.head.load(Ordering::Acquire);

            if tail == head {
                return None;
            }

            let raw = self.slots[tail as usize].load(Ordering::Relaxed);
            self.tail
                .store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);

            // Unknown discriminants are skipped rather than ending the drain.
            if let Some(event) = Event::from_u8(raw) {
                return Some(event);
            }
        }
    }

    /// Drain all pending events into a callback, FIFO order.
    pub fn drain(&self, mut handler: impl FnMut(Event)) {
        while let Some(event) = self.pop() {
            handler(event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Relaxed) == self.head.load(Ordering::Acquire)
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed) as usize;
        let tail = self.tail.load(Ordering::Relaxed) as usize;
        (head + EVENT_QUEUE_CAP - tail) % EVENT_QUEUE_CAP
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide queue shared by timer callbacks and the main loop.
static EVENTS: EventQueue = EventQueue::new();

/// Push into the global queue. Logs nothing: may run in timer context.
pub fn push_event(event: Event) -> bool {
    EVENTS.push(event)
}

/// Drain the global queue (main loop only).
pub fn drain_events(handler: impl FnMut(Event)) {
    EVENTS.drain(handler);
}
