//! Debounced push-button channels.
//!
//! ## Hardware
//!
//! Active-low momentary switches with internal pull-up. Two ways of turning
//! raw edges into presses are supported (selected by `ButtonMode`):
//!
//! - **Interrupt** (default): the GPIO ISR calls [`ButtonChannel::on_edge`].
//!   When the edge falls outside the quiescent window it arms a one-shot
//!   timer; the timer callback re-reads the pin and calls
//!   [`ButtonChannel::confirm`], which commits the press and pushes an
//!   [`Event`] for the main loop.
//! - **Polling**: the main loop feeds the raw level into
//!   [`ButtonChannel::poll`] each iteration, using a "was released" latch
//!   to detect the falling edge. Presses are dispatched in place and never
//!   touch the event queue, whose only producer is the timer task.
//!
//! All channel state is atomic so the statics can be shared between ISR,
//! timer task and main loop without `static mut`. Each field has one
//! writer context.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::events::Event;
use crate::pins;

/// A committed, debounced press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonPress {
    pub gpio: i32,
    /// Time the triggering edge was accepted (ms since boot, wrapping).
    pub at_ms: u32,
    /// Debounced state after this press. Flips once per committed press.
    pub state: bool,
}

pub struct ButtonChannel {
    gpio: i32,
    window_ms: AtomicU32,
    last_accept_ms: AtomicU32,
    accepted_any: AtomicBool,
    debounced_state: AtomicBool,
    released_latch: AtomicBool,
}

impl ButtonChannel {
    pub const fn new(gpio: i32, window_ms: u32) -> Self {
        Self {
            gpio,
            window_ms: AtomicU32::new(window_ms),
            last_accept_ms: AtomicU32::new(0),
            accepted_any: AtomicBool::new(false),
            debounced_state: AtomicBool::new(false),
            released_latch: AtomicBool::new(true),
        }
    }

    pub fn gpio(&self) -> i32 {
        self.gpio
    }

    /// Set the quiescent window. Boot only, before interrupts are enabled.
    pub fn set_window(&self, window_ms: u32) {
        self.window_ms.store(window_ms, Ordering::Relaxed);
    }

    pub fn window_ms(&self) -> u32 {
        self.window_ms.load(Ordering::Relaxed)
    }

    pub fn debounced_state(&self) -> bool {
        self.debounced_state.load(Ordering::Acquire)
    }

    /// Record a raw edge. Returns `true` when the edge is outside the
    /// quiescent window and the caller should arm the confirmation timer.
    ///
    /// Safe from ISR context.
    pub fn on_edge(&self, now_ms: u32) -> bool {
        if self.accepted_any.load(Ordering::Acquire) {
            let last = self.last_accept_ms.load(Ordering::Relaxed);
            if now_ms.wrapping_sub(last) <= self.window_ms() {
                return false;
            }
        }
        self.last_accept_ms.store(now_ms, Ordering::Relaxed);
        self.accepted_any.store(true, Ordering::Release);
        true
    }

    /// Confirmation timer expiry. Commits the press only if the pin still
    /// reads pressed; a bounce that has already released is dropped.
    pub fn confirm(&self, still_pressed: bool) -> Option<ButtonPress> {
        if !still_pressed {
            return None;
        }
        let state = !self.debounced_state.load(Ordering::Relaxed);
        self.debounced_state.store(state, Ordering::Release);
        Some(ButtonPress {
            gpio: self.gpio,
            at_ms: self.last_accept_ms.load(Ordering::Relaxed),
            state,
        })
    }

    /// Polling path: call once per main-loop iteration with the current
    /// pin level (`true` = pressed).
    pub fn poll(&self, pressed: bool, now_ms: u32) -> Option<ButtonPress> {
        if !pressed {
            self.released_latch.store(true, Ordering::Relaxed);
            return None;
        }
        if !self.released_latch.swap(false, Ordering::Relaxed) {
            // Still held since the last iteration.
            return None;
        }
        if self.on_edge(now_ms) {
            self.confirm(true)
        } else {
            None
        }
    }
}

// ── Physical channels ─────────────────────────────────────────

pub static PRIMARY: ButtonChannel = ButtonChannel::new(pins::BUTTON_PRIMARY_GPIO, 50);
pub static SECONDARY: ButtonChannel = ButtonChannel::new(pins::BUTTON_SECONDARY_GPIO, 50);

/// Identifies one of the two physical buttons. Used as the timer/ISR
/// argument so a single C callback can serve both channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ButtonId {
    Primary = 0,
    Secondary = 1,
}

impl ButtonId {
    pub const ALL: [ButtonId; 2] = [ButtonId::Primary, ButtonId::Secondary];

    pub fn channel(self) -> &'static ButtonChannel {
        match self {
            Self::Primary => &PRIMARY,
            Self::Secondary => &SECONDARY,
        }
    }

    pub fn event(self) -> Event {
        match self {
            Self::Primary => Event::PrimaryButton,
            Self::Secondary => Event::SecondaryButton,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Primary),
            1 => Some(Self::Secondary),
            _ => None,
        }
    }
}

/// Apply the configured debounce window to both channels.
pub fn configure(window_ms: u32) {
    for id in ButtonId::ALL {
        id.channel().set_window(window_ms);
    }
}

/// ISR entry: returns `true` when the confirmation timer should be armed.
pub fn button_isr_handler(id: ButtonId, now_ms: u32) -> bool {
    id.channel().on_edge(now_ms)
}

/// Confirmation timer entry: re-check the pin and queue the press.
pub fn confirm_press(id: ButtonId, still_pressed: bool) -> bool {
    match id.channel().confirm(still_pressed) {
        Some(_) => crate::events::push_event(id.event()),
        None => false,
    }
}
