//! In-memory [`PopupHost`] for tests and the harness.
//!
//! Plays the part of the browser: records every popup it is asked to open,
//! lets the caller close popups "as the user", and delivers posted messages
//! to the installed listener.

use crate::bridge::{MessageListener, WindowMessage};
use crate::popup::{PopupHost, PopupWindow, ScreenMetrics, WindowFeatures};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct PopupState {
    url: String,
    features: WindowFeatures,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    closed_checks: AtomicUsize,
}

/// Test-side view of a popup opened by the simulated host.
#[derive(Debug, Clone)]
pub struct SimulatedPopup {
    state: Arc<PopupState>,
}

impl SimulatedPopup {
    pub fn url(&self) -> &str {
        &self.state.url
    }

    pub fn features(&self) -> WindowFeatures {
        self.state.features
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// How many times the opener asked for this window to be closed.
    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    /// How many times the opener read the window's closed flag.
    pub fn closed_checks(&self) -> usize {
        self.state.closed_checks.load(Ordering::SeqCst)
    }

    /// Close the window the way a user would (no call from the opener).
    pub fn user_close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

struct SimulatedWindow {
    state: Arc<PopupState>,
}

impl PopupWindow for SimulatedWindow {
    fn is_closed(&self) -> bool {
        self.state.closed_checks.fetch_add(1, Ordering::SeqCst);
        self.state.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

pub struct SimulatedHost {
    metrics: ScreenMetrics,
    block_popups: AtomicBool,
    popups: Mutex<Vec<SimulatedPopup>>,
    listener: Mutex<Option<MessageListener>>,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::with_metrics(ScreenMetrics {
            screen_left: Some(0),
            screen_top: Some(0),
            inner_width: Some(1280),
            inner_height: Some(800),
            screen_width: 1280,
            screen_height: 800,
            ..ScreenMetrics::default()
        })
    }

    pub fn with_metrics(metrics: ScreenMetrics) -> Self {
        Self {
            metrics,
            block_popups: AtomicBool::new(false),
            popups: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
        }
    }

    /// Make subsequent `open_popup` calls fail like a popup blocker would.
    pub fn set_block_popups(&self, block: bool) {
        self.block_popups.store(block, Ordering::SeqCst);
    }

    pub fn popups(&self) -> Vec<SimulatedPopup> {
        lock(&self.popups).clone()
    }

    pub fn opened_count(&self) -> usize {
        lock(&self.popups).len()
    }

    pub fn last_popup(&self) -> Option<SimulatedPopup> {
        lock(&self.popups).last().cloned()
    }

    pub fn has_message_listener(&self) -> bool {
        lock(&self.listener).is_some()
    }

    /// Post `data` to the opener from `origin`.
    ///
    /// Returns false when no listener is installed (the message is dropped).
    pub fn post_message(&self, origin: &str, data: Value) -> bool {
        // Clone out so the listener runs without the lock held
        let listener = lock(&self.listener).clone();
        match listener {
            Some(listener) => {
                listener(WindowMessage::new(origin, data));
                true
            }
            None => false,
        }
    }
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl PopupHost for SimulatedHost {
    fn screen_metrics(&self) -> ScreenMetrics {
        self.metrics
    }

    fn open_popup(
        &self,
        url: &str,
        _target: &str,
        features: &WindowFeatures,
    ) -> Option<Box<dyn PopupWindow>> {
        if self.block_popups.load(Ordering::SeqCst) {
            return None;
        }

        let state = Arc::new(PopupState {
            url: url.to_string(),
            features: *features,
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            closed_checks: AtomicUsize::new(0),
        });
        lock(&self.popups).push(SimulatedPopup {
            state: Arc::clone(&state),
        });

        Some(Box::new(SimulatedWindow { state }))
    }

    fn set_message_listener(&self, listener: MessageListener) {
        *lock(&self.listener) = Some(listener);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
