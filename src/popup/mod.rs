//! Popup window management.
//!
//! The browser is reached through [`PopupHost`]; this module only decides
//! where the popup goes and owns the handle once it is open.
//!
//! ```text
//!   screen_left (or screen_x)
//!   |<------------- viewport width ------------->|
//!   |              |<-- popup width -->|          |
//!   |              left
//! ```

use crate::bridge::MessageListener;
use crate::config::PopupConfig;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Screen and viewport measurements of the opener window.
///
/// Browsers disagree on which of these are populated, hence the options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenMetrics {
    pub screen_left: Option<i32>,
    pub screen_top: Option<i32>,
    pub screen_x: i32,
    pub screen_y: i32,
    pub inner_width: Option<u32>,
    pub inner_height: Option<u32>,
    pub client_width: Option<u32>,
    pub client_height: Option<u32>,
    pub screen_width: u32,
    pub screen_height: u32,
}

impl ScreenMetrics {
    fn origin(&self) -> (i32, i32) {
        (
            self.screen_left.unwrap_or(self.screen_x),
            self.screen_top.unwrap_or(self.screen_y),
        )
    }

    fn viewport(&self) -> (u32, u32) {
        let width = self
            .inner_width
            .or(self.client_width)
            .unwrap_or(self.screen_width);
        let height = self
            .inner_height
            .or(self.client_height)
            .unwrap_or(self.screen_height);
        (width, height)
    }
}

/// Features passed to the host when opening a popup.
///
/// Always opens with `noopener`: the popup never gets a reference back to
/// the opener. There is no constructor that turns it off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFeatures {
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
    noopener: bool,
}

impl WindowFeatures {
    /// Center a `width` x `height` popup over the opener's viewport.
    pub fn centered(metrics: &ScreenMetrics, width: u32, height: u32) -> Self {
        let (origin_left, origin_top) = metrics.origin();
        let (viewport_width, viewport_height) = metrics.viewport();

        let left = origin_left + half(viewport_width) - half(width);
        let top = origin_top + half(viewport_height) - half(height);

        Self {
            width,
            height,
            left,
            top,
            noopener: true,
        }
    }

    pub fn noopener(&self) -> bool {
        self.noopener
    }
}

fn half(value: u32) -> i32 {
    i32::try_from(value / 2).unwrap_or(i32::MAX)
}

impl fmt::Display for WindowFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "width={},height={},top={},left={}",
            self.width, self.height, self.top, self.left
        )?;
        if self.noopener {
            write!(f, ",noopener")?;
        }
        Ok(())
    }
}

/// A window opened by the host on behalf of a flow.
pub trait PopupWindow: Send {
    /// Whether the user (or anything else) closed the window.
    fn is_closed(&self) -> bool;

    /// Ask the host to close the window.
    fn close(&self);
}

/// The environment that owns the opener window.
///
/// A browser binding implements this on top of `window.open` and the
/// page's `message` event; tests use [`crate::sim::SimulatedHost`].
pub trait PopupHost: Send + Sync {
    fn screen_metrics(&self) -> ScreenMetrics;

    /// Open `url` in a new window. `None` means the host refused (popup blocker).
    fn open_popup(
        &self,
        url: &str,
        target: &str,
        features: &WindowFeatures,
    ) -> Option<Box<dyn PopupWindow>>;

    /// Install the page-wide cross-window message listener.
    fn set_message_listener(&self, listener: MessageListener);
}

/// Exclusive handle to the popup of one in-flight flow.
pub struct PopupHandle {
    window: Box<dyn PopupWindow>,
}

impl PopupHandle {
    pub fn is_closed(&self) -> bool {
        self.window.is_closed()
    }

    /// Close the window. Consumes the handle, so a window is closed at most once.
    pub fn close(self) {
        if self.window.is_closed() {
            debug!("Popup already closed, skipping close");
            return;
        }
        self.window.close();
    }
}

impl fmt::Debug for PopupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupHandle")
            .field("closed", &self.window.is_closed())
            .finish()
    }
}

/// Opens centered popups through a [`PopupHost`].
#[derive(Clone)]
pub struct PopupWindowManager {
    host: Arc<dyn PopupHost>,
    width: u32,
    height: u32,
}

impl PopupWindowManager {
    pub fn new(host: Arc<dyn PopupHost>, config: &PopupConfig) -> Self {
        Self {
            host,
            width: config.width,
            height: config.height,
        }
    }

    /// Features for a popup centered on the host's current screen.
    pub fn features(&self) -> WindowFeatures {
        WindowFeatures::centered(&self.host.screen_metrics(), self.width, self.height)
    }

    /// Open `url`, returning `None` when the host blocks the popup.
    pub fn open(&self, url: &str) -> Option<PopupHandle> {
        let features = self.features();
        debug!(url = %url, features = %features, "Opening popup");

        match self.host.open_popup(url, "_blank", &features) {
            Some(window) => Some(PopupHandle { window }),
            None => {
                warn!(url = %url, "Host refused to open popup (blocked?)");
                None
            }
        }
    }
}
