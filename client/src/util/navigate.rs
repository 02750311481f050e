//! Full-page navigation.
//!
//! Router navigation keeps in-memory state alive. Logout needs the opposite:
//! a real page load, so nothing from the previous session survives.

/// Navigation that discards the current document.
pub trait Navigator: Send + Sync {
    fn hard_navigate(&self, path: &str);
}

/// Sets `window.location.href`. Inert outside the browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn hard_navigate(&self, path: &str) {
        #[cfg(feature = "hydrate")]
        {
            if let Some(w) = web_sys::window() {
                if let Err(e) = w.location().set_href(path) {
                    log::warn!("navigation to {path} failed: {e:?}");
                }
            }
        }
        #[cfg(not(feature = "hydrate"))]
        {
            log::debug!("hard navigation to {path} skipped outside the browser");
        }
    }
}
