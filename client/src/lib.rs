//! Browser half of Orbit's session handling.
//!
//! ARCHITECTURE
//! ============
//! `state::session::SessionStore` keeps the page's view of the signed-in user
//! in step with the identity provider. `app` wires it into Leptos context and
//! installs the route guard from `util::auth`. Browser APIs (cookies,
//! `localStorage`, `window.location`) sit behind small seams in `util` and
//! are only live under the `hydrate` feature.

pub mod app;
pub mod state;
pub mod util;

/// Install the panic hook and route `log` output to the browser console.
#[cfg(feature = "hydrate")]
#[wasm_bindgen::prelude::wasm_bindgen]
pub fn init_browser() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Debug);
}
