//! Persistence services behind the `identity` seams.
//!
//! ARCHITECTURE
//! ============
//! Route handlers only see `dyn ProfileStore`; the Postgres implementation
//! lives here so handlers stay focused on cookies, redirects and status codes.

pub mod profile;
