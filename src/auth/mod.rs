//! Stateless JWT authentication.
//!
//! Dual-token system: short-lived access tokens (15 min, stateless) verified
//! on every request, and long-lived refresh tokens (7 days, one per user,
//! database-tracked) used to mint new access tokens without re-authentication.

mod cookie;
mod gate;
mod identity;

pub use cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, auth_cookie, clear_cookie, get_cookie};
pub use gate::{PUBLIC_AUTH_PATHS, authentication_gate};
pub use identity::Identity;
