//! Server-side token lifecycle, cookie handling, and navigation guards.

pub mod cache;
pub mod callbacks;
pub mod cookies;
pub mod error;
pub mod guard;
pub mod reconcile;
pub mod redirect;
pub mod refresh;
pub mod token;
