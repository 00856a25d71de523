//! Location source trait interfaces for rollcall
//!
//! This crate defines the boundary between the acquisition engine and the
//! platform's asynchronous location API. It contains no platform code itself,
//! only the contract, the watch subscription handle, the once-per-session
//! permission latch and a scriptable mock for tests.

mod handle;
mod mock;
mod permission;
mod traits;

pub use handle::*;
pub use mock::*;
pub use permission::*;
pub use traits::*;
