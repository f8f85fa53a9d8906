//! Safe object model over libwayland-server.
//!
//! Every handle type ([`Resource`], [`Client`], [`Display`], [`Global`],
//! [`EventLoop`]) is a [`handle::Tracked`] wrapper: clones share one data
//! block per native object, and the block learns about native-side
//! destruction through a `wl_listener` on the object's destroy signal.

pub mod argument;
pub mod client;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod event_loop;
pub mod global;
pub mod handle;
pub mod listener;
pub mod resource;
pub mod user_data;

pub use argument::{Argument, Array, Fd, FromArgument};
pub use client::{Client, Credentials};
pub use dispatch::DispatchFn;
pub use display::Display;
pub use error::{Error, Result};
pub use event_loop::{EventLoop, EventSource, EVENT_ERROR, EVENT_HANGUP, EVENT_READABLE, EVENT_WRITABLE};
pub use global::Global;
pub use handle::{Ownership, Tracked};
pub use resource::Resource;
pub use user_data::UserData;
