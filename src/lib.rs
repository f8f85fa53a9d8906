//! # wlserver
//!
//! Safe object model over libwayland-server.
//!
//! ## Architecture
//!
//! - `sys`: libwayland-server as declared by `wayland-sys`, the few entry
//!   points it lacks, and typed views of interface and message tables.
//! - `server`: safe, reference-counted handles over the native objects,
//!   the argument model and the generic request dispatcher.
//! - `protocol`: interface tables for the core protocol and typed objects
//!   generated by `protocol_object!`.
//! - `config`: settings of the demo server.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use wlserver::protocol::{Compositor, ProtocolObject};
//! use wlserver::server::{Display, Global};
//!
//! fn main() -> anyhow::Result<()> {
//!     let display = Display::new()?;
//!     let socket = display.add_socket_auto()?;
//!     let compositor = Global::new(&display, Compositor::interface(), Compositor::VERSION)?;
//!     compositor.on_bind(|_client, resource| {
//!         if let Ok(compositor) = Compositor::from_resource(resource) {
//!             compositor.on_create_surface(|_, surface| log::info!("new surface {:?}", surface.id()));
//!         }
//!     })?;
//!     println!("listening on {}", socket);
//!     display.run()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod protocol;
pub mod server;
pub mod sys;

pub use config::ServerConfig;
pub use server::{Client, Display, Error, EventLoop, Global, Resource, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
