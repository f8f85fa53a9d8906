//! Native layer: libwayland-server.
//!
//! The library API comes from `wayland-sys`. The handful of entry points it
//! does not declare live in the extern block below, and [`interface`] gives
//! typed views of the `wl_interface`/`wl_message` tables libwayland
//! dispatches with. The safe object model lives in [`crate::server`].

use std::ffi::c_void;
use std::os::raw::c_int;

pub mod interface;

pub use interface::{ArgSpec, Interface, Message};
pub use wayland_sys::common::*;
pub use wayland_sys::server::*;

/// Notification callback stored in a `wl_listener`.
pub type NotifyFn = unsafe extern "C" fn(*mut wl_listener, *mut c_void);

/// Request dispatcher stored on a resource.
pub type DispatcherFn = unsafe extern "C" fn(
    *const c_void,
    *mut c_void,
    u32,
    *const wl_message,
    *const wl_argument,
) -> c_int;

/// Per-client global visibility filter.
pub type GlobalFilterFn = unsafe extern "C" fn(*const wl_client, *const wl_global, *mut c_void) -> bool;

/// Called when a client binds a global.
pub type GlobalBindFn = unsafe extern "C" fn(*mut wl_client, *mut c_void, u32, u32);

pub type FdFn = unsafe extern "C" fn(c_int, u32, *mut c_void) -> c_int;
pub type TimerFn = unsafe extern "C" fn(*mut c_void) -> c_int;
pub type SignalFn = unsafe extern "C" fn(c_int, *mut c_void) -> c_int;
pub type IdleFn = unsafe extern "C" fn(*mut c_void);

/// Callback of `wl_client_for_each_resource`.
pub type ResourceIterator = unsafe extern "C" fn(*mut wl_resource, *mut c_void) -> c_int;

/// `WL_ITERATOR_CONTINUE`
pub const ITERATOR_CONTINUE: c_int = 1;

/// `WL_EVENT_*` readiness bits.
pub const EVENT_READABLE: u32 = 0x01;
pub const EVENT_WRITABLE: u32 = 0x02;
pub const EVENT_HANGUP: u32 = 0x04;
pub const EVENT_ERROR: u32 = 0x08;

// Declared here rather than taken from the glob so the signatures match the
// way this crate calls them.
extern "C" {
    pub fn wl_client_get_fd(client: *mut wl_client) -> c_int;
    pub fn wl_client_from_link(link: *mut wl_list) -> *mut wl_client;
    pub fn wl_display_get_client_list(display: *mut wl_display) -> *mut wl_list;
    pub fn wl_display_add_client_created_listener(
        display: *mut wl_display,
        listener: *mut wl_listener,
    );
    pub fn wl_client_add_resource_created_listener(
        client: *mut wl_client,
        listener: *mut wl_listener,
    );
    pub fn wl_client_for_each_resource(
        client: *mut wl_client,
        iterator: ResourceIterator,
        user_data: *mut c_void,
    );
    pub fn wl_event_loop_add_fd(
        event_loop: *mut wl_event_loop,
        fd: c_int,
        mask: u32,
        func: FdFn,
        data: *mut c_void,
    ) -> *mut wl_event_source;
    pub fn wl_event_loop_add_timer(
        event_loop: *mut wl_event_loop,
        func: TimerFn,
        data: *mut c_void,
    ) -> *mut wl_event_source;
    pub fn wl_event_loop_add_signal(
        event_loop: *mut wl_event_loop,
        signal_number: c_int,
        func: SignalFn,
        data: *mut c_void,
    ) -> *mut wl_event_source;
    pub fn wl_event_loop_add_idle(
        event_loop: *mut wl_event_loop,
        func: IdleFn,
        data: *mut c_void,
    ) -> *mut wl_event_source;
    pub fn wl_display_add_socket_fd(display: *mut wl_display, sock_fd: c_int) -> c_int;
    pub fn wl_display_destroy_clients(display: *mut wl_display);
    pub fn wl_display_set_global_filter(
        display: *mut wl_display,
        filter: GlobalFilterFn,
        data: *mut c_void,
    );
    pub fn wl_global_create(
        display: *mut wl_display,
        interface: *const wl_interface,
        version: c_int,
        data: *mut c_void,
        bind: GlobalBindFn,
    ) -> *mut wl_global;
    pub fn wl_global_get_user_data(global: *const wl_global) -> *mut c_void;
    pub fn wl_resource_set_dispatcher(
        resource: *mut wl_resource,
        dispatcher: DispatcherFn,
        implementation: *const c_void,
        data: *mut c_void,
        destroy: Option<unsafe extern "C" fn(*mut wl_resource)>,
    );
}
