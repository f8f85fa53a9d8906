//! Client handles.

use std::ffi::c_void;
use std::ops::Deref;
use std::os::raw::c_int;
use std::os::unix::io::{IntoRawFd, RawFd};
use std::os::unix::net::UnixStream;

use super::display::Display;
use super::error::{Error, Result};
use super::handle::{notify_destroyed, DataBlock, NativeObject, Ownership, Tracked};
use super::listener::{ListenerBridge, Slot};
use super::resource::Resource;
use crate::sys::*;

/// Peer credentials captured when the client connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub pid: libc::pid_t,
    pub uid: libc::uid_t,
    pub gid: libc::gid_t,
}

pub struct ClientExtra {
    resource_created: Slot<dyn FnMut(Resource)>,
    resource_created_listener: ListenerBridge,
}

impl Default for ClientExtra {
    fn default() -> Self {
        Self {
            resource_created: Slot::default(),
            resource_created_listener: ListenerBridge::new(notify_resource_created),
        }
    }
}

unsafe extern "C" fn notify_client(listener: *mut wl_listener, data: *mut c_void) {
    notify_destroyed::<wl_client>(listener, data)
}

unsafe extern "C" fn notify_resource_created(listener: *mut wl_listener, data: *mut c_void) {
    let block = ListenerBridge::from_listener(listener).user() as *const DataBlock<wl_client>;
    let client = Client {
        handle: Tracked::from_block_ptr(block),
    };
    let resource = Resource::from_raw(data as *mut wl_resource);
    if let Ok(extra) = client.handle.extra() {
        extra.resource_created.with(|f| f(resource));
    }
}

unsafe extern "C" fn collect_resource(resource: *mut wl_resource, data: *mut c_void) -> c_int {
    let list = &mut *(data as *mut Vec<Resource>);
    list.push(Resource::from_raw(resource));
    ITERATOR_CONTINUE
}

impl NativeObject for wl_client {
    type Extra = ClientExtra;
    const KIND: &'static str = "client";
    const NOTIFY: NotifyFn = notify_client;

    unsafe fn add_destroy_listener(native: *mut Self, listener: *mut wl_listener) {
        wl_client_add_destroy_listener(native, listener)
    }

    unsafe fn get_destroy_listener(native: *mut Self, notify: NotifyFn) -> *mut wl_listener {
        wl_client_get_destroy_listener(native, notify)
    }

    unsafe fn destroy(native: *mut Self) {
        wl_client_destroy(native)
    }

    unsafe fn attached(block: &DataBlock<Self>) {
        let bridge = &block.extra.resource_created_listener;
        bridge.set_user(block as *const DataBlock<Self> as *mut c_void);
        wl_client_add_resource_created_listener(block.native(), bridge.as_ptr());
    }

    fn detached(block: &DataBlock<Self>) {
        block.extra.resource_created_listener.remove();
    }
}

/// A connected peer.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Client {
    handle: Tracked<wl_client>,
}

impl Deref for Client {
    type Target = Tracked<wl_client>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Client {
    pub fn null() -> Self {
        Self::default()
    }

    /// Serve `stream` as a new client of `display`. The client owns the
    /// socket from here on.
    pub fn new(display: &Display, stream: UnixStream) -> Result<Self> {
        let display = display.native()?;
        let native = unsafe { wl_client_create(display, stream.into_raw_fd()) };
        if native.is_null() {
            return Err(Error::NativeCreateFailed("client"));
        }
        Ok(unsafe { Self::from_raw(native) })
    }

    /// # Safety
    /// `native` must be null or a live client.
    pub unsafe fn from_raw(native: *mut wl_client) -> Self {
        Self {
            handle: Tracked::wrap(native, Ownership::Adopted),
        }
    }

    /// Write queued events to the socket.
    pub fn flush(&self) -> Result<()> {
        unsafe { wl_client_flush(self.handle.native()?) };
        Ok(())
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let native = self.handle.native()?;
        let mut credentials = Credentials { pid: 0, uid: 0, gid: 0 };
        unsafe {
            wl_client_get_credentials(
                native,
                &mut credentials.pid,
                &mut credentials.uid,
                &mut credentials.gid,
            )
        };
        Ok(credentials)
    }

    pub fn fd(&self) -> Result<RawFd> {
        Ok(unsafe { wl_client_get_fd(self.handle.native()?) })
    }

    /// The resource with `id`, or a null handle.
    pub fn get_object(&self, id: u32) -> Result<Resource> {
        let native = self.handle.native()?;
        Ok(unsafe { Resource::from_raw(wl_client_get_object(native, id)) })
    }

    pub fn post_no_memory(&self) -> Result<()> {
        unsafe { wl_client_post_no_memory(self.handle.native()?) };
        Ok(())
    }

    /// Run `f` for every resource created for this client from now on.
    pub fn on_resource_created(&self, f: impl FnMut(Resource) + 'static) -> Result<()> {
        self.handle.extra()?.resource_created.set(Box::new(f));
        Ok(())
    }

    pub fn display(&self) -> Result<Display> {
        let native = self.handle.native()?;
        Ok(unsafe { Display::from_raw(wl_client_get_display(native)) })
    }

    /// Every live resource, client-allocated ids first.
    pub fn resource_list(&self) -> Result<Vec<Resource>> {
        let native = self.handle.native()?;
        let mut list: Vec<Resource> = Vec::new();
        unsafe {
            wl_client_for_each_resource(native, collect_resource, &mut list as *mut Vec<Resource> as *mut c_void)
        };
        Ok(list)
    }
}
