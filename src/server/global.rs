//! Global handles.

use std::cell::Cell;
use std::ffi::c_void;
use std::ops::Deref;
use std::ptr;
use std::rc::Rc;

use log::{debug, warn};

use super::client::Client;
use super::display::Display;
use super::error::{Error, Result};
use super::handle::{notify_destroyed, DataBlock, NativeObject, Ownership, Tracked};
use super::listener::Slot;
use super::resource::Resource;
use crate::sys::*;

#[derive(Default)]
pub struct GlobalExtra {
    bind: Slot<dyn FnMut(&Client, Resource)>,
    interface: Cell<Option<Interface>>,
    version: Cell<u32>,
}

unsafe extern "C" fn notify_global(listener: *mut wl_listener, data: *mut c_void) {
    notify_destroyed::<wl_global>(listener, data)
}

unsafe extern "C" fn bind_global(client: *mut wl_client, data: *mut c_void, version: u32, id: u32) {
    let global = Global {
        handle: Tracked::from_block_ptr(data as *const DataBlock<wl_global>),
    };
    let Ok(interface) = global.interface() else {
        return;
    };
    let client = Client::from_raw(client);
    let resource = match Resource::create(&client, interface, version, id) {
        Ok(resource) => resource,
        Err(err) => {
            warn!("⚠️ Failed to bind {}: {}", interface.name(), err);
            let _ = client.post_no_memory();
            return;
        }
    };
    let handled = global
        .extra()
        .ok()
        .and_then(|extra| extra.bind.with(|f| f(&client, resource)));
    if handled.is_none() {
        debug!("{} bound without a bind handler", interface.name());
    }
}

// libwayland has no destroy signal for globals. The data block is the
// global's user data and its listener is notified by hand.
impl NativeObject for wl_global {
    type Extra = GlobalExtra;
    const KIND: &'static str = "global";
    const NOTIFY: NotifyFn = notify_global;

    unsafe fn add_destroy_listener(_native: *mut Self, _listener: *mut wl_listener) {}

    unsafe fn get_destroy_listener(native: *mut Self, _notify: NotifyFn) -> *mut wl_listener {
        let block = wl_global_get_user_data(native) as *const DataBlock<wl_global>;
        if block.is_null() {
            return ptr::null_mut();
        }
        (*block).destroy_listener_ptr()
    }

    /// Withdraws the global (`global_remove` goes out first), then
    /// invalidates its handles.
    unsafe fn destroy(native: *mut Self) {
        let listener = Self::get_destroy_listener(native, Self::NOTIFY);
        wl_global_destroy(native);
        if !listener.is_null() {
            notify_global(listener, native as *mut c_void);
        }
    }
}

/// An advertised factory object. The global is withdrawn when its last
/// handle is dropped.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Global {
    handle: Tracked<wl_global>,
}

impl Deref for Global {
    type Target = Tracked<wl_global>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Global {
    /// Register and advertise `interface` at `version`.
    pub fn new(display: &Display, interface: Interface, version: u32) -> Result<Self> {
        let display_native = display.native()?;
        let native_version = i32::try_from(version).unwrap_or(i32::MAX);
        let handle = unsafe {
            Tracked::create_with(Ownership::Owned, |block: &Rc<DataBlock<wl_global>>| {
                block.extra.interface.set(Some(interface));
                block.extra.version.set(version);
                if display.track_global(block).is_err() {
                    return ptr::null_mut();
                }
                wl_global_create(
                    display_native,
                    interface.as_ptr(),
                    native_version,
                    Rc::as_ptr(block) as *mut c_void,
                    bind_global,
                )
            })?
        };
        debug!("advertising {} v{}", interface.name(), version);
        Ok(Self { handle })
    }

    /// # Safety
    /// `native` must be null or a live global created by [`Global::new`].
    pub unsafe fn from_raw(native: *mut wl_global) -> Self {
        Self {
            handle: Tracked::existing(native).unwrap_or_default(),
        }
    }

    pub(crate) fn from_block(block: Rc<DataBlock<wl_global>>) -> Self {
        Self {
            handle: unsafe { Tracked::from_block_ptr(Rc::as_ptr(&block)) },
        }
    }

    /// Per-global state, readable from the filter while `wl_global_create`
    /// is still running.
    fn extra(&self) -> Result<&GlobalExtra> {
        match self.handle.block() {
            Some(block) if !block.is_destroyed() => Ok(&block.extra),
            _ => Err(Error::NullHandle("global")),
        }
    }

    /// Run `f` with the new resource whenever a client binds the global.
    pub fn on_bind(&self, f: impl FnMut(&Client, Resource) + 'static) -> Result<()> {
        self.extra()?.bind.set(Box::new(f));
        Ok(())
    }

    pub fn interface(&self) -> Result<Interface> {
        self.extra()?.interface.get().ok_or(Error::NullHandle("global"))
    }

    pub fn version(&self) -> Result<u32> {
        Ok(self.extra()?.version.get())
    }

    pub fn has_interface(&self, interface: Interface) -> bool {
        self.interface().map_or(false, |own| own.same_as(interface))
    }
}
