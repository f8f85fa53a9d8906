//! Resource handles.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::ffi::{c_void, CStr, CString};
use std::ops::Deref;
use std::ptr;
use std::rc::Rc;

use log::trace;

use super::argument::{encode_arguments, Argument};
use super::client::Client;
use super::dispatch::{c_dispatcher, dispatch_fn_ptr, fallback_dispatcher, DispatchFn};
use super::error::{Error, Result};
use super::handle::{notify_destroyed, NativeObject, Ownership, Tracked};
use crate::protocol::interfaces::find_interface;
use crate::sys::*;

#[derive(Default)]
pub struct ResourceExtra {
    events: RefCell<Option<Rc<dyn Any>>>,
    interface: Cell<Option<Interface>>,
}

unsafe extern "C" fn notify_resource(listener: *mut wl_listener, data: *mut c_void) {
    notify_destroyed::<wl_resource>(listener, data)
}

impl NativeObject for wl_resource {
    type Extra = ResourceExtra;
    const KIND: &'static str = "resource";
    const NOTIFY: NotifyFn = notify_resource;

    unsafe fn add_destroy_listener(native: *mut Self, listener: *mut wl_listener) {
        wl_resource_add_destroy_listener(native, listener)
    }

    unsafe fn get_destroy_listener(native: *mut Self, notify: NotifyFn) -> *mut wl_listener {
        wl_resource_get_destroy_listener(native, notify)
    }

    unsafe fn destroy(native: *mut Self) {
        wl_resource_destroy(native)
    }
}

/// A protocol object owned by one client.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Resource {
    handle: Tracked<wl_resource>,
}

impl Deref for Resource {
    type Target = Tracked<wl_resource>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Resource {
    pub fn null() -> Self {
        Self::default()
    }

    /// # Safety
    /// `native` must be null or a live resource.
    pub unsafe fn from_raw(native: *mut wl_resource) -> Self {
        Self {
            handle: Tracked::wrap(native, Ownership::Adopted),
        }
    }

    /// Create object `id` (0 for a server-allocated id) on `client`.
    ///
    /// Requests on the new resource are ignored until an events table is
    /// installed with [`Resource::set_events`].
    pub fn create(client: &Client, interface: Interface, version: u32, id: u32) -> Result<Self> {
        let client = client.native()?;
        let version = i32::try_from(version).unwrap_or(i32::MAX);
        let native = unsafe { wl_resource_create(client, interface.as_ptr(), version, id) };
        if native.is_null() {
            return Err(Error::NativeCreateFailed("resource"));
        }
        let resource = unsafe { Self::from_raw(native) };
        let extra = resource.handle.extra()?;
        extra.interface.set(Some(interface));
        // A resource-created listener may already have installed handlers.
        if !resource.has_events() {
            unsafe { wl_resource_set_dispatcher(native, fallback_dispatcher, ptr::null(), ptr::null_mut(), None) };
        }
        Ok(resource)
    }

    /// Attach the events table and route requests to `dispatch`. Only the
    /// first table sticks; returns whether this call installed it.
    pub fn set_events(&self, events: Rc<dyn Any>, dispatch: DispatchFn) -> Result<bool> {
        let native = self.handle.native()?;
        let extra = self.handle.extra()?;
        let mut slot = extra.events.borrow_mut();
        if slot.is_some() {
            return Ok(false);
        }
        *slot = Some(events);
        unsafe {
            wl_resource_set_dispatcher(native, c_dispatcher, dispatch_fn_ptr(dispatch), ptr::null_mut(), None);
        }
        Ok(true)
    }

    pub fn events(&self) -> Option<Rc<dyn Any>> {
        self.handle.extra().ok()?.events.borrow().clone()
    }

    pub fn events_as<T: Any>(&self) -> Option<Rc<T>> {
        self.events()?.downcast::<T>().ok()
    }

    pub fn has_events(&self) -> bool {
        self.handle
            .extra()
            .map_or(false, |extra| extra.events.borrow().is_some())
    }

    fn send(&self, opcode: u32, args: &[Argument], flush: bool) -> Result<()> {
        let native = self.handle.native()?;
        let interface = self.interface()?;
        let message = interface.event(opcode).ok_or(Error::UnknownOpcode {
            class: interface.name(),
            opcode,
        })?;
        let version = self.version()?;
        if message.since() > version {
            trace!(
                "skipping {}.{} for {}@{} v{}",
                interface.name(),
                message.name(),
                interface.name(),
                self.id()?,
                version
            );
            return Ok(());
        }
        let mut encoded = encode_arguments(message, args)?;
        unsafe {
            if flush {
                wl_resource_post_event_array(native, opcode, encoded.slots.as_mut_ptr());
            } else {
                wl_resource_queue_event_array(native, opcode, encoded.slots.as_mut_ptr());
            }
        }
        Ok(())
    }

    /// Send event `opcode`. Events newer than the resource's version are
    /// skipped.
    pub fn post_event(&self, opcode: u32, args: &[Argument]) -> Result<()> {
        self.send(opcode, args, true)
    }

    /// Like [`Resource::post_event`] but never flushes.
    pub fn queue_event(&self, opcode: u32, args: &[Argument]) -> Result<()> {
        self.send(opcode, args, false)
    }

    /// Send a protocol error on this object. libwayland drops the client
    /// once the current dispatch returns.
    pub fn post_error(&self, code: u32, message: &str) -> Result<()> {
        let native = self.handle.native()?;
        let text = CString::new(message.replace('\0', "")).unwrap_or_default();
        unsafe { wl_resource_post_error(native, code, c"%s".as_ptr(), text.as_ptr()) };
        Ok(())
    }

    pub fn post_no_memory(&self) -> Result<()> {
        let native = self.handle.native()?;
        unsafe { wl_resource_post_no_memory(native) };
        Ok(())
    }

    pub fn id(&self) -> Result<u32> {
        Ok(unsafe { wl_resource_get_id(self.handle.native()?) })
    }

    pub fn client(&self) -> Result<Client> {
        let native = self.handle.native()?;
        Ok(unsafe { Client::from_raw(wl_resource_get_client(native)) })
    }

    pub fn version(&self) -> Result<u32> {
        let version = unsafe { wl_resource_get_version(self.handle.native()?) };
        Ok(u32::try_from(version).unwrap_or(0))
    }

    pub fn class(&self) -> Result<&'static str> {
        let class = unsafe { wl_resource_get_class(self.handle.native()?) };
        if class.is_null() {
            return Ok("");
        }
        Ok(unsafe { CStr::from_ptr(class) }.to_str().unwrap_or(""))
    }

    /// The interface the resource was created with. Resources libwayland
    /// created itself are matched by class name.
    pub fn interface(&self) -> Result<Interface> {
        if let Some(interface) = self.handle.extra()?.interface.get() {
            return Ok(interface);
        }
        let class = self.class()?;
        let interface = find_interface(class).ok_or(Error::UnknownInterface(class))?;
        self.handle.extra()?.interface.set(Some(interface));
        Ok(interface)
    }
}
