//! Display handles: the top-level server session.

use std::cell::{Cell, RefCell};
use std::ffi::{c_void, CStr, CString};
use std::io;
use std::ops::Deref;
use std::os::unix::io::{AsRawFd, IntoRawFd, OwnedFd};
use std::rc::{Rc, Weak};

use log::{debug, info};

use super::client::Client;
use super::error::{Error, Result};
use super::event_loop::EventLoop;
use super::global::Global;
use super::handle::{notify_destroyed, DataBlock, NativeObject, Ownership, Tracked};
use super::listener::{ListenerBridge, Slot};
use crate::sys::*;

pub struct DisplayExtra {
    client_created: Slot<dyn FnMut(Client)>,
    client_created_listener: ListenerBridge,
    global_filter: Slot<dyn FnMut(&Client, &Global) -> bool>,
    filter_installed: Cell<bool>,
    sockets: RefCell<Vec<String>>,
    globals: RefCell<Vec<Weak<DataBlock<wl_global>>>>,
}

impl Default for DisplayExtra {
    fn default() -> Self {
        Self {
            client_created: Slot::default(),
            client_created_listener: ListenerBridge::new(notify_client_created),
            global_filter: Slot::default(),
            filter_installed: Cell::new(false),
            sockets: RefCell::new(Vec::new()),
            globals: RefCell::new(Vec::new()),
        }
    }
}

impl DisplayExtra {
    /// Globals created through this display that are still alive, oldest
    /// first.
    fn live_globals(&self) -> Vec<Rc<DataBlock<wl_global>>> {
        self.globals
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|block| !block.is_destroyed())
            .collect()
    }
}

unsafe extern "C" fn notify_display(listener: *mut wl_listener, data: *mut c_void) {
    notify_destroyed::<wl_display>(listener, data)
}

unsafe extern "C" fn notify_client_created(listener: *mut wl_listener, data: *mut c_void) {
    let block = ListenerBridge::from_listener(listener).user() as *const DataBlock<wl_display>;
    let display = Display {
        handle: Tracked::from_block_ptr(block),
    };
    let client = Client::from_raw(data as *mut wl_client);
    if let Ok(extra) = display.handle.extra() {
        extra.client_created.with(|f| f(client));
    }
}

unsafe extern "C" fn filter_global(client: *const wl_client, global: *const wl_global, data: *mut c_void) -> bool {
    let display = Display {
        handle: Tracked::from_block_ptr(data as *const DataBlock<wl_display>),
    };
    let Ok(extra) = display.handle.extra() else {
        return true;
    };
    // Matched by user data so a global still inside wl_global_create is found.
    let user_data = wl_global_get_user_data(global);
    let Some(block) = extra
        .live_globals()
        .into_iter()
        .find(|block| Rc::as_ptr(block) as *mut c_void == user_data)
    else {
        return true;
    };
    let global = Global::from_block(block);
    let client = Client::from_raw(client as *mut wl_client);
    extra.global_filter.with(|f| f(&client, &global)).unwrap_or(true)
}

impl NativeObject for wl_display {
    type Extra = DisplayExtra;
    const KIND: &'static str = "display";
    const NOTIFY: NotifyFn = notify_display;

    unsafe fn add_destroy_listener(native: *mut Self, listener: *mut wl_listener) {
        wl_display_add_destroy_listener(native, listener)
    }

    unsafe fn get_destroy_listener(native: *mut Self, notify: NotifyFn) -> *mut wl_listener {
        wl_display_get_destroy_listener(native, notify)
    }

    /// `wl_display_destroy` leaves clients connected, so they go first.
    unsafe fn destroy(native: *mut Self) {
        wl_display_destroy_clients(native);
        wl_display_destroy(native)
    }

    unsafe fn attached(block: &DataBlock<Self>) {
        let bridge = &block.extra.client_created_listener;
        bridge.set_user(block as *const DataBlock<Self> as *mut c_void);
        wl_display_add_client_created_listener(block.native(), bridge.as_ptr());
    }

    /// libwayland frees the remaining globals without notice.
    fn detached(block: &DataBlock<Self>) {
        block.extra.client_created_listener.remove();
        for global in block.extra.live_globals() {
            global.invalidate();
        }
        block.extra.globals.borrow_mut().clear();
        block.extra.sockets.borrow_mut().clear();
    }
}

/// The server session. The last handle returned by [`Display::new`]
/// destroys the display, its clients, globals and event loop.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Display {
    handle: Tracked<wl_display>,
}

impl Deref for Display {
    type Target = Tracked<wl_display>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Display {
    pub fn new() -> Result<Self> {
        let native = unsafe { wl_display_create() };
        if native.is_null() {
            return Err(Error::NativeCreateFailed("display"));
        }
        Ok(Self {
            handle: unsafe { Tracked::wrap(native, Ownership::Owned) },
        })
    }

    /// Handle to an existing display. Displays not created through
    /// [`Display::new`] are observed, not owned.
    ///
    /// # Safety
    /// `native` must be null or a live display.
    pub unsafe fn from_raw(native: *mut wl_display) -> Self {
        Self {
            handle: Tracked::wrap(native, Ownership::Adopted),
        }
    }

    /// The display's event loop. Dropping the returned handle never
    /// destroys the loop.
    pub fn event_loop(&self) -> Result<EventLoop> {
        let native = self.handle.native()?;
        Ok(unsafe { EventLoop::from_raw(wl_display_get_event_loop(native)) })
    }

    fn record_socket(&self, name: String) -> Result<String> {
        debug!("listening on {}", name);
        self.handle.extra()?.sockets.borrow_mut().push(name.clone());
        Ok(name)
    }

    /// Listen on `name` inside `XDG_RUNTIME_DIR`.
    pub fn add_socket(&self, name: &str) -> Result<String> {
        let native = self.handle.native()?;
        let c_name = CString::new(name).map_err(|err| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, err)))?;
        if unsafe { wl_display_add_socket(native, c_name.as_ptr()) } != 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        self.record_socket(name.to_string())
    }

    /// Listen on the first free `wayland-N`.
    pub fn add_socket_auto(&self) -> Result<String> {
        let native = self.handle.native()?;
        let name = unsafe { wl_display_add_socket_auto(native) };
        if name.is_null() {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        let name = unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned();
        self.record_socket(name)
    }

    /// Accept clients on an already listening socket. The display owns the
    /// descriptor once this succeeds.
    pub fn add_socket_fd(&self, fd: OwnedFd) -> Result<()> {
        let native = self.handle.native()?;
        if unsafe { wl_display_add_socket_fd(native, fd.as_raw_fd()) } != 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a usable socket",
            )));
        }
        let _ = fd.into_raw_fd();
        Ok(())
    }

    pub fn socket_names(&self) -> Result<Vec<String>> {
        Ok(self.handle.extra()?.sockets.borrow().clone())
    }

    /// Dispatch and flush until [`Display::terminate`].
    pub fn run(&self) -> Result<()> {
        let native = self.handle.native()?;
        info!("🚀 Display running");
        unsafe { wl_display_run(native) };
        Ok(())
    }

    pub fn terminate(&self) -> Result<()> {
        unsafe { wl_display_terminate(self.handle.native()?) };
        Ok(())
    }

    pub fn flush_clients(&self) -> Result<()> {
        unsafe { wl_display_flush_clients(self.handle.native()?) };
        Ok(())
    }

    pub fn serial(&self) -> Result<u32> {
        Ok(unsafe { wl_display_get_serial(self.handle.native()?) })
    }

    pub fn next_serial(&self) -> Result<u32> {
        Ok(unsafe { wl_display_next_serial(self.handle.native()?) })
    }

    /// Run `f` for every client that connects from now on.
    pub fn on_client_created(&self, f: impl FnMut(Client) + 'static) -> Result<()> {
        self.handle.extra()?.client_created.set(Box::new(f));
        Ok(())
    }

    /// Connected clients, oldest first.
    pub fn client_list(&self) -> Result<Vec<Client>> {
        let native = self.handle.native()?;
        let mut clients = Vec::new();
        unsafe {
            let head = wl_display_get_client_list(native);
            let mut link = (*head).next;
            while link != head {
                let next = (*link).next;
                clients.push(Client::from_raw(wl_client_from_link(link)));
                link = next;
            }
        }
        Ok(clients)
    }

    /// Globals created on this display that are still advertised.
    pub fn global_list(&self) -> Result<Vec<Global>> {
        Ok(self
            .handle
            .extra()?
            .live_globals()
            .into_iter()
            .map(Global::from_block)
            .collect())
    }

    pub(crate) fn track_global(&self, block: &Rc<DataBlock<wl_global>>) -> Result<()> {
        let mut globals = self.handle.extra()?.globals.borrow_mut();
        globals.retain(|weak| weak.strong_count() > 0);
        globals.push(Rc::downgrade(block));
        Ok(())
    }

    /// Decide per client and global whether the global is advertised and
    /// may be bound.
    pub fn set_global_filter(&self, f: impl FnMut(&Client, &Global) -> bool + 'static) -> Result<()> {
        let native = self.handle.native()?;
        let block = self.handle.live_block()?;
        block.extra.global_filter.set(Box::new(f));
        if !block.extra.filter_installed.replace(true) {
            let data = Rc::as_ptr(block) as *mut c_void;
            unsafe { wl_display_set_global_filter(native, filter_global, data) };
        }
        Ok(())
    }

    /// Advertise every global to every client again.
    pub fn clear_global_filter(&self) -> Result<()> {
        self.handle.extra()?.global_filter.take();
        Ok(())
    }

    pub fn destroy_clients(&self) -> Result<()> {
        unsafe { wl_display_destroy_clients(self.handle.native()?) };
        Ok(())
    }
}
