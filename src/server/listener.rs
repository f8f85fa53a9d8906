//! Glue between `wl_listener`s and Rust closures.

use std::cell::{Cell, RefCell, UnsafeCell};
use std::ffi::c_void;
use std::ptr;

use crate::sys::{wl_list, wl_listener, NotifyFn};

/// A `wl_listener` followed by a user pointer, so a notification can find
/// its way back to the record that registered it.
#[repr(C)]
pub struct ListenerBridge {
    listener: UnsafeCell<wl_listener>,
    user: Cell<*mut c_void>,
}

impl ListenerBridge {
    pub fn new(notify: NotifyFn) -> Self {
        Self {
            listener: UnsafeCell::new(wl_listener {
                link: wl_list {
                    prev: ptr::null_mut(),
                    next: ptr::null_mut(),
                },
                notify,
            }),
            user: Cell::new(ptr::null_mut()),
        }
    }

    /// Pointer handed to libwayland. The bridge must not move while linked.
    pub fn as_ptr(&self) -> *mut wl_listener {
        self.listener.get()
    }

    /// # Safety
    /// `listener` must point at the `listener` field of a live bridge.
    pub unsafe fn from_listener<'a>(listener: *mut wl_listener) -> &'a ListenerBridge {
        &*(listener as *const ListenerBridge)
    }

    pub fn user(&self) -> *mut c_void {
        self.user.get()
    }

    pub fn set_user(&self, user: *mut c_void) {
        self.user.set(user);
    }

    pub fn is_linked(&self) -> bool {
        unsafe { !(*self.listener.get()).link.next.is_null() }
    }

    /// Unlinks the listener from whatever signal holds it.
    ///
    /// The signal's list head must still be alive.
    pub fn remove(&self) {
        unsafe {
            let link = &mut (*self.listener.get()).link;
            if !link.prev.is_null() && !link.next.is_null() {
                (*link.prev).next = link.next;
                (*link.next).prev = link.prev;
            }
            link.prev = ptr::null_mut();
            link.next = ptr::null_mut();
        }
    }
}

/// Holds at most one closure. While the closure runs it is taken out of the
/// slot, so re-entrant calls see an empty slot and a replacement installed
/// from inside the closure wins over the one being run.
pub struct Slot<F: ?Sized>(RefCell<Option<Box<F>>>);

impl<F: ?Sized> Default for Slot<F> {
    fn default() -> Self {
        Self(RefCell::new(None))
    }
}

impl<F: ?Sized> Slot<F> {
    pub fn set(&self, f: Box<F>) {
        *self.0.borrow_mut() = Some(f);
    }

    pub fn take(&self) -> Option<Box<F>> {
        self.0.borrow_mut().take()
    }

    pub fn restore(&self, f: Box<F>) {
        let mut slot = self.0.borrow_mut();
        if slot.is_none() {
            *slot = Some(f);
        }
    }

    pub fn is_set(&self) -> bool {
        self.0.borrow().is_some()
    }

    pub fn with<R>(&self, call: impl FnOnce(&mut F) -> R) -> Option<R> {
        let mut f = self.take()?;
        let result = call(&mut *f);
        self.restore(f);
        Some(result)
    }
}
