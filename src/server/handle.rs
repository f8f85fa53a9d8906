//! Lifetime-tracked handles.
//!
//! A [`Tracked<N>`] is a cheap, clonable reference to a native object. All
//! handles to the same native object share one [`DataBlock`], which is
//! found again through the `wl_listener` it keeps on the object's destroy
//! signal (`wl_*_get_destroy_listener`), so no global registry is needed. The block records whether the
//! native object is still alive and carries the user data and destroy
//! closure shared by every copy.

use std::cell::{Cell, RefCell, RefMut};
use std::ffi::c_void;
use std::fmt;
use std::ptr;
use std::rc::Rc;

use super::error::{Error, Result};
use super::listener::{ListenerBridge, Slot};
use super::user_data::UserData;
use crate::sys::{wl_listener, NotifyFn};

/// Who ends the life of the native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The last handle destroys the native object when dropped.
    Owned,
    /// The native side destroys the object; handles only observe it.
    Adopted,
}

/// A native object kind that handles can wrap.
pub trait NativeObject: Sized + 'static {
    /// Per-kind state stored in the shared data block.
    type Extra: Default + 'static;

    const KIND: &'static str;

    /// Destroy notification used to find and invalidate data blocks. Must
    /// be a distinct, non-generic function per kind.
    const NOTIFY: NotifyFn;

    /// # Safety
    /// `native` must be live and `listener` unlinked.
    unsafe fn add_destroy_listener(native: *mut Self, listener: *mut wl_listener);

    /// # Safety
    /// `native` must be live.
    unsafe fn get_destroy_listener(native: *mut Self, notify: NotifyFn) -> *mut wl_listener;

    /// # Safety
    /// `native` must be live.
    unsafe fn destroy(native: *mut Self);

    /// Runs once, right after a new data block has been attached.
    ///
    /// # Safety
    /// The block's native pointer is live.
    unsafe fn attached(_block: &DataBlock<Self>) {}

    /// Runs once the native object announced its destruction, before the
    /// native pointer is cleared.
    fn detached(_block: &DataBlock<Self>) {}
}

pub struct DataBlock<N: NativeObject> {
    native: Cell<*mut N>,
    ownership: Ownership,
    destroyed: Cell<bool>,
    native_share: Cell<bool>,
    user_data: RefCell<UserData>,
    on_destroy: Slot<dyn FnMut()>,
    destroy_listener: ListenerBridge,
    pub(crate) extra: N::Extra,
}

impl<N: NativeObject> DataBlock<N> {
    fn new(native: *mut N, ownership: Ownership) -> Self {
        Self {
            native: Cell::new(native),
            ownership,
            destroyed: Cell::new(false),
            native_share: Cell::new(false),
            user_data: RefCell::new(UserData::default()),
            on_destroy: Slot::default(),
            destroy_listener: ListenerBridge::new(N::NOTIFY),
            extra: N::Extra::default(),
        }
    }

    pub fn native(&self) -> *mut N {
        self.native.get()
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// Invalidate the block after the native object announced its
    /// destruction. The destroy closure runs first, while the native
    /// pointer is still readable.
    fn native_destroyed(&self) {
        if self.destroyed.get() {
            return;
        }
        if let Some(mut on_destroy) = self.on_destroy.take() {
            on_destroy();
        }
        N::detached(self);
        self.native.set(ptr::null_mut());
        self.destroy_listener.remove();
        self.destroyed.set(true);
        if self.native_share.replace(false) {
            unsafe { Rc::decrement_strong_count(self as *const Self) };
        }
    }

    /// Mark the block destroyed when the native object went away without a
    /// destroy notification, e.g. globals freed by `wl_display_destroy`.
    pub(crate) fn invalidate(&self) {
        self.native_destroyed();
    }

    pub(crate) fn destroy_listener_ptr(&self) -> *mut wl_listener {
        self.destroy_listener.as_ptr()
    }
}

/// Destroy notification shared by every kind; wrapped by each kind's
/// [`NativeObject::NOTIFY`].
///
/// # Safety
/// `listener` must be the destroy listener of a live `DataBlock<N>`.
pub unsafe fn notify_destroyed<N: NativeObject>(listener: *mut wl_listener, _data: *mut c_void) {
    let block = ListenerBridge::from_listener(listener).user() as *const DataBlock<N>;
    Rc::increment_strong_count(block);
    let block = Rc::from_raw(block);
    block.native_destroyed();
}

pub struct Tracked<N: NativeObject> {
    block: Option<Rc<DataBlock<N>>>,
}

impl<N: NativeObject> Tracked<N> {
    pub fn null() -> Self {
        Self { block: None }
    }

    /// Wrap `native`, sharing the data block of any existing handle to it.
    ///
    /// # Safety
    /// `native` must be null or live.
    pub unsafe fn wrap(native: *mut N, ownership: Ownership) -> Self {
        if native.is_null() {
            return Self::null();
        }
        match Self::existing(native) {
            Some(existing) => existing,
            None => Self::attach(native, ownership),
        }
    }

    /// Look up the data block of an already wrapped object.
    ///
    /// # Safety
    /// `native` must be null or live.
    pub unsafe fn existing(native: *mut N) -> Option<Self> {
        if native.is_null() {
            return None;
        }
        let listener = N::get_destroy_listener(native, N::NOTIFY);
        if listener.is_null() {
            return None;
        }
        let block = ListenerBridge::from_listener(listener).user() as *const DataBlock<N>;
        if block.is_null() {
            return None;
        }
        Some(Self::from_block_ptr(block))
    }

    /// # Safety
    /// `block` must point at a live data block.
    pub unsafe fn from_block_ptr(block: *const DataBlock<N>) -> Self {
        Rc::increment_strong_count(block);
        Self {
            block: Some(Rc::from_raw(block)),
        }
    }

    unsafe fn attach(native: *mut N, ownership: Ownership) -> Self {
        let block = Rc::new(DataBlock::new(native, ownership));
        block.destroy_listener.set_user(Rc::as_ptr(&block) as *mut c_void);
        Self::link(block)
    }

    /// Create the native object after its data block, for natives that take
    /// the block as their user data. `create` returns null on failure.
    ///
    /// # Safety
    /// `create` must return null or a live native object.
    pub(crate) unsafe fn create_with(
        ownership: Ownership,
        create: impl FnOnce(&Rc<DataBlock<N>>) -> *mut N,
    ) -> Result<Self> {
        let block = Rc::new(DataBlock::new(ptr::null_mut(), ownership));
        block.destroy_listener.set_user(Rc::as_ptr(&block) as *mut c_void);
        let native = create(&block);
        if native.is_null() {
            return Err(Error::NativeCreateFailed(N::KIND));
        }
        block.native.set(native);
        Ok(Self::link(block))
    }

    unsafe fn link(block: Rc<DataBlock<N>>) -> Self {
        N::add_destroy_listener(block.native.get(), block.destroy_listener.as_ptr());
        if block.ownership == Ownership::Adopted {
            let _ = Rc::into_raw(Rc::clone(&block));
            block.native_share.set(true);
        }
        N::attached(&block);
        Self { block: Some(block) }
    }

    pub fn block(&self) -> Option<&Rc<DataBlock<N>>> {
        self.block.as_ref()
    }

    pub(crate) fn live_block(&self) -> Result<&Rc<DataBlock<N>>> {
        match &self.block {
            Some(block) if !block.native.get().is_null() => Ok(block),
            _ => Err(Error::NullHandle(N::KIND)),
        }
    }

    /// The native pointer, or `NullHandle` once the object is gone.
    pub fn native(&self) -> Result<*mut N> {
        self.live_block().map(|block| block.native.get())
    }

    /// The native pointer, null once the object is gone.
    pub fn as_ptr(&self) -> *mut N {
        self.block.as_ref().map_or(ptr::null_mut(), |block| block.native.get())
    }

    pub fn is_null(&self) -> bool {
        self.as_ptr().is_null()
    }

    pub fn is_destroyed(&self) -> bool {
        self.block.as_ref().map_or(false, |block| block.destroyed.get())
    }

    /// Number of handles sharing this data block.
    pub fn ref_count(&self) -> usize {
        self.block.as_ref().map_or(0, |block| {
            Rc::strong_count(block) - usize::from(block.native_share.get())
        })
    }

    /// Ask the native side to destroy the object. Every handle observes the
    /// destruction through the shared block.
    pub fn destroy(&self) -> Result<()> {
        let native = self.native()?;
        unsafe { N::destroy(native) };
        Ok(())
    }

    /// Run `f` once when the native object is destroyed. Replaces any
    /// previous closure.
    pub fn on_destroy(&self, f: impl FnMut() + 'static) -> Result<()> {
        self.live_block()?.on_destroy.set(Box::new(f));
        Ok(())
    }

    pub fn user_data(&self) -> Result<RefMut<'_, UserData>> {
        match &self.block {
            Some(block) => Ok(block.user_data.borrow_mut()),
            None => Err(Error::NullHandle(N::KIND)),
        }
    }

    pub(crate) fn extra(&self) -> Result<&N::Extra> {
        self.live_block().map(|block| &block.extra)
    }
}

impl<N: NativeObject> Clone for Tracked<N> {
    fn clone(&self) -> Self {
        Self {
            block: self.block.clone(),
        }
    }
}

impl<N: NativeObject> Default for Tracked<N> {
    fn default() -> Self {
        Self::null()
    }
}

impl<N: NativeObject> Drop for Tracked<N> {
    fn drop(&mut self) {
        let Some(block) = self.block.take() else {
            return;
        };
        let native = block.native.get();
        if block.ownership == Ownership::Owned && Rc::strong_count(&block) == 1 && !native.is_null() {
            unsafe { N::destroy(native) };
        }
    }
}

impl<N: NativeObject> PartialEq for Tracked<N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_ptr() == other.as_ptr()
    }
}

impl<N: NativeObject> Eq for Tracked<N> {}

impl<N: NativeObject> fmt::Debug for Tracked<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("kind", &N::KIND)
            .field("native", &self.as_ptr())
            .field("refs", &self.ref_count())
            .finish()
    }
}
