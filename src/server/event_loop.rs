//! Event loop handles and closure-backed event sources.

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::fmt;
use std::ops::Deref;
use std::os::raw::c_int;
use std::os::unix::io::RawFd;
use std::ptr;
use std::rc::Rc;

use super::error::{Error, Result};
use super::handle::{notify_destroyed, DataBlock, NativeObject, Ownership, Tracked};
use crate::sys::*;

pub use crate::sys::{EVENT_ERROR, EVENT_HANGUP, EVENT_READABLE, EVENT_WRITABLE};

type FdClosure = dyn FnMut(RawFd, u32) -> i32;
type TimerClosure = dyn FnMut() -> i32;
type SignalClosure = dyn FnMut(i32) -> i32;
type IdleClosure = dyn FnMut();

/// Liveness of one registered source, shared with its [`EventSource`]
/// handles. Null once the source is removed, has fired (idle) or its loop
/// is gone.
#[derive(Default)]
struct SourceState {
    raw: Cell<*mut wl_event_source>,
}

impl SourceState {
    fn take(&self) -> *mut wl_event_source {
        self.raw.replace(ptr::null_mut())
    }
}

struct Registered<F: ?Sized> {
    source: Rc<SourceState>,
    closure: RefCell<Box<F>>,
}

impl<F: ?Sized> Registered<F> {
    /// Re-entrant calls find the closure borrowed and are skipped.
    fn call<R>(&self, run: impl FnOnce(&mut F) -> R) -> Option<R> {
        let mut guard = self.closure.try_borrow_mut().ok()?;
        Some(run(&mut **guard))
    }
}

/// Append-only closure storage. Each closure is boxed separately so the
/// address handed to libwayland stays valid while the store grows.
pub struct ClosureStore<F: ?Sized>(RefCell<Vec<Box<Registered<F>>>>);

impl<F: ?Sized> Default for ClosureStore<F> {
    fn default() -> Self {
        Self(RefCell::new(Vec::new()))
    }
}

impl<F: ?Sized> ClosureStore<F> {
    fn push(&self, f: Box<F>) -> (Rc<SourceState>, *mut c_void) {
        let entry = Box::new(Registered {
            source: Rc::new(SourceState::default()),
            closure: RefCell::new(f),
        });
        let data = &*entry as *const Registered<F> as *mut c_void;
        let source = Rc::clone(&entry.source);
        self.0.borrow_mut().push(entry);
        (source, data)
    }

    /// Remove every source still registered.
    fn remove_all(&self) {
        for entry in self.0.borrow().iter() {
            let raw = entry.source.take();
            if !raw.is_null() {
                unsafe { wl_event_source_remove(raw) };
            }
        }
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct EventLoopExtra {
    fd_closures: ClosureStore<FdClosure>,
    timer_closures: ClosureStore<TimerClosure>,
    signal_closures: ClosureStore<SignalClosure>,
    idle_closures: ClosureStore<IdleClosure>,
}

unsafe extern "C" fn fd_trampoline(fd: c_int, mask: u32, data: *mut c_void) -> c_int {
    let entry = &*(data as *const Registered<FdClosure>);
    entry.call(|f| f(fd, mask)).unwrap_or(0)
}

unsafe extern "C" fn timer_trampoline(data: *mut c_void) -> c_int {
    let entry = &*(data as *const Registered<TimerClosure>);
    entry.call(|f| f()).unwrap_or(0)
}

unsafe extern "C" fn signal_trampoline(signal_number: c_int, data: *mut c_void) -> c_int {
    let entry = &*(data as *const Registered<SignalClosure>);
    entry.call(|f| f(signal_number)).unwrap_or(0)
}

// libwayland removes idle sources right after they fire.
unsafe extern "C" fn idle_trampoline(data: *mut c_void) {
    let entry = &*(data as *const Registered<IdleClosure>);
    entry.source.take();
    entry.call(|f| f());
}

unsafe extern "C" fn notify_event_loop(listener: *mut wl_listener, data: *mut c_void) {
    notify_destroyed::<wl_event_loop>(listener, data)
}

impl NativeObject for wl_event_loop {
    type Extra = EventLoopExtra;
    const KIND: &'static str = "event loop";
    const NOTIFY: NotifyFn = notify_event_loop;

    unsafe fn add_destroy_listener(native: *mut Self, listener: *mut wl_listener) {
        wl_event_loop_add_destroy_listener(native, listener)
    }

    unsafe fn get_destroy_listener(native: *mut Self, notify: NotifyFn) -> *mut wl_listener {
        wl_event_loop_get_destroy_listener(native, notify)
    }

    unsafe fn destroy(native: *mut Self) {
        wl_event_loop_destroy(native)
    }

    /// The loop is still usable while its destroy signal runs, so sources
    /// registered here are removed instead of leaked.
    fn detached(block: &DataBlock<Self>) {
        block.extra.fd_closures.remove_all();
        block.extra.timer_closures.remove_all();
        block.extra.signal_closures.remove_all();
        block.extra.idle_closures.remove_all();
    }
}

#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct EventLoop {
    handle: Tracked<wl_event_loop>,
}

impl Deref for EventLoop {
    type Target = Tracked<wl_event_loop>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl EventLoop {
    /// A standalone loop, destroyed with its last handle.
    pub fn new() -> Result<Self> {
        let native = unsafe { wl_event_loop_create() };
        if native.is_null() {
            return Err(Error::NativeCreateFailed("event loop"));
        }
        Ok(Self {
            handle: unsafe { Tracked::wrap(native, Ownership::Owned) },
        })
    }

    /// # Safety
    /// `native` must be null or a live event loop.
    pub unsafe fn from_raw(native: *mut wl_event_loop) -> Self {
        Self {
            handle: Tracked::wrap(native, Ownership::Adopted),
        }
    }

    fn source(&self, state: Rc<SourceState>, raw: *mut wl_event_source, kind: &'static str) -> Result<EventSource> {
        if raw.is_null() {
            return Err(Error::NativeCreateFailed(kind));
        }
        state.raw.set(raw);
        Ok(EventSource {
            state,
            event_loop: self.clone(),
        })
    }

    /// Watch `fd` for `mask` (`EVENT_READABLE | EVENT_WRITABLE`). The loop
    /// watches a duplicate of `fd`. `f` gets the descriptor and the
    /// observed mask; its return value is ignored.
    pub fn add_fd(&self, fd: RawFd, mask: u32, f: impl FnMut(RawFd, u32) -> i32 + 'static) -> Result<EventSource> {
        let native = self.handle.native()?;
        let (state, data) = self.handle.extra()?.fd_closures.push(Box::new(f));
        let raw = unsafe { wl_event_loop_add_fd(native, fd, mask, fd_trampoline, data) };
        self.source(state, raw, "fd source")
    }

    /// A disarmed timer; arm it with [`EventSource::timer_update`].
    pub fn add_timer(&self, f: impl FnMut() -> i32 + 'static) -> Result<EventSource> {
        let native = self.handle.native()?;
        let (state, data) = self.handle.extra()?.timer_closures.push(Box::new(f));
        let raw = unsafe { wl_event_loop_add_timer(native, timer_trampoline, data) };
        self.source(state, raw, "timer source")
    }

    /// Deliver `signal_number` through the loop. The signal is blocked for
    /// the calling thread.
    pub fn add_signal(&self, signal_number: i32, f: impl FnMut(i32) -> i32 + 'static) -> Result<EventSource> {
        let native = self.handle.native()?;
        let (state, data) = self.handle.extra()?.signal_closures.push(Box::new(f));
        let raw = unsafe { wl_event_loop_add_signal(native, signal_number, signal_trampoline, data) };
        self.source(state, raw, "signal source")
    }

    /// Run `f` once, before the loop next waits.
    pub fn add_idle(&self, f: impl FnMut() + 'static) -> Result<EventSource> {
        let native = self.handle.native()?;
        let (state, data) = self.handle.extra()?.idle_closures.push(Box::new(f));
        let raw = unsafe { wl_event_loop_add_idle(native, idle_trampoline, data) };
        self.source(state, raw, "idle source")
    }

    /// Wait up to `timeout_ms` (`-1` blocks, `0` returns at once) and run
    /// whatever is ready. Returns the native result: 0, or -1 on failure.
    pub fn dispatch(&self, timeout_ms: i32) -> Result<i32> {
        Ok(unsafe { wl_event_loop_dispatch(self.handle.native()?, timeout_ms) })
    }

    pub fn dispatch_idle(&self) -> Result<()> {
        unsafe { wl_event_loop_dispatch_idle(self.handle.native()?) };
        Ok(())
    }

    pub fn fd(&self) -> Result<RawFd> {
        Ok(unsafe { wl_event_loop_get_fd(self.handle.native()?) })
    }

    /// Number of closures ever registered on this loop.
    pub fn closure_count(&self) -> usize {
        self.handle.extra().map_or(0, |extra| {
            extra.fd_closures.len()
                + extra.timer_closures.len()
                + extra.signal_closures.len()
                + extra.idle_closures.len()
        })
    }
}

/// A registered source. Operations fail with `StaleSource` once the source
/// was removed or has fired (idle sources).
#[derive(Clone)]
pub struct EventSource {
    state: Rc<SourceState>,
    event_loop: EventLoop,
}

impl EventSource {
    fn live(&self) -> Result<*mut wl_event_source> {
        self.event_loop.native()?;
        let raw = self.state.raw.get();
        if raw.is_null() {
            Err(Error::StaleSource)
        } else {
            Ok(raw)
        }
    }

    pub fn is_live(&self) -> bool {
        self.live().is_ok()
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// Arm a timer `ms_delay` milliseconds from now; `0` disarms it.
    pub fn timer_update(&self, ms_delay: i32) -> Result<i32> {
        let raw = self.live()?;
        Ok(unsafe { wl_event_source_timer_update(raw, ms_delay) })
    }

    pub fn fd_update(&self, mask: u32) -> Result<i32> {
        let raw = self.live()?;
        Ok(unsafe { wl_event_source_fd_update(raw, mask) })
    }

    /// Re-run the callback after every dispatch until it returns 0.
    pub fn check(&self) -> Result<()> {
        let raw = self.live()?;
        unsafe { wl_event_source_check(raw) };
        Ok(())
    }

    pub fn remove(&self) -> Result<()> {
        let raw = self.live()?;
        self.state.take();
        unsafe { wl_event_source_remove(raw) };
        Ok(())
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("raw", &self.state.raw.get())
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_fd_closure_receives_mask() {
        let event_loop = EventLoop::new().unwrap();
        let (mut a, b) = UnixStream::pair().unwrap();
        let seen = Rc::new(Cell::new(0u32));
        let record = Rc::clone(&seen);
        let source = event_loop
            .add_fd(b.as_raw_fd(), EVENT_READABLE, move |_fd, mask| {
                record.set(mask);
                0
            })
            .unwrap();
        assert!(source.is_live());

        a.write_all(b"ping").unwrap();
        assert_eq!(event_loop.dispatch(100).unwrap(), 0);
        assert_eq!(seen.get() & EVENT_READABLE, EVENT_READABLE);
    }

    #[test]
    fn test_timer_rearms() {
        let event_loop = EventLoop::new().unwrap();
        let fired = Rc::new(Cell::new(0));
        let count = Rc::clone(&fired);
        let timer = event_loop
            .add_timer(move || {
                count.set(count.get() + 1);
                0
            })
            .unwrap();

        event_loop.dispatch(0).unwrap();
        assert_eq!(fired.get(), 0);

        for expected in 1..=2 {
            timer.timer_update(1).unwrap();
            for _ in 0..100 {
                if fired.get() == expected {
                    break;
                }
                event_loop.dispatch(10).unwrap();
            }
            assert_eq!(fired.get(), expected);
        }
    }

    #[test]
    fn test_idle_is_one_shot() {
        let event_loop = EventLoop::new().unwrap();
        let fired = Rc::new(Cell::new(0));
        let count = Rc::clone(&fired);
        let idle = event_loop.add_idle(move || count.set(count.get() + 1)).unwrap();
        event_loop.dispatch_idle().unwrap();
        event_loop.dispatch(0).unwrap();
        assert_eq!(fired.get(), 1);
        assert!(!idle.is_live());
        assert!(matches!(idle.remove(), Err(Error::StaleSource)));
    }

    #[test]
    fn test_removed_source_is_stale() {
        let event_loop = EventLoop::new().unwrap();
        let timer = event_loop.add_timer(|| 0).unwrap();
        timer.remove().unwrap();
        assert!(!timer.is_live());
        assert!(matches!(timer.timer_update(5), Err(Error::StaleSource)));
        assert!(matches!(timer.check(), Err(Error::StaleSource)));
    }

    #[test]
    fn test_stale_source_ignores_reused_allocation() {
        let event_loop = EventLoop::new().unwrap();
        let first = event_loop.add_timer(|| 0).unwrap();
        first.remove().unwrap();
        // The allocator may hand the freed source's address to this one.
        let second = event_loop.add_timer(|| 0).unwrap();

        assert!(!first.is_live());
        assert!(matches!(first.remove(), Err(Error::StaleSource)));
        assert!(matches!(first.timer_update(5), Err(Error::StaleSource)));
        assert!(second.is_live());
        assert_eq!(second.timer_update(0).unwrap(), 0);
        second.remove().unwrap();
    }

    #[test]
    fn test_closures_are_kept_per_kind() {
        let event_loop = EventLoop::new().unwrap();
        let (_a, b) = UnixStream::pair().unwrap();
        event_loop.add_timer(|| 0).unwrap();
        event_loop.add_timer(|| 0).unwrap();
        event_loop.add_fd(b.as_raw_fd(), EVENT_READABLE, |_, _| 0).unwrap();
        event_loop.add_idle(|| {}).unwrap();
        assert_eq!(event_loop.closure_count(), 4);
    }

    #[test]
    fn test_dropping_standalone_loop_destroys_it() {
        let event_loop = EventLoop::new().unwrap();
        let timer = event_loop.add_timer(|| 0).unwrap();
        let destroyed = Rc::new(Cell::new(false));
        let flag = Rc::clone(&destroyed);
        event_loop.on_destroy(move || flag.set(true)).unwrap();
        drop(event_loop);
        assert!(!destroyed.get());
        // The source keeps the loop alive.
        drop(timer);
        assert!(destroyed.get());
    }

    #[test]
    fn test_sources_go_stale_with_their_loop() {
        let event_loop = EventLoop::new().unwrap();
        let timer = event_loop.add_timer(|| 0).unwrap();
        event_loop.destroy().unwrap();
        assert!(!timer.is_live());
        assert!(matches!(timer.remove(), Err(Error::NullHandle("event loop"))));
    }
}
