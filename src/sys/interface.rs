//! Typed views of libwayland's interface and message tables.

use std::ffi::{c_char, CStr};
use std::fmt;
use std::os::raw::c_int;

use super::{wl_interface, wl_message};

unsafe fn static_str(ptr: *const c_char) -> &'static str {
    if ptr.is_null() {
        return "";
    }
    CStr::from_ptr(ptr).to_str().unwrap_or("")
}

unsafe fn message_at(table: *const wl_message, count: c_int, opcode: u32) -> Option<Message> {
    let count = u32::try_from(count).unwrap_or(0);
    if table.is_null() || opcode >= count {
        return None;
    }
    table.add(opcode as usize).as_ref().map(Message)
}

/// One protocol interface: its name, highest supported version and the
/// request/event tables indexed by opcode.
#[derive(Clone, Copy)]
pub struct Interface(&'static wl_interface);

impl Interface {
    pub fn new(raw: &'static wl_interface) -> Self {
        Self(raw)
    }

    /// # Safety
    ///
    /// `raw` must be null or point at a table that outlives the program,
    /// such as the `wl_*_interface` statics.
    pub unsafe fn from_ptr(raw: *const wl_interface) -> Option<Self> {
        raw.as_ref().map(Self)
    }

    pub fn as_ptr(self) -> *const wl_interface {
        self.0
    }

    pub fn name(self) -> &'static str {
        unsafe { static_str(self.0.name) }
    }

    pub fn version(self) -> u32 {
        u32::try_from(self.0.version).unwrap_or(0)
    }

    pub fn request(self, opcode: u32) -> Option<Message> {
        unsafe { message_at(self.0.requests, self.0.request_count, opcode) }
    }

    pub fn event(self, opcode: u32) -> Option<Message> {
        unsafe { message_at(self.0.events, self.0.event_count, opcode) }
    }

    pub fn requests(self) -> impl Iterator<Item = Message> {
        let count = u32::try_from(self.0.request_count).unwrap_or(0);
        (0..count).filter_map(move |opcode| self.request(opcode))
    }

    pub fn events(self) -> impl Iterator<Item = Message> {
        let count = u32::try_from(self.0.event_count).unwrap_or(0);
        (0..count).filter_map(move |opcode| self.event(opcode))
    }

    /// Interfaces are compared by name so tables generated separately for
    /// the same protocol still match.
    pub fn same_as(self, other: Interface) -> bool {
        std::ptr::eq(self.0, other.0) || self.name() == other.name()
    }
}

impl PartialEq for Interface {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(*other)
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name(), self.version())
    }
}

/// One argument of a signature, modifiers folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub kind: char,
    pub nullable: bool,
}

pub fn is_modifier(c: char) -> bool {
    c == '?' || c.is_ascii_digit()
}

/// A single request or event.
///
/// `types` has one slot per argument; typed object and new-id arguments
/// name their interface there.
#[derive(Clone, Copy)]
pub struct Message(&'static wl_message);

impl Message {
    pub fn new(raw: &'static wl_message) -> Self {
        Self(raw)
    }

    /// # Safety
    ///
    /// `raw` must be null or point into a table that outlives the program.
    pub unsafe fn from_ptr(raw: *const wl_message) -> Option<Self> {
        raw.as_ref().map(Self)
    }

    pub fn as_ptr(self) -> *const wl_message {
        self.0
    }

    pub fn name(self) -> &'static str {
        unsafe { static_str(self.0.name) }
    }

    pub fn signature(self) -> &'static str {
        unsafe { static_str(self.0.signature) }
    }

    pub fn arg_count(self) -> usize {
        self.signature().chars().filter(|c| !is_modifier(*c)).count()
    }

    /// Protocol version that introduced the message.
    pub fn since(self) -> u32 {
        let digits: String = self
            .signature()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().unwrap_or(1)
    }

    pub fn args(self) -> impl Iterator<Item = ArgSpec> {
        let mut nullable = false;
        self.signature().chars().filter_map(move |c| {
            if c == '?' {
                nullable = true;
                None
            } else if c.is_ascii_digit() {
                None
            } else {
                let spec = ArgSpec { kind: c, nullable };
                nullable = false;
                Some(spec)
            }
        })
    }

    /// Interface expected for argument `index`, if the table names one.
    pub fn arg_interface(self, index: usize) -> Option<Interface> {
        if self.0.types.is_null() || index >= self.arg_count() {
            return None;
        }
        unsafe { Interface::from_ptr(*self.0.types.add(index)) }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.signature())
    }
}

/// Builds a message table entry that lives for the rest of the test run.
#[cfg(test)]
pub(crate) fn leak_message(
    name: &'static CStr,
    signature: &'static CStr,
    types: Vec<*const wl_interface>,
) -> Message {
    let types: &'static [*const wl_interface] = Box::leak(types.into_boxed_slice());
    let raw = Box::leak(Box::new(wl_message {
        name: name.as_ptr(),
        signature: signature.as_ptr(),
        types: types.as_ptr(),
    }));
    Message(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::interfaces::{wl_buffer, wl_surface};

    fn sample() -> Message {
        leak_message(c"sample", c"2u?osn", vec![std::ptr::null(); 4])
    }

    #[test]
    fn test_modifiers_are_not_arguments() {
        let msg = sample();
        assert_eq!(msg.arg_count(), 4);
        assert_eq!(msg.since(), 2);
        let kinds: Vec<char> = msg.args().map(|a| a.kind).collect();
        assert_eq!(kinds, vec!['u', 'o', 's', 'n']);
        assert_eq!(msg.name(), "sample");
    }

    #[test]
    fn test_nullable_applies_to_next_argument_only() {
        let nullable: Vec<bool> = sample().args().map(|a| a.nullable).collect();
        assert_eq!(nullable, vec![false, true, false, false]);
    }

    #[test]
    fn test_since_defaults_to_one() {
        let msg = leak_message(c"m", c"iu", vec![std::ptr::null(); 2]);
        assert_eq!(msg.since(), 1);
    }

    #[test]
    fn test_untyped_slots_have_no_interface() {
        let msg = sample();
        assert!(msg.arg_interface(1).is_none());
        assert!(msg.arg_interface(9).is_none());
    }

    #[test]
    fn test_library_tables_are_readable() {
        let attach = wl_surface().request(1).unwrap();
        assert_eq!(attach.name(), "attach");
        assert_eq!(attach.arg_interface(0), Some(wl_buffer()));
        assert!(wl_surface().request(wl_surface().requests().count() as u32).is_none());
        assert_eq!(wl_surface(), wl_surface());
        assert_ne!(wl_surface(), wl_buffer());
    }
}
