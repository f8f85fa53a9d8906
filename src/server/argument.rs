//! Typed request and event arguments.

use std::ffi::{c_void, CString};
use std::os::unix::io::RawFd;

use super::error::{Error, Result};
use super::resource::Resource;
use crate::sys::{wl_argument, wl_array, Message};

/// Decode a 24.8 fixed-point value.
pub fn fixed_to_f64(value: i32) -> f64 {
    f64::from(value) / 256.0
}

/// Encode a 24.8 fixed-point value.
pub fn fixed_from_f64(value: f64) -> i32 {
    (value * 256.0).round() as i32
}

/// Raw bytes of an `a` argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Array(pub Vec<u8>);

impl Array {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Pack 32-bit words in host order, the layout used for key lists.
    pub fn from_u32s(words: &[u32]) -> Self {
        Self(words.iter().flat_map(|w| w.to_ne_bytes()).collect())
    }

    pub fn to_u32s(&self) -> Vec<u32> {
        self.0
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Array {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// One wire argument. `f` values travel as [`Argument::Int`] holding the
/// 24.8 fixed-point encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Int(i32),
    Uint(u32),
    Str(String),
    Array(Array),
    Resource(Resource),
    /// Descriptor to send with an event. Received descriptors arrive as
    /// [`Argument::Int`].
    Fd(RawFd),
}

impl Argument {
    pub fn kind(&self) -> &'static str {
        match self {
            Argument::Int(_) => "int",
            Argument::Uint(_) => "uint",
            Argument::Str(_) => "string",
            Argument::Array(_) => "array",
            Argument::Resource(_) => "object",
            Argument::Fd(_) => "fd",
        }
    }

    /// Read an `Int` as a fixed-point number.
    pub fn as_fixed(&self) -> Option<f64> {
        match self {
            Argument::Int(value) => Some(fixed_to_f64(*value)),
            _ => None,
        }
    }
}

impl From<i32> for Argument {
    fn from(value: i32) -> Self {
        Argument::Int(value)
    }
}

impl From<u32> for Argument {
    fn from(value: u32) -> Self {
        Argument::Uint(value)
    }
}

impl From<f64> for Argument {
    fn from(value: f64) -> Self {
        Argument::Int(fixed_from_f64(value))
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Argument::Str(value.to_string())
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Argument::Str(value)
    }
}

impl From<Array> for Argument {
    fn from(value: Array) -> Self {
        Argument::Array(value)
    }
}

impl From<&Array> for Argument {
    fn from(value: &Array) -> Self {
        Argument::Array(value.clone())
    }
}

impl From<Resource> for Argument {
    fn from(value: Resource) -> Self {
        Argument::Resource(value)
    }
}

impl From<&Resource> for Argument {
    fn from(value: &Resource) -> Self {
        Argument::Resource(value.clone())
    }
}

/// A descriptor to pass with an event; the event carries a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fd(pub RawFd);

impl From<Fd> for Argument {
    fn from(fd: Fd) -> Self {
        Argument::Fd(fd.0)
    }
}

/// Extraction of a handler parameter from an [`Argument`]. Only the
/// matching variant converts; there is no numeric coercion.
pub trait FromArgument: Sized {
    const EXPECTED: &'static str;

    fn from_argument(arg: Argument) -> Option<Self>;
}

impl FromArgument for i32 {
    const EXPECTED: &'static str = "int";

    fn from_argument(arg: Argument) -> Option<Self> {
        match arg {
            Argument::Int(value) | Argument::Fd(value) => Some(value),
            _ => None,
        }
    }
}

impl FromArgument for u32 {
    const EXPECTED: &'static str = "uint";

    fn from_argument(arg: Argument) -> Option<Self> {
        match arg {
            Argument::Uint(value) => Some(value),
            _ => None,
        }
    }
}

impl FromArgument for f64 {
    const EXPECTED: &'static str = "fixed";

    fn from_argument(arg: Argument) -> Option<Self> {
        arg.as_fixed()
    }
}

impl FromArgument for String {
    const EXPECTED: &'static str = "string";

    fn from_argument(arg: Argument) -> Option<Self> {
        match arg {
            Argument::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl FromArgument for Array {
    const EXPECTED: &'static str = "array";

    fn from_argument(arg: Argument) -> Option<Self> {
        match arg {
            Argument::Array(value) => Some(value),
            _ => None,
        }
    }
}

impl FromArgument for Resource {
    const EXPECTED: &'static str = "object";

    fn from_argument(arg: Argument) -> Option<Self> {
        match arg {
            Argument::Resource(value) => Some(value),
            _ => None,
        }
    }
}

/// Pull the next handler parameter, counting positions for error reports.
pub fn next_argument<T: FromArgument>(
    args: &mut impl Iterator<Item = Argument>,
    message: &'static str,
    index: &mut usize,
) -> Result<T> {
    let position = *index;
    *index += 1;
    let arg = args.next().ok_or(Error::MissingArgument {
        message,
        index: position,
    })?;
    let found = arg.kind();
    T::from_argument(arg).ok_or(Error::ArgumentMismatch {
        message,
        index: position,
        expected: T::EXPECTED,
        found,
    })
}

/// Argument slots for one outgoing event, owning the string and array
/// storage the slots point into.
pub struct EncodedArguments {
    pub slots: Vec<wl_argument>,
    strings: Vec<CString>,
    arrays: Vec<(Box<wl_array>, Vec<u8>)>,
}

impl EncodedArguments {
    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    pub fn array_count(&self) -> usize {
        self.arrays.len()
    }
}

fn wire_kind(kind: char) -> &'static str {
    match kind {
        'i' => "int",
        'u' => "uint",
        'f' => "fixed",
        's' => "string",
        'o' => "object",
        'n' => "new_id",
        'a' => "array",
        'h' => "fd",
        _ => "unknown",
    }
}

/// Strings cross the C boundary NUL-terminated; interior NULs are dropped.
fn event_string(value: &str) -> CString {
    CString::new(value.replace('\0', "")).unwrap_or_default()
}

/// Convert `args` into libwayland argument slots following `message`'s
/// signature. Object and new-id slots carry the resource pointer.
pub fn encode_arguments(message: Message, args: &[Argument]) -> Result<EncodedArguments> {
    let expected = message.arg_count();
    if args.len() != expected {
        return Err(Error::ArgumentCount {
            message: message.name(),
            expected,
            found: args.len(),
        });
    }

    let mut encoded = EncodedArguments {
        slots: Vec::with_capacity(expected),
        strings: Vec::new(),
        arrays: Vec::new(),
    };
    for (index, (spec, arg)) in message.args().zip(args).enumerate() {
        let slot = match (spec.kind, arg) {
            ('i' | 'f', Argument::Int(value)) => wl_argument { i: *value },
            ('u', Argument::Uint(value)) => wl_argument { u: *value },
            ('s', Argument::Str(value)) => {
                let string = event_string(value);
                let slot = wl_argument { s: string.as_ptr() };
                encoded.strings.push(string);
                slot
            }
            ('o' | 'n', Argument::Resource(resource)) => {
                if resource.is_null() && !spec.nullable {
                    return Err(Error::NullArgument {
                        message: message.name(),
                        index,
                    });
                }
                wl_argument {
                    o: resource.as_ptr() as *mut c_void as _,
                }
            }
            ('a', Argument::Array(array)) => {
                let mut bytes = array.0.clone();
                let mut wire = Box::new(wl_array {
                    size: bytes.len(),
                    alloc: bytes.capacity(),
                    data: bytes.as_mut_ptr() as *mut c_void,
                });
                let slot = wl_argument {
                    a: &mut *wire as *mut wl_array as _,
                };
                encoded.arrays.push((wire, bytes));
                slot
            }
            ('h', Argument::Fd(fd)) => wl_argument { h: *fd },
            ('i' | 'u' | 'f' | 's' | 'o' | 'n' | 'a' | 'h', other) => {
                return Err(Error::ArgumentMismatch {
                    message: message.name(),
                    index,
                    expected: wire_kind(spec.kind),
                    found: other.kind(),
                })
            }
            (unknown, _) => return Err(Error::UnknownSignatureType(unknown)),
        };
        encoded.slots.push(slot);
    }
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::interface::leak_message;
    use std::ffi::CStr;
    use std::ptr;

    fn sample() -> Message {
        leak_message(c"sample", c"iusa?o", vec![ptr::null(); 5])
    }

    fn moved() -> Message {
        leak_message(c"moved", c"2ff", vec![ptr::null(); 2])
    }

    #[test]
    fn test_encode_owns_storage() {
        let message = sample();
        let args = [
            Argument::Int(-4),
            Argument::Uint(9),
            Argument::from("hello"),
            Argument::Array(Array::from_u32s(&[1, 2])),
            Argument::Resource(Resource::null()),
        ];
        let encoded = encode_arguments(message, &args).unwrap();
        assert_eq!(encoded.slots.len(), 5);
        assert_eq!(encoded.string_count(), 1);
        assert_eq!(encoded.array_count(), 1);
        unsafe {
            assert_eq!(encoded.slots[0].i, -4);
            assert_eq!(encoded.slots[1].u, 9);
            assert_eq!(CStr::from_ptr(encoded.slots[2].s).to_str().unwrap(), "hello");
            let array = &*encoded.slots[3].a;
            assert_eq!(array.size, 8);
            let words = std::slice::from_raw_parts(array.data as *const u32, 2);
            assert_eq!(words, &[1, 2]);
            assert!(encoded.slots[4].o.is_null());
        }
    }

    #[test]
    fn test_encode_strips_interior_nul() {
        let message = leak_message(c"title", c"s", vec![ptr::null()]);
        let encoded = encode_arguments(message, &[Argument::from("a\0b")]).unwrap();
        let text = unsafe { CStr::from_ptr(encoded.slots[0].s) };
        assert_eq!(text.to_str().unwrap(), "ab");
    }

    #[test]
    fn test_encode_rejects_null_object() {
        let message = leak_message(c"enter", c"uo", vec![ptr::null(); 2]);
        let args = [Argument::Uint(1), Argument::Resource(Resource::null())];
        assert!(matches!(
            encode_arguments(message, &args),
            Err(Error::NullArgument { index: 1, .. })
        ));
    }

    #[test]
    fn test_encode_rejects_wrong_variant() {
        let message = sample();
        let args = [
            Argument::Uint(1),
            Argument::Uint(9),
            Argument::from("x"),
            Argument::Array(Array::default()),
            Argument::Resource(Resource::null()),
        ];
        match encode_arguments(message, &args) {
            Err(Error::ArgumentMismatch { index, expected, found, .. }) => {
                assert_eq!(index, 0);
                assert_eq!(expected, "int");
                assert_eq!(found, "uint");
            }
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn test_encode_rejects_wrong_count() {
        let message = moved();
        assert!(matches!(
            encode_arguments(message, &[Argument::from(1.5)]),
            Err(Error::ArgumentCount { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn test_fixed_arguments() {
        let arg = Argument::from(2.5);
        assert_eq!(arg, Argument::Int(640));
        assert_eq!(f64::from_argument(arg), Some(2.5));
    }

    #[test]
    fn test_no_coercion() {
        assert_eq!(u32::from_argument(Argument::Int(3)), None);
        assert_eq!(i32::from_argument(Argument::Uint(3)), None);
        assert_eq!(String::from_argument(Argument::Int(3)), None);
        assert_eq!(i32::from_argument(Argument::Fd(7)), Some(7));
    }

    #[test]
    fn test_next_argument_reports_position() {
        let mut args = vec![Argument::Int(1)].into_iter();
        let mut index = 0;
        assert_eq!(next_argument::<i32>(&mut args, "sample", &mut index).unwrap(), 1);
        assert!(matches!(
            next_argument::<u32>(&mut args, "sample", &mut index),
            Err(Error::MissingArgument { index: 1, .. })
        ));
    }

    #[test]
    fn test_array_words() {
        let array = Array::from_u32s(&[30, 31]);
        assert_eq!(array.len(), 8);
        assert_eq!(array.to_u32s(), vec![30, 31]);
    }
}
