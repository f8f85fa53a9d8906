//! Signature-driven request decoding and dispatch.
//!
//! libwayland hands every request to [`c_dispatcher`] together with the
//! implementation pointer stored on the resource. That pointer is the
//! per-interface [`DispatchFn`]; the decoded [`Argument`]s and the
//! resource's events table are forwarded to it unchanged.

use std::any::Any;
use std::ffi::{c_void, CStr};
use std::mem;
use std::os::raw::c_int;
use std::rc::Rc;
use std::slice;

use log::{trace, warn};

use super::argument::{Argument, Array};
use super::client::Client;
use super::error::{Error, Result};
use super::resource::Resource;
use crate::sys::{wl_argument, wl_message, wl_resource, Message};

/// Per-interface dispatch function, selected by opcode inside.
pub type DispatchFn = fn(resource: &Resource, opcode: u32, args: Vec<Argument>, events: Option<Rc<dyn Any>>) -> i32;

pub(crate) fn dispatch_fn_ptr(dispatch: DispatchFn) -> *const c_void {
    dispatch as *const c_void
}

/// Decode libwayland argument slots into typed arguments following
/// `message`'s signature.
///
/// `n` arguments create a resource for `client` with the interface (and
/// its declared version) named by the message; id 0 yields a null
/// resource. Null strings and arrays decode as empty values.
///
/// # Safety
/// `wire` must hold one valid slot per signature argument.
pub unsafe fn decode_arguments(message: Message, wire: &[wl_argument], client: &Client) -> Result<Vec<Argument>> {
    let mut args = Vec::with_capacity(message.arg_count());
    for (index, spec) in message.args().enumerate() {
        let slot = wire.get(index).ok_or(Error::MissingArgument {
            message: message.name(),
            index,
        })?;
        let arg = match spec.kind {
            'i' => Argument::Int(slot.i),
            'h' => Argument::Int(slot.h),
            'f' => Argument::Int(slot.f),
            'u' => Argument::Uint(slot.u),
            's' => {
                if slot.s.is_null() {
                    Argument::Str(String::new())
                } else {
                    Argument::Str(CStr::from_ptr(slot.s).to_string_lossy().into_owned())
                }
            }
            'o' => Argument::Resource(Resource::from_raw(slot.o as *mut wl_resource)),
            'n' => {
                if slot.n == 0 {
                    Argument::Resource(Resource::null())
                } else {
                    let interface = message.arg_interface(index).ok_or(Error::UntypedNewId {
                        message: message.name(),
                        index,
                    })?;
                    Argument::Resource(Resource::create(client, interface, interface.version(), slot.n)?)
                }
            }
            'a' => {
                let array = slot.a;
                if array.is_null() || (*array).data.is_null() {
                    Argument::Array(Array::default())
                } else {
                    let bytes = slice::from_raw_parts((*array).data as *const u8, (*array).size);
                    Argument::Array(Array(bytes.to_vec()))
                }
            }
            other => return Err(Error::UnknownSignatureType(other)),
        };
        args.push(arg);
    }
    Ok(args)
}

/// Validate the native call and run the resource's dispatch function.
///
/// # Safety
/// Non-null pointers must be what libwayland passes to a dispatcher.
pub unsafe fn dispatch_raw(
    implementation: *const c_void,
    target: *mut c_void,
    opcode: u32,
    message: *const wl_message,
    args: *const wl_argument,
) -> Result<i32> {
    if implementation.is_null() {
        return Err(Error::InvalidDispatch("implementation"));
    }
    if target.is_null() {
        return Err(Error::InvalidDispatch("target"));
    }
    let message = Message::from_ptr(message).ok_or(Error::InvalidDispatch("message"))?;
    if args.is_null() && message.arg_count() > 0 {
        return Err(Error::InvalidDispatch("arguments"));
    }

    let dispatch: DispatchFn = mem::transmute::<*const c_void, DispatchFn>(implementation);
    let resource = Resource::from_raw(target as *mut wl_resource);
    let client = resource.client()?;
    let wire = if args.is_null() {
        &[][..]
    } else {
        slice::from_raw_parts(args, message.arg_count())
    };
    let values = decode_arguments(message, wire, &client)?;
    trace!("dispatching {}.{} with {} arguments", resource.class()?, message.name(), values.len());
    Ok(dispatch(&resource, opcode, values, resource.events()))
}

/// Dispatcher installed by [`Resource::set_events`]. Decode failures drop
/// the request and leave the session running; libwayland ignores the
/// return value.
///
/// # Safety
/// See [`dispatch_raw`].
pub unsafe extern "C" fn c_dispatcher(
    implementation: *const c_void,
    target: *mut c_void,
    opcode: u32,
    message: *const wl_message,
    args: *const wl_argument,
) -> c_int {
    match dispatch_raw(implementation, target, opcode, message, args) {
        Ok(ret) => ret,
        Err(err) => {
            warn!("⚠️ Dropping request (opcode {}): {}", opcode, err);
            -1
        }
    }
}

/// Installed on resources created here until they receive an events table,
/// so requests on them are accepted and ignored.
///
/// # Safety
/// Never dereferences its arguments.
pub unsafe extern "C" fn fallback_dispatcher(
    _implementation: *const c_void,
    _target: *mut c_void,
    opcode: u32,
    _message: *const wl_message,
    _args: *const wl_argument,
) -> c_int {
    trace!("ignoring opcode {} on a resource without handlers", opcode);
    0
}
