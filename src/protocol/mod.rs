//! Typed protocol objects.
//!
//! [`protocol_object!`] turns a request/event listing into a typed wrapper
//! around [`Resource`]: an events table with one handler slot per request,
//! `on_*` setters, event senders and the opcode dispatch function the
//! generic dispatcher calls.
//!
//! ```no_run
//! use wlserver::protocol::core::Compositor;
//! use wlserver::protocol::ProtocolObject;
//! # fn demo(resource: wlserver::server::Resource) -> wlserver::server::Result<()> {
//! let compositor = Compositor::from_resource(resource)?;
//! compositor.on_create_surface(|_compositor, surface| {
//!     surface.on_commit(|surface| log::debug!("commit on {:?}", surface.id()));
//! });
//! # Ok(())
//! # }
//! ```

use crate::server::{Client, Resource, Result};
use crate::sys::Interface;

/// A typed view of a resource of one interface.
pub trait ProtocolObject: Sized {
    /// Highest version of the interface this wrapper handles.
    const VERSION: u32;

    fn interface() -> Interface;

    /// Wrap `resource`, installing this type's events table unless the
    /// resource already carries one.
    fn from_resource(resource: Resource) -> Result<Self>;

    fn resource(&self) -> &Resource;

    /// Create a server-side object of this type for `client`.
    fn create(client: &Client, version: u32, id: u32) -> Result<Self> {
        Self::from_resource(Resource::create(client, Self::interface(), version, id)?)
    }
}

impl<T: ProtocolObject> crate::server::FromArgument for Option<T> {
    const EXPECTED: &'static str = "object";

    fn from_argument(arg: crate::server::Argument) -> Option<Self> {
        match arg {
            crate::server::Argument::Resource(resource) if resource.is_null() => Some(None),
            crate::server::Argument::Resource(resource) => T::from_resource(resource).ok().map(Some),
            _ => None,
        }
    }
}

/// Generate a typed protocol object.
///
/// The header names the interface accessor from [`interfaces`] and the
/// highest version handled. Requests are `opcode => name(args) => setter;`,
/// with a trailing `, destructor` for requests that destroy the object
/// after the handler runs. Events are `opcode => sender(args);`.
macro_rules! protocol_object {
    (@destroy destructor, $object:ident, $name:ident, $req:ident) => {
        if let Err(err) = $object.resource.destroy() {
            log::debug!("{}.{}: {}", stringify!($name), stringify!($req), err);
        }
    };
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $iface:ident, version $version:literal, events $events:ident {
            requests {
                $( $rop:literal => $req:ident ( $( $ra:ident : $rt:ty ),* ) => $setter:ident $(, $destructor:ident)? ; )*
            }
            events {
                $( $eop:literal => $ev:ident ( $( $ea:ident : $et:ty ),* ) ; )*
            }
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            resource: $crate::server::Resource,
            events: ::std::rc::Rc<$events>,
        }

        /// Request handlers of one resource, shared by all its wrappers.
        #[derive(Default)]
        pub struct $events {
            $( $req: $crate::server::listener::Slot<dyn FnMut(&$name $(, $rt)*)>, )*
        }

        impl $name {
            $(
                pub fn $setter(&self, f: impl FnMut(&$name $(, $rt)*) + 'static) {
                    self.events.$req.set(Box::new(f));
                }
            )*

            $(
                #[allow(clippy::too_many_arguments)]
                pub fn $ev(&self $(, $ea: $et)*) -> $crate::server::Result<()> {
                    self.resource.post_event($eop, &[$($crate::server::Argument::from($ea)),*])
                }
            )*

            #[allow(unused_mut, unused_variables)]
            fn dispatch(
                resource: &$crate::server::Resource,
                opcode: u32,
                args: ::std::vec::Vec<$crate::server::Argument>,
                events: ::std::option::Option<::std::rc::Rc<dyn ::std::any::Any>>,
            ) -> i32 {
                let events = match events.and_then(|events| events.downcast::<$events>().ok()) {
                    Some(events) => events,
                    None => return 0,
                };
                let object = $name {
                    resource: resource.clone(),
                    events: ::std::rc::Rc::clone(&events),
                };
                let mut args = args.into_iter();
                match opcode {
                    $(
                        $rop => {
                            let mut index = 0usize;
                            $(
                                let $ra: $rt = match $crate::server::argument::next_argument(
                                    &mut args,
                                    stringify!($req),
                                    &mut index,
                                ) {
                                    Ok(value) => value,
                                    Err(err) => {
                                        log::warn!("⚠️ {}.{}: {}", stringify!($name), stringify!($req), err);
                                        return -1;
                                    }
                                };
                            )*
                            events.$req.with(|f| f(&object $(, $ra)*));
                            $( protocol_object!(@destroy $destructor, object, $name, $req); )?
                            0
                        }
                    )*
                    _ => -1,
                }
            }
        }

        impl $crate::protocol::ProtocolObject for $name {
            const VERSION: u32 = $version;

            fn interface() -> $crate::sys::Interface {
                $crate::protocol::interfaces::$iface()
            }

            fn from_resource(resource: $crate::server::Resource) -> $crate::server::Result<Self> {
                let interface = resource.interface()?;
                let mismatch = || $crate::server::Error::EventsMismatch {
                    class: interface.name(),
                    id: resource.id().unwrap_or(0),
                };
                if !interface.same_as(<Self as $crate::protocol::ProtocolObject>::interface()) {
                    return Err(mismatch());
                }
                let fresh: ::std::rc::Rc<dyn ::std::any::Any> = ::std::rc::Rc::new($events::default());
                resource.set_events(fresh, Self::dispatch)?;
                let events = resource.events_as::<$events>().ok_or_else(mismatch)?;
                Ok(Self { resource, events })
            }

            fn resource(&self) -> &$crate::server::Resource {
                &self.resource
            }
        }

        impl ::std::ops::Deref for $name {
            type Target = $crate::server::Resource;

            fn deref(&self) -> &Self::Target {
                &self.resource
            }
        }

        impl ::std::cmp::PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.resource == other.resource
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("resource", &self.resource)
                    .finish()
            }
        }

        impl $crate::server::FromArgument for $name {
            const EXPECTED: &'static str = stringify!($name);

            fn from_argument(arg: $crate::server::Argument) -> ::std::option::Option<Self> {
                match arg {
                    $crate::server::Argument::Resource(resource) => {
                        <Self as $crate::protocol::ProtocolObject>::from_resource(resource).ok()
                    }
                    _ => None,
                }
            }
        }

        impl ::std::convert::From<&$name> for $crate::server::Argument {
            fn from(object: &$name) -> Self {
                $crate::server::Argument::Resource(object.resource.clone())
            }
        }
    };
}

pub mod core;
pub mod interfaces;

pub use self::core::{
    Buffer, Callback, Compositor, Keyboard, Output, Pointer, Region, Seat, Shm, ShmPool, Surface, Touch,
};
