//! The core protocol interfaces, as exported by libwayland-server.
//!
//! Request and event order is the wire opcode order; the tables' versions
//! are whatever the installed libwayland implements.

use crate::sys::{wl_interface, Interface};

#[allow(non_upper_case_globals)]
extern "C" {
    static wl_display_interface: wl_interface;
    static wl_registry_interface: wl_interface;
    static wl_callback_interface: wl_interface;
    static wl_compositor_interface: wl_interface;
    static wl_shm_pool_interface: wl_interface;
    static wl_shm_interface: wl_interface;
    static wl_buffer_interface: wl_interface;
    static wl_surface_interface: wl_interface;
    static wl_seat_interface: wl_interface;
    static wl_pointer_interface: wl_interface;
    static wl_keyboard_interface: wl_interface;
    static wl_touch_interface: wl_interface;
    static wl_output_interface: wl_interface;
    static wl_region_interface: wl_interface;
}

macro_rules! core_interfaces {
    ($( $name:ident => $table:ident, )*) => {
        $(
            pub fn $name() -> Interface {
                Interface::new(unsafe { &$table })
            }
        )*

        /// Every interface defined here, for lookups by name.
        pub fn core_interfaces() -> Vec<Interface> {
            vec![$( $name() ),*]
        }
    };
}

core_interfaces! {
    wl_display => wl_display_interface,
    wl_registry => wl_registry_interface,
    wl_callback => wl_callback_interface,
    wl_compositor => wl_compositor_interface,
    wl_shm_pool => wl_shm_pool_interface,
    wl_shm => wl_shm_interface,
    wl_buffer => wl_buffer_interface,
    wl_surface => wl_surface_interface,
    wl_seat => wl_seat_interface,
    wl_pointer => wl_pointer_interface,
    wl_keyboard => wl_keyboard_interface,
    wl_touch => wl_touch_interface,
    wl_output => wl_output_interface,
    wl_region => wl_region_interface,
}

pub fn find_interface(name: &str) -> Option<Interface> {
    core_interfaces().into_iter().find(|iface| iface.name() == name)
}
