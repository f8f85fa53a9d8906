//! Core protocol objects.

use crate::server::{Array, Fd};

protocol_object! {
    /// `wl_callback`: a one-shot completion notification.
    pub struct Callback: wl_callback, version 1, events CallbackEvents {
        requests {}
        events {
            0 => done(callback_data: u32);
        }
    }
}

protocol_object! {
    /// `wl_compositor`: creates surfaces and regions.
    pub struct Compositor: wl_compositor, version 4, events CompositorEvents {
        requests {
            0 => create_surface(id: Surface) => on_create_surface;
            1 => create_region(id: Region) => on_create_region;
        }
        events {}
    }
}

protocol_object! {
    /// `wl_surface`: a rectangular area that displays buffers.
    pub struct Surface: wl_surface, version 4, events SurfaceEvents {
        requests {
            0 => destroy() => on_destroy_request, destructor;
            1 => attach(buffer: Option<Buffer>, x: i32, y: i32) => on_attach;
            2 => damage(x: i32, y: i32, width: i32, height: i32) => on_damage;
            3 => frame(callback: Callback) => on_frame;
            4 => set_opaque_region(region: Option<Region>) => on_set_opaque_region;
            5 => set_input_region(region: Option<Region>) => on_set_input_region;
            6 => commit() => on_commit;
            7 => set_buffer_transform(transform: i32) => on_set_buffer_transform;
            8 => set_buffer_scale(scale: i32) => on_set_buffer_scale;
            9 => damage_buffer(x: i32, y: i32, width: i32, height: i32) => on_damage_buffer;
        }
        events {
            0 => enter(output: &Output);
            1 => leave(output: &Output);
        }
    }
}

protocol_object! {
    /// `wl_region`: a set of rectangles.
    pub struct Region: wl_region, version 1, events RegionEvents {
        requests {
            0 => destroy() => on_destroy_request, destructor;
            1 => add(x: i32, y: i32, width: i32, height: i32) => on_add;
            2 => subtract(x: i32, y: i32, width: i32, height: i32) => on_subtract;
        }
        events {}
    }
}

protocol_object! {
    /// `wl_shm`: shared memory pool factory.
    pub struct Shm: wl_shm, version 1, events ShmEvents {
        requests {
            0 => create_pool(id: ShmPool, fd: i32, size: i32) => on_create_pool;
        }
        events {
            0 => format(format: u32);
        }
    }
}

protocol_object! {
    /// `wl_shm_pool`: a client memory mapping that buffers are cut from.
    pub struct ShmPool: wl_shm_pool, version 1, events ShmPoolEvents {
        requests {
            0 => create_buffer(id: Buffer, offset: i32, width: i32, height: i32, stride: i32, format: u32) => on_create_buffer;
            1 => destroy() => on_destroy_request, destructor;
            2 => resize(size: i32) => on_resize;
        }
        events {}
    }
}

protocol_object! {
    /// `wl_buffer`: pixel content for a surface.
    pub struct Buffer: wl_buffer, version 1, events BufferEvents {
        requests {
            0 => destroy() => on_destroy_request, destructor;
        }
        events {
            0 => release();
        }
    }
}

protocol_object! {
    /// `wl_seat`: a group of input devices.
    pub struct Seat: wl_seat, version 7, events SeatEvents {
        requests {
            0 => get_pointer(id: Pointer) => on_get_pointer;
            1 => get_keyboard(id: Keyboard) => on_get_keyboard;
            2 => get_touch(id: Touch) => on_get_touch;
            3 => release() => on_release, destructor;
        }
        events {
            0 => capabilities(capabilities: u32);
            1 => name(name: &str);
        }
    }
}

protocol_object! {
    pub struct Pointer: wl_pointer, version 7, events PointerEvents {
        requests {
            0 => set_cursor(serial: u32, surface: Option<Surface>, hotspot_x: i32, hotspot_y: i32) => on_set_cursor;
            1 => release() => on_release, destructor;
        }
        events {
            0 => enter(serial: u32, surface: &Surface, x: f64, y: f64);
            1 => leave(serial: u32, surface: &Surface);
            2 => motion(time: u32, x: f64, y: f64);
            3 => button(serial: u32, time: u32, button: u32, state: u32);
            4 => axis(time: u32, axis: u32, value: f64);
            5 => frame();
            6 => axis_source(axis_source: u32);
            7 => axis_stop(time: u32, axis: u32);
            8 => axis_discrete(axis: u32, discrete: i32);
        }
    }
}

protocol_object! {
    pub struct Keyboard: wl_keyboard, version 7, events KeyboardEvents {
        requests {
            0 => release() => on_release, destructor;
        }
        events {
            0 => keymap(format: u32, fd: Fd, size: u32);
            1 => enter(serial: u32, surface: &Surface, keys: &Array);
            2 => leave(serial: u32, surface: &Surface);
            3 => key(serial: u32, time: u32, key: u32, state: u32);
            4 => modifiers(serial: u32, depressed: u32, latched: u32, locked: u32, group: u32);
            5 => repeat_info(rate: i32, delay: i32);
        }
    }
}

protocol_object! {
    pub struct Touch: wl_touch, version 7, events TouchEvents {
        requests {
            0 => release() => on_release, destructor;
        }
        events {
            0 => down(serial: u32, time: u32, surface: &Surface, id: i32, x: f64, y: f64);
            1 => up(serial: u32, time: u32, id: i32);
            2 => motion(time: u32, id: i32, x: f64, y: f64);
            3 => frame();
            4 => cancel();
            5 => shape(id: i32, major: f64, minor: f64);
            6 => orientation(id: i32, orientation: f64);
        }
    }
}

protocol_object! {
    /// `wl_output`: a monitor and its modes.
    pub struct Output: wl_output, version 4, events OutputEvents {
        requests {
            0 => release() => on_release, destructor;
        }
        events {
            0 => geometry(x: i32, y: i32, physical_width: i32, physical_height: i32, subpixel: i32, make: &str, model: &str, transform: i32);
            1 => mode(flags: u32, width: i32, height: i32, refresh: i32);
            2 => done();
            3 => scale(factor: i32);
            4 => name(name: &str);
            5 => description(description: &str);
        }
    }
}

/// `wl_shm.format` values. Apart from the first two these are DRM fourcc
/// codes.
pub mod shm_format {
    pub const ARGB8888: u32 = 0;
    pub const XRGB8888: u32 = 1;
    pub const RGB565: u32 = 0x3631_4752;
    pub const XBGR8888: u32 = 0x3432_4258;
    pub const ABGR8888: u32 = 0x3432_4241;

    const NAMES: [(&str, u32); 5] = [
        ("argb8888", ARGB8888),
        ("xrgb8888", XRGB8888),
        ("rgb565", RGB565),
        ("xbgr8888", XBGR8888),
        ("abgr8888", ABGR8888),
    ];

    pub fn from_name(name: &str) -> Option<u32> {
        let name = name.to_ascii_lowercase();
        NAMES.iter().find(|(n, _)| *n == name).map(|(_, code)| *code)
    }

    pub fn name(format: u32) -> Option<&'static str> {
        NAMES.iter().find(|(_, code)| *code == format).map(|(n, _)| *n)
    }
}

pub mod shm_error {
    pub const INVALID_FORMAT: u32 = 0;
    pub const INVALID_STRIDE: u32 = 1;
    pub const INVALID_FD: u32 = 2;
}

pub mod surface_error {
    pub const INVALID_SCALE: u32 = 0;
    pub const INVALID_TRANSFORM: u32 = 1;
}

pub mod keymap_format {
    pub const NO_KEYMAP: u32 = 0;
    pub const XKB_V1: u32 = 1;
}

pub mod seat_capability {
    pub const POINTER: u32 = 1;
    pub const KEYBOARD: u32 = 2;
    pub const TOUCH: u32 = 4;

    pub fn from_name(name: &str) -> Option<u32> {
        match name.to_ascii_lowercase().as_str() {
            "pointer" => Some(POINTER),
            "keyboard" => Some(KEYBOARD),
            "touch" => Some(TOUCH),
            _ => None,
        }
    }
}

pub mod output_subpixel {
    pub const UNKNOWN: i32 = 0;
    pub const NONE: i32 = 1;
    pub const HORIZONTAL_RGB: i32 = 2;
    pub const HORIZONTAL_BGR: i32 = 3;
    pub const VERTICAL_RGB: i32 = 4;
    pub const VERTICAL_BGR: i32 = 5;
}

pub mod output_transform {
    pub const NORMAL: i32 = 0;
    pub const ROTATE_90: i32 = 1;
    pub const ROTATE_180: i32 = 2;
    pub const ROTATE_270: i32 = 3;
    pub const FLIPPED: i32 = 4;
    pub const FLIPPED_90: i32 = 5;
    pub const FLIPPED_180: i32 = 6;
    pub const FLIPPED_270: i32 = 7;
}

pub mod output_mode {
    pub const CURRENT: u32 = 1;
    pub const PREFERRED: u32 = 2;
}
