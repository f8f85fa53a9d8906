//! # wlserver - demo server
//!
//! Advertises `wl_compositor`, `wl_shm`, `wl_seat` and `wl_output`, keeps
//! the state clients build on them in each resource's user data and answers
//! frame callbacks once per loop iteration. Nothing is rendered: committed
//! buffers are released right away.

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::rc::Rc;
use std::time::Instant;

use wlserver::config::{OutputConfig, SeatConfig, ServerConfig};
use wlserver::protocol::core::{keymap_format, output_mode, output_subpixel, shm_error, shm_format, surface_error};
use wlserver::protocol::{
    Buffer, Callback, Compositor, Output, ProtocolObject, Region, Seat, Shm, ShmPool, Surface,
};
use wlserver::server::{Display, Fd, Global, Resource};

#[derive(Parser)]
#[command(name = "wlserver")]
#[command(about = "A minimal Wayland server built on the wlserver object model")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/wlserver/wlserver.toml")]
    config: String,

    /// Socket name, overrides the configuration
    #[arg(short, long)]
    socket: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Frame callbacks committed since the last loop iteration
type FrameQueue = Rc<RefCell<Vec<Callback>>>;

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

struct PoolState {
    fd: OwnedFd,
    size: i32,
}

struct BufferState {
    offset: i32,
    width: i32,
    height: i32,
    stride: i32,
    format: u32,
}

impl BufferState {
    fn describe(&self) -> String {
        let format = shm_format::name(self.format)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:#x}", self.format));
        format!(
            "{}x{} {} (stride {}, offset {})",
            self.width, self.height, format, self.stride, self.offset
        )
    }
}

#[derive(Default)]
struct SurfaceState {
    /// `Some(None)` detaches the current buffer on commit
    pending_buffer: Option<Option<Buffer>>,
    buffer: Option<Buffer>,
    damage: Vec<Rect>,
    pending_frames: Vec<Callback>,
    opaque_region: Option<Region>,
    input_region: Option<Region>,
    scale: i32,
    transform: i32,
    commits: u64,
}

#[derive(Default)]
struct RegionState {
    added: Vec<Rect>,
    subtracted: Vec<Rect>,
}

/// Run `f` on the user data of `resource` if it holds a `T`.
fn with_state<T: Any, R>(resource: &Resource, f: impl FnOnce(&mut T) -> R) -> Option<R> {
    let mut data = resource.user_data().ok()?;
    data.get_mut::<T>().map(f)
}

fn set_state<T: Any>(resource: &Resource, state: T) {
    if let Ok(mut data) = resource.user_data() {
        data.set(state);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("🚀 Starting wlserver");
    info!(
        "📄 Version: {} (built {} for {}, commit {})",
        wlserver::VERSION,
        env!("BUILD_DATE"),
        env!("TARGET_TRIPLE"),
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    );

    // Load configuration
    let mut config = match ServerConfig::load(&cli.config) {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            error!("❌ Failed to load configuration: {:#}", e);
            info!("📝 Using default configuration");
            ServerConfig::default()
        }
    };

    if let Some(socket) = cli.socket {
        config.socket.name = Some(socket);
    }
    config.validate().context("Invalid configuration")?;

    run(&config)
}

fn run(config: &ServerConfig) -> Result<()> {
    let display = Display::new().context("Failed to create display")?;
    let socket = match &config.socket.name {
        Some(name) => display.add_socket(name),
        None => display.add_socket_auto(),
    }
    .context("Failed to open listening socket")?;
    info!("🔌 Listening on WAYLAND_DISPLAY={}", socket);

    let frames = FrameQueue::default();
    let globals = create_globals(&display, config, &frames)?;

    if config.seat.hidden {
        display.set_global_filter(|_client, global| !global.has_interface(Seat::interface()))?;
        info!("🙈 Seat global hidden from clients");
    }

    let clients = Rc::new(Cell::new(0usize));
    let count = Rc::clone(&clients);
    display.on_client_created(move |client| {
        count.set(count.get() + 1);
        let pid = client.credentials().map(|c| c.pid).unwrap_or(0);
        info!("👋 Client connected (pid {})", pid);
        let count = Rc::clone(&count);
        let watched = client.on_destroy(move || {
            count.set(count.get().saturating_sub(1));
            info!("👋 Client disconnected (pid {})", pid);
        });
        if let Err(e) = watched {
            warn!("⚠️ Cannot watch client {}: {}", pid, e);
        }
    })?;

    let event_loop = display.event_loop()?;

    let running = Rc::new(Cell::new(true));
    let mut signal_sources = Vec::new();
    for signal in [libc::SIGINT, libc::SIGTERM] {
        let running = Rc::clone(&running);
        let source = event_loop
            .add_signal(signal, move |signal_number| {
                info!("🛑 Received signal {}, shutting down", signal_number);
                running.set(false);
                0
            })
            .with_context(|| format!("Failed to watch signal {}", signal))?;
        signal_sources.push(source);
    }

    let stats_due = Rc::new(Cell::new(false));
    let stats_ms = i32::try_from(config.event_loop.stats_interval_secs.saturating_mul(1000)).unwrap_or(i32::MAX);
    let stats_timer = if stats_ms > 0 {
        let due = Rc::clone(&stats_due);
        let timer = event_loop.add_timer(move || {
            due.set(true);
            0
        })?;
        timer.timer_update(stats_ms)?;
        Some(timer)
    } else {
        None
    };

    info!("✅ Server ready with {} globals", globals.len());

    let start = Instant::now();
    while running.get() {
        if event_loop.dispatch(config.event_loop.dispatch_timeout_ms)? < 0 {
            warn!("⚠️ Event loop dispatch failed");
        }
        display.flush_clients()?;

        // Millisecond timestamps wrap like protocol times do
        let time = start.elapsed().as_millis() as u32;
        if fire_frame_callbacks(&frames, time) > 0 {
            display.flush_clients()?;
        }

        if stats_due.replace(false) {
            info!(
                "📊 {} clients connected, {} frame callbacks pending",
                clients.get(),
                frames.borrow().len()
            );
            if let Some(timer) = &stats_timer {
                timer.timer_update(stats_ms)?;
            }
        }
    }

    info!("👋 wlserver shutting down");
    frames.borrow_mut().clear();
    display.destroy_clients()?;
    drop(stats_timer);
    drop(signal_sources);
    drop(globals);
    Ok(())
}

/// Send `done` to every queued frame callback and destroy it.
fn fire_frame_callbacks(frames: &FrameQueue, time: u32) -> usize {
    let pending = std::mem::take(&mut *frames.borrow_mut());
    let mut fired = 0;
    for callback in pending {
        match callback.done(time) {
            Ok(()) => {
                fired += 1;
                if let Err(e) = callback.destroy() {
                    debug!("frame callback already gone: {}", e);
                }
            }
            Err(e) => debug!("dropping frame callback: {}", e),
        }
    }
    fired
}

/// Advertise `T` at the highest version its wrapper handles.
fn advertise<T: ProtocolObject>(display: &Display) -> Result<Global> {
    Global::new(display, T::interface(), T::VERSION)
        .with_context(|| format!("Failed to create {} global", T::interface().name()))
}

/// Route binds of `global` to `serve` as typed objects.
fn bind_as<T: ProtocolObject + 'static>(global: &Global, mut serve: impl FnMut(&T) + 'static) -> Result<()> {
    global.on_bind(move |client, resource| match T::from_resource(resource) {
        Ok(object) => {
            debug!(
                "{} v{} bound by client fd {}",
                T::interface().name(),
                object.resource().version().unwrap_or(0),
                client.fd().unwrap_or(-1)
            );
            serve(&object);
        }
        Err(e) => warn!("⚠️ Failed to bind {}: {}", T::interface().name(), e),
    })?;
    Ok(())
}

fn create_globals(display: &Display, config: &ServerConfig, frames: &FrameQueue) -> Result<Vec<Global>> {
    let compositor = advertise::<Compositor>(display)?;
    let frames = Rc::clone(frames);
    bind_as(&compositor, move |compositor: &Compositor| {
        serve_compositor(compositor, Rc::clone(&frames))
    })?;

    let shm = advertise::<Shm>(display)?;
    let formats = Rc::new(config.shm.format_codes());
    bind_as(&shm, move |shm: &Shm| serve_shm(shm, Rc::clone(&formats)))?;

    let seat = advertise::<Seat>(display)?;
    let seat_config = config.seat.clone();
    bind_as(&seat, move |seat: &Seat| serve_seat(seat, &seat_config))?;

    let output = advertise::<Output>(display)?;
    let output_config = config.output.clone();
    bind_as(&output, move |output: &Output| {
        if let Err(e) = serve_output(output, &output_config) {
            warn!("⚠️ Failed to describe output: {}", e);
        }
    })?;

    Ok(vec![compositor, shm, seat, output])
}

fn serve_compositor(compositor: &Compositor, frames: FrameQueue) {
    compositor.on_create_surface(move |_, surface| {
        debug!("surface {:?} created", surface.id());
        set_state(&surface, SurfaceState {
            scale: 1,
            ..SurfaceState::default()
        });
        serve_surface(&surface, Rc::clone(&frames));
    });
    compositor.on_create_region(|_, region| {
        set_state(&region, RegionState::default());
        serve_region(&region);
    });
}

fn serve_surface(surface: &Surface, frames: FrameQueue) {
    surface.on_attach(|surface, buffer, x, y| {
        if x != 0 || y != 0 {
            debug!("surface {:?}: attach offset {},{}", surface.id(), x, y);
        }
        with_state(surface, |state: &mut SurfaceState| state.pending_buffer = Some(buffer));
    });
    surface.on_damage(|surface, x, y, width, height| {
        with_state(surface, |state: &mut SurfaceState| {
            state.damage.push(Rect { x, y, width, height })
        });
    });
    surface.on_damage_buffer(|surface, x, y, width, height| {
        with_state(surface, |state: &mut SurfaceState| {
            state.damage.push(Rect { x, y, width, height })
        });
    });
    surface.on_frame(|surface, callback| {
        with_state(surface, |state: &mut SurfaceState| state.pending_frames.push(callback));
    });
    surface.on_set_opaque_region(|surface, region| {
        with_state(surface, |state: &mut SurfaceState| state.opaque_region = region);
    });
    surface.on_set_input_region(|surface, region| {
        with_state(surface, |state: &mut SurfaceState| state.input_region = region);
    });
    surface.on_set_buffer_scale(|surface, scale| {
        if scale < 1 {
            let _ = surface.post_error(surface_error::INVALID_SCALE, &format!("invalid scale {}", scale));
            return;
        }
        with_state(surface, |state: &mut SurfaceState| state.scale = scale);
    });
    surface.on_set_buffer_transform(|surface, transform| {
        if !(0..=7).contains(&transform) {
            let _ = surface.post_error(
                surface_error::INVALID_TRANSFORM,
                &format!("invalid transform {}", transform),
            );
            return;
        }
        with_state(surface, |state: &mut SurfaceState| state.transform = transform);
    });
    surface.on_commit(move |surface| {
        let committed = with_state(surface, |state: &mut SurfaceState| {
            if let Some(buffer) = state.pending_buffer.take() {
                state.buffer = buffer;
            }
            state.commits += 1;
            let damage = std::mem::take(&mut state.damage);
            let callbacks = std::mem::take(&mut state.pending_frames);
            (state.buffer.clone(), damage, callbacks, state.commits)
        });
        let Some((buffer, damage, callbacks, commits)) = committed else {
            return;
        };
        debug!(
            "surface {:?}: commit #{} with {} damage rects, {} frame callbacks",
            surface.id(),
            commits,
            damage.len(),
            callbacks.len()
        );
        frames.borrow_mut().extend(callbacks);
        if let Some(buffer) = buffer {
            match with_state(&buffer, |state: &mut BufferState| state.describe()) {
                Some(shown) => debug!("surface {:?}: showing {}", surface.id(), shown),
                None => debug!("surface {:?}: showing buffer {:?} of unknown layout", surface.id(), buffer.id()),
            }
            if let Err(e) = buffer.release() {
                debug!("buffer release skipped: {}", e);
            }
        }
    });
    surface.on_destroy_request(|surface| {
        let summary = with_state(surface, |state: &mut SurfaceState| {
            (
                state.commits,
                state.scale,
                state.transform,
                state.opaque_region.is_some(),
                state.input_region.is_some(),
            )
        });
        debug!("surface {:?} destroyed (commits, scale, transform, opaque, input) = {:?}", surface.id(), summary);
    });
}

fn serve_region(region: &Region) {
    region.on_add(|region, x, y, width, height| {
        with_state(region, |state: &mut RegionState| {
            state.added.push(Rect { x, y, width, height })
        });
    });
    region.on_subtract(|region, x, y, width, height| {
        with_state(region, |state: &mut RegionState| {
            state.subtracted.push(Rect { x, y, width, height })
        });
    });
    region.on_destroy_request(|region| {
        let rects = with_state(region, |state: &mut RegionState| (state.added.len(), state.subtracted.len()));
        debug!("region {:?} destroyed (added, subtracted) = {:?}", region.id(), rects);
    });
}

fn serve_shm(shm: &Shm, formats: Rc<Vec<u32>>) {
    for &format in formats.iter() {
        if let Err(e) = shm.format(format) {
            warn!("⚠️ Failed to advertise shm format {:#x}: {}", format, e);
        }
    }
    shm.on_create_pool(move |shm, pool, fd, size| {
        // Received descriptors belong to the handler
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        if size <= 0 {
            let _ = shm.post_error(shm_error::INVALID_STRIDE, &format!("invalid pool size {}", size));
            return;
        }
        debug!("shm pool {:?}: fd {} size {}", pool.id(), fd.as_raw_fd(), size);
        set_state(&pool, PoolState { fd, size });
        serve_pool(&pool, Rc::clone(&formats));
    });
}

fn serve_pool(pool: &ShmPool, formats: Rc<Vec<u32>>) {
    pool.on_create_buffer(move |pool, buffer, offset, width, height, stride, format| {
        if !formats.contains(&format) {
            let _ = pool.post_error(shm_error::INVALID_FORMAT, &format!("unsupported format {:#x}", format));
            return;
        }
        let pool_size = with_state(pool, |state: &mut PoolState| state.size).unwrap_or(0);
        let end = i64::from(offset) + i64::from(stride) * i64::from(height);
        if offset < 0 || width <= 0 || height <= 0 || stride < width || end > i64::from(pool_size) {
            let _ = pool.post_error(
                shm_error::INVALID_STRIDE,
                &format!("invalid buffer {}x{} stride {} at {}", width, height, stride, offset),
            );
            return;
        }
        let state = BufferState {
            offset,
            width,
            height,
            stride,
            format,
        };
        debug!("buffer {:?} created: {}", buffer.id(), state.describe());
        set_state(&buffer, state);
        buffer.on_destroy_request(|buffer: &Buffer| debug!("buffer {:?} destroyed", buffer.id()));
    });
    pool.on_resize(|pool, size| {
        let resized = with_state(pool, |state: &mut PoolState| {
            if size < state.size {
                return Err(state.size);
            }
            state.size = size;
            Ok(state.fd.as_raw_fd())
        });
        match resized {
            Some(Ok(fd)) => debug!("shm pool {:?} (fd {}) resized to {}", pool.id(), fd, size),
            Some(Err(current)) => {
                let _ = pool.post_error(
                    shm_error::INVALID_FD,
                    &format!("shrinking pool from {} to {} is invalid", current, size),
                );
            }
            None => debug!("resize on uninitialized pool {:?}", pool.id()),
        }
    });
    pool.on_destroy_request(|pool| debug!("shm pool {:?} destroyed", pool.id()));
}

fn serve_seat(seat: &Seat, config: &SeatConfig) {
    if let Err(e) = seat.capabilities(config.capability_mask()) {
        warn!("⚠️ Failed to send seat capabilities: {}", e);
    }
    if let Err(e) = seat.name(&config.name) {
        warn!("⚠️ Failed to send seat name: {}", e);
    }
    seat.on_get_pointer(|_, pointer| {
        pointer.on_set_cursor(|pointer, serial, surface, hotspot_x, hotspot_y| {
            debug!(
                "pointer {:?}: cursor {:?} at {},{} (serial {})",
                pointer.id(),
                surface.map(|s| s.id()),
                hotspot_x,
                hotspot_y,
                serial
            );
        });
        pointer.on_release(|pointer| debug!("pointer {:?} released", pointer.id()));
    });
    seat.on_get_keyboard(|_, keyboard| {
        match File::open("/dev/null") {
            Ok(file) => {
                if let Err(e) = keyboard.keymap(keymap_format::NO_KEYMAP, Fd(file.as_raw_fd()), 0) {
                    warn!("⚠️ Failed to send keymap: {}", e);
                }
            }
            Err(e) => warn!("⚠️ Cannot open keymap placeholder: {}", e),
        }
        if let Err(e) = keyboard.repeat_info(25, 600) {
            warn!("⚠️ Failed to send repeat info: {}", e);
        }
        keyboard.on_release(|keyboard| debug!("keyboard {:?} released", keyboard.id()));
    });
    seat.on_get_touch(|_, touch| {
        touch.on_release(|touch| debug!("touch {:?} released", touch.id()));
    });
    seat.on_release(|seat| debug!("seat {:?} released", seat.id()));
}

fn serve_output(output: &Output, config: &OutputConfig) -> wlserver::Result<()> {
    output.geometry(
        config.x,
        config.y,
        config.physical_width,
        config.physical_height,
        output_subpixel::UNKNOWN,
        &config.make,
        &config.model,
        config.transform,
    )?;
    output.mode(
        output_mode::CURRENT | output_mode::PREFERRED,
        config.width,
        config.height,
        config.refresh,
    )?;
    output.scale(config.scale)?;
    output.name("WL-1")?;
    output.description(&format!("{} {}", config.make, config.model))?;
    output.done()?;
    output.on_release(|output| debug!("output {:?} released", output.id()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["wlserver"]).unwrap();
        assert!(!cli.debug);
        assert!(cli.socket.is_none());
        assert_eq!(cli.config, "~/.config/wlserver/wlserver.toml");
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from(["wlserver", "--debug", "--socket", "wayland-9", "-c", "/tmp/x.toml"]).unwrap();
        assert!(cli.debug);
        assert_eq!(cli.socket.as_deref(), Some("wayland-9"));
        assert_eq!(cli.config, "/tmp/x.toml");
    }

    #[test]
    fn test_empty_frame_queue() {
        let frames = FrameQueue::default();
        assert_eq!(fire_frame_callbacks(&frames, 0), 0);
    }

    #[test]
    fn test_buffer_description() {
        let state = BufferState {
            offset: 64,
            width: 16,
            height: 8,
            stride: 64,
            format: shm_format::XRGB8888,
        };
        assert_eq!(state.describe(), "16x8 xrgb8888 (stride 64, offset 64)");
        let odd = BufferState { format: 7, ..state };
        assert!(odd.describe().starts_with("16x8 0x7 "));
    }

    #[test]
    fn test_frame_callbacks_fire_once() {
        let display = Display::new().unwrap();
        let (server_end, _client_end) = std::os::unix::net::UnixStream::pair().unwrap();
        let client = wlserver::Client::new(&display, server_end).unwrap();
        let frames = FrameQueue::default();
        let callback = Callback::create(&client, 1, 0).unwrap();
        frames.borrow_mut().push(callback.clone());

        assert_eq!(fire_frame_callbacks(&frames, 42), 1);
        assert!(callback.is_destroyed());
        assert!(frames.borrow().is_empty());
        assert_eq!(fire_frame_callbacks(&frames, 43), 0);
    }
}
