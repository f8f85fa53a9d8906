// Property-based tests
//
// Signature-driven argument handling over every core message, values
// surviving the trip through a real socket, and handle reference counts.

mod common;

use common::*;
use proptest::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

use wlserver::protocol::interfaces::{core_interfaces, wl_compositor, wl_region, wl_seat};
use wlserver::protocol::{Compositor, ProtocolObject, Region, Seat};
use wlserver::server::argument::encode_arguments;
use wlserver::server::{Argument, Array, Display, Error, Global, Resource};
use wlserver::sys::{ArgSpec, Message};

fn all_messages() -> Vec<Message> {
    core_interfaces()
        .into_iter()
        .flat_map(|iface| iface.requests().chain(iface.events()))
        .collect()
}

/// Object slots that a null handle cannot fill.
fn needs_object(spec: &ArgSpec) -> bool {
    matches!(spec.kind, 'o' | 'n') && !spec.nullable
}

/// One argument of the kind `kind` asks for, built from generated values.
fn argument_for(kind: char, int: i32, text: &str) -> Argument {
    match kind {
        'i' => Argument::Int(int),
        'h' => Argument::Fd(int),
        'u' => Argument::Uint(int as u32),
        'f' => Argument::from(f64::from(int) / 256.0),
        's' => Argument::Str(text.to_string()),
        'a' => Argument::Array(Array::new(text.as_bytes().to_vec())),
        _ => Argument::Resource(Resource::null()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn encoded_slots_follow_the_signature(
        message in proptest::sample::select(all_messages()),
        int in any::<i32>(),
        text in "[a-z]{0,16}",
    ) {
        let args: Vec<Argument> = message
            .args()
            .map(|spec| argument_for(spec.kind, int, &text))
            .collect();
        let result = encode_arguments(message, &args);
        if let Some(index) = message.args().position(|spec| needs_object(&spec)) {
            let is_null_error = matches!(
                result,
                Err(Error::NullArgument { index: found, .. }) if found == index
            );
            prop_assert!(is_null_error);
            return Ok(());
        }
        let encoded = result.unwrap();
        prop_assert_eq!(encoded.slots.len(), message.arg_count());
        let strings = message.args().filter(|spec| spec.kind == 's').count();
        prop_assert_eq!(encoded.string_count(), strings);
        let arrays = message.args().filter(|spec| spec.kind == 'a').count();
        prop_assert_eq!(encoded.array_count(), arrays);
    }

    #[test]
    fn wrong_argument_count_is_rejected(
        message in proptest::sample::select(all_messages()),
        extra in 1usize..4,
    ) {
        let args = vec![Argument::Uint(0); message.arg_count() + extra];
        let is_count_error = matches!(
            encode_arguments(message, &args),
            Err(Error::ArgumentCount { .. })
        );
        prop_assert!(is_count_error);
    }

    #[test]
    fn mismatched_kind_is_rejected(
        message in proptest::sample::select(all_messages()),
        pick in any::<proptest::sample::Index>(),
    ) {
        prop_assume!(message.arg_count() > 0);
        let target = pick.index(message.arg_count());
        prop_assume!(!message.args().take(target).any(|spec| needs_object(&spec)));
        let args: Vec<Argument> = message
            .args()
            .enumerate()
            .map(|(i, spec)| {
                let arg = argument_for(spec.kind, 1, "x");
                if i != target {
                    return arg;
                }
                // Any variant the slot cannot take.
                match spec.kind {
                    's' => Argument::Uint(1),
                    _ => Argument::Str("x".to_string()),
                }
            })
            .collect();
        let is_mismatch = matches!(
            encode_arguments(message, &args),
            Err(Error::ArgumentMismatch { index, .. }) if index == target
        );
        prop_assert!(is_mismatch);
    }
}

/// A display with one bound compositor and one region, ready for requests.
fn region_session() -> (Display, Global, TestClient, u32, Rc<RefCell<Vec<Region>>>) {
    let display = Display::new().unwrap();
    let global = Global::new(&display, wl_compositor(), 4).unwrap();
    let regions = Rc::new(RefCell::new(Vec::new()));
    let record = Rc::clone(&regions);
    global
        .on_bind(move |_, resource| {
            let compositor = Compositor::from_resource(resource).unwrap();
            let record = Rc::clone(&record);
            compositor.on_create_region(move |_, region| record.borrow_mut().push(region));
        })
        .unwrap();
    let (_client, mut peer) = TestClient::connect(&display);
    let (registry, advertised) = discover(&display, &mut peer);
    let compositor = peer.bind(registry, global_name(&advertised, "wl_compositor"), "wl_compositor", 4);
    let region = peer.new_id();
    peer.send(compositor, 1, &[Arg::NewId(region)]);
    roundtrip(&display, &mut peer);
    (display, global, peer, region, regions)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn request_values_reach_the_handler_unchanged(
        rects in proptest::collection::vec((any::<i32>(), any::<i32>(), any::<i32>(), any::<i32>()), 1..8),
    ) {
        let (display, _global, mut peer, region_id, regions) = region_session();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let record = Rc::clone(&seen);
        regions.borrow()[0].on_add(move |_, x, y, w, h| record.borrow_mut().push((x, y, w, h)));
        prop_assert_eq!(regions.borrow()[0].interface().unwrap(), wl_region());

        for &(x, y, w, h) in &rects {
            peer.send(region_id, 1, &[Arg::Int(x), Arg::Int(y), Arg::Int(w), Arg::Int(h)]);
        }
        roundtrip(&display, &mut peer);
        prop_assert_eq!(seen.borrow().clone(), rects);
    }

    #[test]
    fn event_strings_reach_the_client_unchanged(name in "[ -~]{0,200}") {
        let display = Display::new().unwrap();
        let global = Global::new(&display, wl_seat(), 7).unwrap();
        let sent = name.clone();
        global
            .on_bind(move |_, resource| {
                let seat = Seat::from_resource(resource).unwrap();
                seat.name(&sent).unwrap();
            })
            .unwrap();
        let (_client, mut peer) = TestClient::connect(&display);
        let (registry, advertised) = discover(&display, &mut peer);
        let seat = peer.bind(registry, global_name(&advertised, "wl_seat"), "wl_seat", 7);
        let messages = roundtrip(&display, &mut peer);

        let event = messages.iter().find(|m| m.object == seat && m.opcode == 1).unwrap();
        prop_assert_eq!(event.reader().string(), Some(name));
    }

    #[test]
    fn reference_count_tracks_live_handles(clones in 0usize..12, drops in 0usize..16) {
        let (_display, _global, _peer, _region_id, regions) = region_session();
        let original: Resource = regions.borrow()[0].resource().clone();
        // The wrapper collected by the session holds one more handle.
        regions.borrow_mut().clear();

        let mut handles = vec![original];
        for _ in 0..clones {
            let copy = handles[0].clone();
            handles.push(copy);
        }
        let drops = drops.min(handles.len());
        let observer_ptr = handles[0].as_ptr();
        handles.truncate(handles.len() - drops);

        let expected = (1 + clones).saturating_sub(drops);
        prop_assert_eq!(handles.len(), expected);
        if let Some(handle) = handles.first() {
            prop_assert_eq!(handle.ref_count(), expected);
        } else {
            // The native side still owns the resource; a fresh handle
            // starts counting from one again.
            let fresh = unsafe { Resource::from_raw(observer_ptr) };
            prop_assert_eq!(fresh.ref_count(), 1);
        }
    }
}
