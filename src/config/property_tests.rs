//! Property-based tests for configuration module
//!
//! These tests use proptest to generate random configurations and verify
//! validation and serialization round-trips.

use super::*;
use proptest::prelude::*;

prop_compose! {
    fn valid_output_config()(
        x in -4096i32..4096,
        y in -4096i32..4096,
        physical_width in 0i32..2000,
        physical_height in 0i32..2000,
        width in 1i32..8192,
        height in 1i32..8192,
        refresh in 0i32..240_000,
        scale in 1i32..4,
        transform in 0i32..=7,
        make in "[A-Za-z]{1,12}",
        model in "[A-Za-z0-9 ]{0,16}",
    ) -> OutputConfig {
        OutputConfig {
            x,
            y,
            physical_width,
            physical_height,
            width,
            height,
            refresh,
            scale,
            transform,
            make,
            model,
        }
    }
}

prop_compose! {
    fn valid_seat_config()(
        name in "[a-z]{1,8}[0-9]?",
        capabilities in proptest::sample::subsequence(vec!["pointer", "keyboard", "touch"], 0..=3),
        hidden in any::<bool>(),
    ) -> SeatConfig {
        SeatConfig {
            name,
            capabilities: capabilities.into_iter().map(String::from).collect(),
            hidden,
        }
    }
}

prop_compose! {
    fn valid_server_config()(
        socket in proptest::option::of("wayland-[a-z0-9]{1,8}"),
        output in valid_output_config(),
        seat in valid_seat_config(),
        extra_format in any::<bool>(),
        dispatch_timeout_ms in -1i32..1000,
        stats_interval_secs in 0u64..3600,
    ) -> ServerConfig {
        let mut shm = ShmConfig::default();
        if extra_format {
            shm.formats.push("rgb565".to_string());
        }
        ServerConfig {
            socket: SocketConfig { name: socket },
            output,
            seat,
            shm,
            event_loop: EventLoopConfig {
                dispatch_timeout_ms,
                stats_interval_secs,
            },
        }
    }
}

proptest! {
    #[test]
    fn generated_configs_validate(config in valid_server_config()) {
        prop_assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_roundtrip_preserves_config(config in valid_server_config()) {
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: ServerConfig = toml::from_str(&text).unwrap();
        prop_assert_eq!(parsed, config);
    }

    #[test]
    fn capability_mask_is_union_of_names(seat in valid_seat_config()) {
        let mask = seat.capability_mask();
        for (name, bit) in [
            ("pointer", seat_capability::POINTER),
            ("keyboard", seat_capability::KEYBOARD),
            ("touch", seat_capability::TOUCH),
        ] {
            let listed = seat.capabilities.iter().any(|c| c == name);
            prop_assert_eq!(mask & bit != 0, listed);
        }
    }

    #[test]
    fn non_positive_mode_is_rejected(width in -100i32..=0, height in 1i32..100) {
        let mut config = ServerConfig::default();
        config.output.width = width;
        config.output.height = height;
        prop_assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_capability_is_rejected(name in "[a-z]{3,10}") {
        prop_assume!(!["pointer", "keyboard", "touch"].contains(&name.as_str()));
        let mut config = ServerConfig::default();
        config.seat.capabilities.push(name);
        prop_assert!(config.validate().is_err());
    }
}
