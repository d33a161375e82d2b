//! Integration test: handshake and capability negotiation

mod common;

use std::path::PathBuf;

use common::{connect, test_config, v2_size, CapsMode, FakeServer};
use vtest_protocol::{BindFlags, Caps, CommandId};
use vtest_winsys::{ResourceDesc, Winsys, WinsysError};

#[test]
fn test_create_renderer_counts_bytes() {
    let server = FakeServer::new(CapsMode::V2 { extra: 0 });
    let _ws = Winsys::with_transport(server.transport(), &test_config(), None).unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].id, CommandId::CreateRenderer as u32);
    assert_eq!(requests[0].len, "winsys-tests".len() as u32 + 1);
    assert_eq!(requests[0].data, b"winsys-tests\0");

    // Both capability requests, v2 first.
    let ids: Vec<u32> = requests[1..].iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![CommandId::GetCaps2 as u32, CommandId::GetCaps as u32]);
}

#[test]
fn test_long_names_are_truncated() {
    let server = FakeServer::new(CapsMode::V2 { extra: 0 });
    let mut config = test_config();
    config.client.name = Some("x".repeat(100));
    let ws = Winsys::with_transport(server.transport(), &config, None).unwrap();

    assert_eq!(ws.client_name(), "x".repeat(63));
    let create = &server.requests_of(CommandId::CreateRenderer)[0];
    assert_eq!(create.len, 64);
    assert_eq!(create.data.len(), 64);
    assert_eq!(create.data.last(), Some(&0));
    assert_eq!(&create.data[..63], ws.client_name().as_bytes());
}

#[test]
fn test_caps_v2_with_trailing_fields() {
    let server = FakeServer::new(CapsMode::V2 { extra: 24 });
    let ws = connect(&server);

    let caps = ws.caps();
    assert_eq!(caps.version, 2);
    assert_eq!(caps.v2.max_texture_2d_size, 16384);
    assert_eq!(caps.v1().glsl_level, 430);
    assert_eq!(*caps, {
        let mut expected = server.caps();
        expected.version = 2;
        expected
    });

    // The v1 reply and the unknown tail were drained; the next exchange is aligned.
    let res = ws
        .resource_create(ResourceDesc::buffer(BindFlags::VERTEX_BUFFER, 16))
        .unwrap();
    assert!(!ws.resource_is_busy(&res).unwrap());
    assert!(v2_size() > 0);
}

#[test]
fn test_caps_v1_only_server() {
    let server = FakeServer::new(CapsMode::V1);
    let ws = connect(&server);

    let caps = ws.caps();
    assert_eq!(caps.version, 1);
    assert_eq!(caps.v1().glsl_level, 430);
    // Fields beyond v1 keep their defaults.
    assert_eq!(caps.v2.max_texture_2d_size, Caps::defaults().v2.max_texture_2d_size);
    assert_eq!(caps.v2.max_aliased_point_size, 255.0);
}

#[test]
fn test_silent_server_gives_default_caps() {
    let server = FakeServer::new(CapsMode::Silent);
    let ws = connect(&server);
    assert_eq!(*ws.caps(), Caps::defaults());
}

#[test]
fn test_lost_connection_is_typed() {
    let server = FakeServer::new(CapsMode::V2 { extra: 0 });
    let ws = connect(&server);
    let res = ws
        .resource_create(ResourceDesc::buffer(BindFlags::VERTEX_BUFFER, 16))
        .unwrap();

    server.hang_up();
    let err = ws
        .resource_create(ResourceDesc::buffer(BindFlags::INDEX_BUFFER, 16))
        .unwrap_err();
    assert!(err.is_connection_lost(), "got {:?}", err);
    let err = ws.resource_is_busy(&res).unwrap_err();
    assert!(err.is_connection_lost(), "got {:?}", err);
}

#[test]
fn test_invalid_config_is_rejected() {
    let server = FakeServer::new(CapsMode::V2 { extra: 0 });
    let mut config = test_config();
    config.client.name = Some(String::new());
    let err = Winsys::with_transport(server.transport(), &config, None).err().unwrap();
    assert!(matches!(err, WinsysError::Config(_)));
    assert!(server.requests().is_empty());
}

#[test]
fn test_ring_without_provider_fails_before_connecting() {
    let mut config = test_config();
    config.transport.socket = "/nonexistent/vtest.sock".to_string();
    config.transport.ring = Some(PathBuf::from("/dev/shm"));

    let err = Winsys::connect(&config).err().unwrap();
    assert!(matches!(err, WinsysError::RingUnavailable(ref dir) if dir == &PathBuf::from("/dev/shm")));
}

#[test]
fn test_unreachable_renderer() {
    let mut config = test_config();
    config.transport.socket = "/nonexistent/vtest.sock".to_string();
    config.transport.connect_retries = 1;
    config.transport.retry_delay_ms = 1;

    let err = Winsys::connect(&config).err().unwrap();
    assert!(matches!(err, WinsysError::Transport(_)), "got {:?}", err);
}
