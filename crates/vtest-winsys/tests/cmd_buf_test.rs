//! Integration test: command buffers
//!
//! Covers word growth, resource deduplication, and reference release on
//! submit (including a failed submit) and on drop.

mod common;

use std::sync::Arc;

use common::{connect, CapsMode, FakeServer};
use vtest_protocol::{BindFlags, CommandId};
use vtest_winsys::{Resource, ResourceDesc, Winsys};

fn buffer(ws: &Winsys, bind: BindFlags) -> Arc<Resource> {
    ws.resource_create(ResourceDesc::buffer(bind, 256)).unwrap()
}

#[test]
fn test_repeated_references_are_deduplicated() {
    let server = FakeServer::new(CapsMode::V2 { extra: 0 });
    let ws = connect(&server);
    let res = buffer(&ws, BindFlags::VERTEX_BUFFER);

    let mut cbuf = ws.cmd_buf_create().unwrap();
    for _ in 0..5 {
        ws.emit_res(&mut cbuf, &res, true).unwrap();
    }
    assert_eq!(cbuf.len(), 5);
    assert_eq!(cbuf.resource_count(), 1);
    assert_eq!(res.refcount(), 2);
    assert!(ws.res_is_referenced(&res));
    assert!(cbuf.lookup(&res));

    ws.submit_cmd(&mut cbuf).unwrap();
    let submits = server.requests_of(CommandId::SubmitCmd);
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].len, 5);
    assert_eq!(submits[0].payload, vec![res.handle().raw(); 5]);

    assert!(cbuf.is_empty());
    assert_eq!(cbuf.resource_count(), 0);
    assert!(!ws.res_is_referenced(&res));
    assert_eq!(res.refcount(), 1);
    assert!(!cbuf.lookup(&res));
}

#[test]
fn test_reference_without_handle_word() {
    let server = FakeServer::new(CapsMode::V2 { extra: 0 });
    let ws = connect(&server);
    let res = buffer(&ws, BindFlags::CONSTANT_BUFFER);

    let mut cbuf = ws.cmd_buf_create().unwrap();
    ws.emit_res(&mut cbuf, &res, false).unwrap();
    assert!(cbuf.is_empty());
    assert_eq!(cbuf.resource_count(), 1);
    assert!(res.is_referenced());
}

#[test]
fn test_lookup_has_no_false_negatives() {
    let server = FakeServer::new(CapsMode::V2 { extra: 0 });
    let ws = connect(&server);

    // 600 handles overflow both the lookaside table and the initial
    // resource list, so slots collide (1 and 513, ...).
    let resources: Vec<_> = (0..600)
        .map(|_| buffer(&ws, BindFlags::SHADER_BUFFER))
        .collect();

    let mut cbuf = ws.cmd_buf_create().unwrap();
    for (i, res) in resources.iter().enumerate() {
        for earlier in &resources[..i] {
            if earlier.handle().raw() % 512 == res.handle().raw() % 512 {
                assert!(cbuf.lookup(earlier));
            }
        }
        assert!(!cbuf.lookup(res));
        ws.emit_res(&mut cbuf, res, true).unwrap();
        assert!(cbuf.lookup(res));
    }
    for res in &resources {
        ws.emit_res(&mut cbuf, res, true).unwrap();
    }
    assert_eq!(cbuf.resource_count(), 600);
    assert_eq!(cbuf.len(), 1200);
    assert!(resources.iter().all(|r| r.refcount() == 2));
}

#[test]
fn test_words_grow_past_initial_capacity() {
    let server = FakeServer::new(CapsMode::V2 { extra: 0 });
    let ws = connect(&server);

    let mut cbuf = ws.cmd_buf_create().unwrap();
    let words: Vec<u32> = (0..2000).collect();
    cbuf.append_words(&words).unwrap();
    assert_eq!(cbuf.words(), &words[..]);

    ws.submit_cmd(&mut cbuf).unwrap();
    let submit = &server.requests_of(CommandId::SubmitCmd)[0];
    assert_eq!(submit.len, 2000);
    assert_eq!(submit.payload, words);
}

#[test]
fn test_empty_submit_sends_nothing() {
    let server = FakeServer::new(CapsMode::V2 { extra: 0 });
    let ws = connect(&server);

    let mut cbuf = ws.cmd_buf_create().unwrap();
    ws.submit_cmd(&mut cbuf).unwrap();
    assert_eq!(server.count(CommandId::SubmitCmd), 0);
}

#[test]
fn test_failed_submit_still_releases() {
    let server = FakeServer::new(CapsMode::V2 { extra: 0 });
    let ws = connect(&server);
    let res = buffer(&ws, BindFlags::VERTEX_BUFFER);

    let mut cbuf = ws.cmd_buf_create().unwrap();
    ws.emit_res(&mut cbuf, &res, true).unwrap();
    ws.resource_unref(&res).unwrap();
    assert_eq!(res.refcount(), 1);

    server.hang_up();
    let err = ws.submit_cmd(&mut cbuf).unwrap_err();
    assert!(err.is_connection_lost(), "got {:?}", err);

    assert!(cbuf.is_empty());
    assert_eq!(res.refcount(), 0);
    assert!(!res.is_referenced());
    assert!(ws.registry().is_cached(res.handle()));
}

#[test]
fn test_drop_releases_references() {
    let server = FakeServer::new(CapsMode::V2 { extra: 0 });
    let ws = connect(&server);
    let res = buffer(&ws, BindFlags::INDEX_BUFFER);

    {
        let mut cbuf = ws.cmd_buf_create().unwrap();
        ws.emit_res(&mut cbuf, &res, true).unwrap();
        assert_eq!(res.refcount(), 2);
    }
    assert_eq!(res.refcount(), 1);
    assert!(!res.is_referenced());
    assert_eq!(server.count(CommandId::SubmitCmd), 0);
}

#[test]
fn test_vertex_buffer_lives_until_submit() {
    let server = FakeServer::new(CapsMode::V2 { extra: 0 });
    let ws = connect(&server);
    let vb = buffer(&ws, BindFlags::VERTEX_BUFFER);

    let mut cbuf = ws.cmd_buf_create().unwrap();
    cbuf.append_word(0x0001_0203).unwrap();
    ws.emit_res(&mut cbuf, &vb, true).unwrap();

    ws.resource_unref(&vb).unwrap();
    assert!(ws.res_is_referenced(&vb));
    assert!(!ws.registry().is_cached(vb.handle()));
    assert_eq!(server.count(CommandId::ResourceUnref), 0);

    ws.submit_cmd(&mut cbuf).unwrap();
    assert!(!ws.res_is_referenced(&vb));
    assert_eq!(vb.refcount(), 0);
    assert!(ws.registry().is_cached(vb.handle()));
    assert_eq!(server.count(CommandId::ResourceUnref), 0);

    // The submitted batch arrives before anything can reuse the buffer.
    let order: Vec<u32> = server.requests().iter().map(|r| r.id).collect();
    assert_eq!(order, vec![CommandId::ResourceCreate as u32, CommandId::SubmitCmd as u32]);
}
