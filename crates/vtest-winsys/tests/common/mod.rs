//! In-process stand-in for a vtest renderer.
//!
//! `FakeServer` implements `Transport`: every write is parsed into requests
//! as soon as it is complete, and replies are queued for the following reads.
//! Clones share state, so a test keeps one handle while the winsys owns the
//! other.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use vtest_core::VtestConfig;
use vtest_protocol::caps::{CAPS_V1_SIZE, CAPS_V2_SIZE};
use vtest_protocol::{BindFlags, Caps, CommandId, PipeBox};
use vtest_transport::{Transport, TransportError};
use vtest_winsys::{
    DisplayBackend, FrontGeometry, FrontbufferPresenter, Rect, SoftwareTarget, Winsys, WinsysError,
};

/// How the renderer answers the capability requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapsMode {
    /// Answers GET_CAPS2 with `extra` unknown trailing bytes, then GET_CAPS.
    V2 { extra: usize },
    /// Ignores GET_CAPS2 and answers GET_CAPS only.
    V1,
    /// Hangs up without answering.
    Silent,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub id: u32,
    pub len: u32,
    pub payload: Vec<u32>,
    /// Raw bytes following the payload (TRANSFER_PUT data, CREATE_RENDERER name).
    pub data: Vec<u8>,
}

struct ServerState {
    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
    requests: Vec<Request>,
    caps_mode: CapsMode,
    caps: Caps,
    /// Remaining busy answers per handle.
    busy: HashMap<u32, u32>,
    /// Bytes last uploaded per handle, as they travelled on the wire.
    storage: HashMap<u32, Vec<u8>>,
    hung_up: bool,
    /// Command whose next request fails to send.
    reject: Option<CommandId>,
    sync_calls: usize,
}

#[derive(Clone)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new(caps_mode: CapsMode) -> Self {
        let mut caps = Caps::defaults();
        caps.v2.v1.max_version = 2;
        caps.v2.v1.glsl_level = 430;
        caps.v2.max_texture_2d_size = 16384;
        Self {
            state: Arc::new(Mutex::new(ServerState {
                inbox: Vec::new(),
                outbox: VecDeque::new(),
                requests: Vec::new(),
                caps_mode,
                caps,
                busy: HashMap::new(),
                storage: HashMap::new(),
                hung_up: false,
                reject: None,
                sync_calls: 0,
            })),
        }
    }

    pub fn transport(&self) -> Box<dyn Transport> {
        Box::new(self.clone())
    }

    /// Capabilities the server reports.
    pub fn caps(&self) -> Caps {
        self.state.lock().caps
    }

    /// Report `handle` busy for the next `polls` non-blocking queries.
    pub fn set_busy(&self, handle: u32, polls: u32) {
        self.state.lock().busy.insert(handle, polls);
    }

    pub fn set_contents(&self, handle: u32, bytes: Vec<u8>) {
        self.state.lock().storage.insert(handle, bytes);
    }

    pub fn contents(&self, handle: u32) -> Option<Vec<u8>> {
        self.state.lock().storage.get(&handle).cloned()
    }

    pub fn hang_up(&self) {
        self.state.lock().hung_up = true;
    }

    /// Fail the next write that starts a request of `id`, without hanging up.
    pub fn reject_next(&self, id: CommandId) {
        self.state.lock().reject = Some(id);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().requests.clone()
    }

    pub fn requests_of(&self, id: CommandId) -> Vec<Request> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.id == id as u32)
            .cloned()
            .collect()
    }

    pub fn count(&self, id: CommandId) -> usize {
        self.requests_of(id).len()
    }

    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    pub fn sync_calls(&self) -> usize {
        self.state.lock().sync_calls
    }
}

impl ServerState {
    fn word(&self, index: usize) -> Option<u32> {
        let at = index * 4;
        self.inbox
            .get(at..at + 4)
            .map(|b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn reply_words(&mut self, words: &[u32]) {
        for w in words {
            self.outbox.extend(w.to_ne_bytes());
        }
    }

    /// Parse and answer every complete request in the inbox.
    fn process(&mut self) {
        while let (Some(len), Some(id)) = (self.word(0), self.word(1)) {
            let (payload_words, data_len) = match CommandId::from_raw(id) {
                Some(CommandId::CreateRenderer) => (0, len as usize),
                Some(CommandId::TransferPut) => match self.word(2 + 10) {
                    Some(data_size) => (11, data_size as usize),
                    None => return,
                },
                Some(CommandId::GetCaps) | Some(CommandId::GetCaps2) => (0, 0),
                _ => (len as usize, 0),
            };
            let total = 8 + payload_words * 4 + data_len;
            if self.inbox.len() < total {
                return;
            }
            let payload = (0..payload_words)
                .map(|i| self.word(2 + i).unwrap_or_default())
                .collect();
            let data = self.inbox[8 + payload_words * 4..total].to_vec();
            self.inbox.drain(..total);

            let req = Request { id, len, payload, data };
            self.answer(&req);
            self.requests.push(req);
        }
    }

    fn answer(&mut self, req: &Request) {
        match CommandId::from_raw(req.id) {
            Some(CommandId::GetCaps2) => {
                if let CapsMode::V2 { extra } = self.caps_mode {
                    let mut caps = self.caps;
                    let mut body = caps.v2_bytes_mut().to_vec();
                    body.extend(std::iter::repeat(0xAB).take(extra));
                    self.reply_words(&[body.len() as u32 + 1, 2]);
                    self.outbox.extend(body);
                }
            }
            Some(CommandId::GetCaps) => {
                if self.caps_mode != CapsMode::Silent {
                    let mut caps = self.caps;
                    let body = caps.v1_bytes_mut().to_vec();
                    debug_assert_eq!(body.len(), CAPS_V1_SIZE);
                    self.reply_words(&[CAPS_V1_SIZE as u32 + 1, 1]);
                    self.outbox.extend(body);
                } else {
                    self.hung_up = true;
                }
            }
            Some(CommandId::ResourceBusyWait) => {
                let (handle, flags) = (req.payload[0], req.payload[1]);
                let remaining = self.busy.entry(handle).or_insert(0);
                let busy = if flags & 1 != 0 {
                    *remaining = 0;
                    false
                } else if *remaining > 0 {
                    *remaining -= 1;
                    true
                } else {
                    false
                };
                self.reply_words(&[1, CommandId::ResourceBusyWait as u32, u32::from(busy)]);
            }
            Some(CommandId::TransferPut) => {
                self.storage.insert(req.payload[0], req.data.clone());
            }
            Some(CommandId::TransferGet) => {
                let (handle, size) = (req.payload[0], req.payload[10] as usize);
                let mut bytes = self.storage.get(&handle).cloned().unwrap_or_default();
                bytes.resize(size, 0xEE);
                self.outbox.extend(bytes);
            }
            _ => {}
        }
    }
}

impl Transport for FakeServer {
    fn write_exact(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.hung_up {
            return Err(TransportError::Io(std::io::ErrorKind::BrokenPipe.into()));
        }
        if let Some(id) = state.reject {
            let starts = state.inbox.is_empty()
                && buf.len() >= 8
                && u32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]) == id as u32;
            if starts {
                state.reject = None;
                return Err(TransportError::Io(std::io::Error::other("request rejected")));
            }
        }
        state.inbox.extend_from_slice(buf);
        state.process();
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.outbox.len() < buf.len() {
            state.outbox.clear();
            return Err(TransportError::Disconnected);
        }
        let n = buf.len();
        for (dst, src) in buf.iter_mut().zip(state.outbox.drain(..n)) {
            *dst = src;
        }
        Ok(())
    }

    fn sync_after_read(&mut self) -> Result<(), TransportError> {
        self.state.lock().sync_calls += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "fake-server".to_string()
    }
}

pub fn test_config() -> VtestConfig {
    let mut config = VtestConfig::default();
    config.client.name = Some("winsys-tests".to_string());
    config.fence.poll_interval_us = 100;
    config
}

pub fn connect(server: &FakeServer) -> Winsys {
    connect_with(server, test_config())
}

pub fn connect_with(server: &FakeServer, config: VtestConfig) -> Winsys {
    let ws = Winsys::with_transport(server.transport(), &config, None).unwrap();
    server.clear_requests();
    ws
}

/// Bytes per pixel of every target the fake backend creates.
pub const FAKE_BPP: u32 = 4;

pub struct FakeTarget {
    pixels: Vec<u8>,
    maps: Arc<Mutex<(usize, usize)>>,
}

impl SoftwareTarget for FakeTarget {
    fn begin_map(&mut self) {
        self.maps.lock().0 += 1;
    }

    fn end_map(&mut self) {
        self.maps.lock().1 += 1;
    }

    fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }
}

#[derive(Default)]
pub struct FakeBackend {
    /// Begin/end map calls across all targets.
    pub maps: Arc<Mutex<(usize, usize)>>,
    pub created: Mutex<Vec<(BindFlags, u32, u32)>>,
}

impl DisplayBackend for FakeBackend {
    fn create_target(
        &self,
        bind: BindFlags,
        _format: u32,
        width: u32,
        height: u32,
        alignment: u32,
    ) -> Result<(Box<dyn SoftwareTarget>, u32), WinsysError> {
        let stride = (width * FAKE_BPP).next_multiple_of(alignment);
        self.created.lock().push((bind, width, height));
        let target = FakeTarget {
            pixels: vec![0; (stride * height) as usize],
            maps: Arc::clone(&self.maps),
        };
        Ok((Box::new(target), stride))
    }
}

pub struct FakePresenter {
    pub drawable: u32,
    pub geometry: FrontGeometry,
    pub presented: Vec<(PipeBox, Vec<u8>, u32)>,
}

impl FakePresenter {
    pub fn new(drawable: u32, visible: bool) -> Self {
        Self {
            drawable,
            geometry: FrontGeometry {
                rect: Rect { x: 10, y: 20, width: 64, height: 32 },
                visible,
            },
            presented: Vec::new(),
        }
    }
}

impl FrontbufferPresenter for FakePresenter {
    fn drawable(&self) -> u32 {
        self.drawable
    }

    fn sync_geometry(&mut self) -> FrontGeometry {
        self.geometry
    }

    fn present(&mut self, region: &PipeBox, pixels: &[u8], stride: u32) {
        self.presented.push((*region, pixels.to_vec(), stride));
    }
}

pub fn v2_size() -> usize {
    CAPS_V2_SIZE
}
