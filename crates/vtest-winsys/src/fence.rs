//! Fences are tiny CUSTOM-bind buffers; the renderer reports them busy until
//! the commands submitted before them have executed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::trace;
use vtest_protocol::format::R8_UNORM;
use vtest_protocol::{BindFlags, ResourceHandle, TextureTarget};

use crate::error::WinsysError;
use crate::registry::Registry;
use crate::resource::{Resource, ResourceDesc};

pub const FENCE_SIZE: u32 = 8;

/// How long [`wait`] may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeout {
    /// Query once and return the current state.
    Poll,
    /// Block on the renderer until the fence signals.
    Infinite,
    /// Poll until signaled or until the duration elapses.
    Within(Duration),
}

impl WaitTimeout {
    /// Map a nanosecond timeout: 0 polls, `u64::MAX` waits forever.
    pub fn from_nanos(nanos: u64) -> Self {
        match nanos {
            0 => WaitTimeout::Poll,
            u64::MAX => WaitTimeout::Infinite,
            n => WaitTimeout::Within(Duration::from_nanos(n)),
        }
    }
}

/// A fence owns one reference to its resource. Additional owners come from
/// `Winsys::fence_reference`, which retains it.
#[derive(Debug)]
pub struct Fence {
    res: Arc<Resource>,
}

impl Fence {
    pub(crate) fn new(res: Arc<Resource>) -> Self {
        Self { res }
    }

    pub fn resource(&self) -> &Arc<Resource> {
        &self.res
    }

    pub fn handle(&self) -> ResourceHandle {
        self.res.handle()
    }
}

pub(crate) fn fence_desc() -> ResourceDesc {
    ResourceDesc {
        target: TextureTarget::Buffer,
        format: R8_UNORM,
        bind: BindFlags::CUSTOM,
        width: FENCE_SIZE,
        height: 1,
        depth: 1,
        array_size: 0,
        last_level: 0,
        nr_samples: 0,
        size: FENCE_SIZE,
    }
}

/// Wait for `fence`. Returns `Ok(false)` when the timeout elapses first.
pub(crate) fn wait(
    registry: &Registry,
    fence: &Fence,
    timeout: WaitTimeout,
    poll_interval: Duration,
) -> Result<bool, WinsysError> {
    match timeout {
        WaitTimeout::Poll => Ok(!registry.is_busy(&fence.res)?),
        WaitTimeout::Infinite => {
            registry.wait(&fence.res)?;
            Ok(true)
        }
        WaitTimeout::Within(limit) => {
            let start = Instant::now();
            while registry.is_busy(&fence.res)? {
                if start.elapsed() >= limit {
                    trace!(handle = %fence.handle(), ?limit, "fence wait timed out");
                    return Ok(false);
                }
                std::thread::sleep(poll_interval);
            }
            Ok(true)
        }
    }
}
