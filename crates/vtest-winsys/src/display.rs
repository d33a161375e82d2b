//! Display targets and the window-system boundary.
//!
//! The renderer knows display targets by a small id (0..32). Pixels for local
//! presentation live in a software target owned by a [`DisplayBackend`];
//! window geometry and visibility come from a [`FrontbufferPresenter`].

use parking_lot::Mutex;
use vtest_protocol::{BindFlags, PipeBox};

use crate::error::WinsysError;

/// Number of display targets the renderer can track at once.
pub const MAX_DISPLAY_TARGETS: u32 = 32;

/// Row alignment requested from the software backend.
pub const DISPLAY_TARGET_ALIGNMENT: u32 = 64;

/// Pixel storage of one display target, provided by the software backend.
pub trait SoftwareTarget: Send {
    fn begin_map(&mut self) {}

    fn end_map(&mut self) {}

    fn pixels(&self) -> &[u8];

    fn pixels_mut(&mut self) -> &mut [u8];
}

/// Software rasterizer side of display targets.
pub trait DisplayBackend: Send + Sync {
    /// Allocate storage for a `width`x`height` target. Returns the target and
    /// its row stride in bytes.
    fn create_target(
        &self,
        bind: BindFlags,
        format: u32,
        width: u32,
        height: u32,
        alignment: u32,
    ) -> Result<(Box<dyn SoftwareTarget>, u32), WinsysError>;
}

/// Window rectangle in root-window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Resolved window state at flush time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontGeometry {
    pub rect: Rect,
    pub visible: bool,
}

/// The window-system collaborator for front-buffer flushes.
pub trait FrontbufferPresenter {
    /// Identifier of the destination drawable, forwarded to the renderer.
    fn drawable(&self) -> u32;

    /// Current window rectangle and whether the renderer can draw into it directly.
    fn sync_geometry(&mut self) -> FrontGeometry;

    /// Show `region` of a locally read-back frame.
    fn present(&mut self, region: &PipeBox, pixels: &[u8], stride: u32);
}

/// What the renderer was last told about a target's window.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FrontState {
    pub rect: Option<Rect>,
    pub visible: bool,
    /// Set once a frame has been presented locally.
    pub drawable: Option<u32>,
}

pub struct DisplayTarget {
    pub(crate) id: u32,
    pub(crate) target: Box<dyn SoftwareTarget>,
    pub(crate) front: FrontState,
}

impl DisplayTarget {
    pub(crate) fn new(id: u32, target: Box<dyn SoftwareTarget>) -> Self {
        Self {
            id,
            target,
            front: FrontState::default(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

/// Bitmask of display target ids in use.
#[derive(Default)]
pub(crate) struct DisplayIds {
    in_use: Mutex<u32>,
}

impl DisplayIds {
    /// Claim the lowest free id.
    pub fn alloc(&self) -> Option<u32> {
        let mut mask = self.in_use.lock();
        let id = (!*mask).trailing_zeros();
        if id >= MAX_DISPLAY_TARGETS {
            return None;
        }
        *mask |= 1 << id;
        Some(id)
    }

    pub fn free(&self, id: u32) {
        if id < MAX_DISPLAY_TARGETS {
            *self.in_use.lock() &= !(1 << id);
        }
    }

    pub fn in_use(&self) -> u32 {
        self.in_use.lock().count_ones()
    }
}

/// Clamp a window rectangle to what DT_COMMAND can carry: negative origins
/// collapse to 0 and an empty size falls back to the flushed region.
pub(crate) fn normalize_rect(rect: Rect, fallback: &PipeBox) -> Rect {
    let mut out = rect;
    if out.x < 0 || out.y < 0 {
        out.x = 0;
        out.y = 0;
    }
    if out.width == 0 || out.height == 0 {
        out.width = fallback.width;
        out.height = fallback.height;
    }
    out
}
