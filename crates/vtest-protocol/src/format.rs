//! Block layout of pixel formats.
//!
//! Only the geometry needed to size transfers lives here: block dimensions and
//! bytes per block. A full format table belongs to the state tracker; callers
//! that need more formats provide their own [`FormatTable`].

/// Block geometry of a format. Uncompressed formats use 1x1 blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatLayout {
    pub block_width: u32,
    pub block_height: u32,
    pub block_size: u32,
}

impl FormatLayout {
    pub const fn texel(bytes: u32) -> Self {
        Self { block_width: 1, block_height: 1, block_size: bytes }
    }

    pub const fn block(width: u32, height: u32, bytes: u32) -> Self {
        Self { block_width: width, block_height: height, block_size: bytes }
    }

    pub fn nblocksx(&self, width: u32) -> u32 {
        width.div_ceil(self.block_width)
    }

    pub fn nblocksy(&self, height: u32) -> u32 {
        height.div_ceil(self.block_height)
    }

    /// Packed row size for `width` texels, or `None` if it overflows 32 bits.
    pub fn stride(&self, width: u32) -> Option<u32> {
        self.nblocksx(width).checked_mul(self.block_size)
    }

    /// Size of `height` rows laid out at `stride`.
    pub fn size_2d(&self, stride: u32, height: u32) -> Option<u32> {
        self.nblocksy(height).checked_mul(stride)
    }
}

/// Resolves a wire format id to its block layout.
pub trait FormatTable: Send + Sync {
    fn layout(&self, format: u32) -> FormatLayout;
}

pub const B8G8R8A8_UNORM: u32 = 1;
pub const B8G8R8X8_UNORM: u32 = 2;
pub const A8R8G8B8_UNORM: u32 = 3;
pub const X8R8G8B8_UNORM: u32 = 4;
pub const B5G6R5_UNORM: u32 = 7;
pub const Z16_UNORM: u32 = 16;
pub const Z32_FLOAT: u32 = 18;
pub const Z24_UNORM_S8_UINT: u32 = 19;
pub const R32_FLOAT: u32 = 28;
pub const R32G32_FLOAT: u32 = 29;
pub const R32G32B32_FLOAT: u32 = 30;
pub const R32G32B32A32_FLOAT: u32 = 31;
pub const R8_UNORM: u32 = 64;
pub const R8G8_UNORM: u32 = 65;
pub const R8G8B8A8_UNORM: u32 = 67;

/// The formats this client creates itself (buffers, fences, display targets).
/// Anything unknown is treated as a one-byte texel, which is the layout of
/// buffer resources.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicFormats;

impl FormatTable for BasicFormats {
    fn layout(&self, format: u32) -> FormatLayout {
        match format {
            B8G8R8A8_UNORM | B8G8R8X8_UNORM | A8R8G8B8_UNORM | X8R8G8B8_UNORM
            | R8G8B8A8_UNORM | Z24_UNORM_S8_UINT | Z32_FLOAT | R32_FLOAT => FormatLayout::texel(4),
            B5G6R5_UNORM | Z16_UNORM | R8G8_UNORM => FormatLayout::texel(2),
            R32G32_FLOAT => FormatLayout::texel(8),
            R32G32B32_FLOAT => FormatLayout::texel(12),
            R32G32B32A32_FLOAT => FormatLayout::texel(16),
            _ => FormatLayout::texel(1),
        }
    }
}
