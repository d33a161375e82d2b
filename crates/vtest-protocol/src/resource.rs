bitflags::bitflags! {
    /// Intended usage of a resource. Values match the virgl bind bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BindFlags: u32 {
        const DEPTH_STENCIL   = 1 << 0;
        const RENDER_TARGET   = 1 << 1;
        const SAMPLER_VIEW    = 1 << 3;
        const VERTEX_BUFFER   = 1 << 4;
        const INDEX_BUFFER    = 1 << 5;
        const CONSTANT_BUFFER = 1 << 6;
        const DISPLAY_TARGET  = 1 << 7;
        const STREAM_OUTPUT   = 1 << 11;
        const SHADER_BUFFER   = 1 << 14;
        const QUERY_BUFFER    = 1 << 15;
        const CURSOR          = 1 << 16;
        const CUSTOM          = 1 << 17;
        const SCANOUT         = 1 << 18;
    }
}

impl BindFlags {
    /// Bind kinds eligible for the delayed-destruction pool.
    /// The match is exact: a combined bind such as `VERTEX_BUFFER | INDEX_BUFFER`
    /// is not cacheable.
    pub fn is_cacheable(self) -> bool {
        self == BindFlags::VERTEX_BUFFER
            || self == BindFlags::INDEX_BUFFER
            || self == BindFlags::CONSTANT_BUFFER
            || self == BindFlags::CUSTOM
    }

    /// Whether the local backing store must be a display target.
    pub fn needs_display_target(self) -> bool {
        self.intersects(BindFlags::DISPLAY_TARGET | BindFlags::SCANOUT)
    }
}

/// Resource dimensionality, numbered as the remote renderer expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum TextureTarget {
    #[default]
    Buffer = 0,
    Texture1D = 1,
    Texture2D = 2,
    Texture3D = 3,
    TextureCube = 4,
    TextureRect = 5,
    Texture1DArray = 6,
    Texture2DArray = 7,
    TextureCubeArray = 8,
}

/// A sub-resource region: origin plus extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipeBox {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl PipeBox {
    pub fn new(x: u32, y: u32, z: u32, width: u32, height: u32, depth: u32) -> Self {
        Self { x, y, z, width, height, depth }
    }

    /// A 2D region of one slice at the origin.
    pub fn extent_2d(width: u32, height: u32) -> Self {
        Self::new(0, 0, 0, width, height, 1)
    }
}
