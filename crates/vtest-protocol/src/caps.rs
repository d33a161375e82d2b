//! Renderer capability structures exchanged by GET_CAPS / GET_CAPS2.
//!
//! The layouts mirror what the renderer writes on the wire; they are read as
//! raw bytes, so every field is a plain 32-bit value.

use bytemuck::{Pod, Zeroable};

/// Per-format support bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct FormatMask {
    pub bitmask: [u32; 16],
}

impl FormatMask {
    pub fn supports(&self, format: u32) -> bool {
        let word = (format / 32) as usize;
        word < self.bitmask.len() && self.bitmask[word] & (1 << (format % 32)) != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct CapsV1 {
    pub max_version: u32,
    pub sampler: FormatMask,
    pub render: FormatMask,
    pub depthstencil: FormatMask,
    pub vertexbuffer: FormatMask,
    pub bool_set1: u32,
    pub glsl_level: u32,
    pub max_texture_array_layers: u32,
    pub max_streamout_buffers: u32,
    pub max_dual_source_render_targets: u32,
    pub max_render_targets: u32,
    pub max_samples: u32,
    pub prim_mask: u32,
    pub max_tbo_size: u32,
    pub max_uniform_blocks: u32,
    pub max_viewports: u32,
    pub max_texture_gather_components: u32,
}

/// Version 2 capabilities: the v1 block followed by extended limits.
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct CapsV2 {
    pub v1: CapsV1,
    pub min_aliased_point_size: f32,
    pub max_aliased_point_size: f32,
    pub min_smooth_point_size: f32,
    pub max_smooth_point_size: f32,
    pub min_aliased_line_width: f32,
    pub max_aliased_line_width: f32,
    pub min_smooth_line_width: f32,
    pub max_smooth_line_width: f32,
    pub max_texture_lod_bias: f32,
    pub max_geom_output_vertices: u32,
    pub max_geom_total_output_components: u32,
    pub max_vertex_outputs: u32,
    pub max_vertex_attribs: u32,
    pub max_shader_patch_varyings: u32,
    pub min_texel_offset: i32,
    pub max_texel_offset: i32,
    pub min_texture_gather_offset: i32,
    pub max_texture_gather_offset: i32,
    pub texture_buffer_offset_alignment: u32,
    pub uniform_buffer_offset_alignment: u32,
    pub shader_buffer_offset_alignment: u32,
    pub capability_bits: u32,
    pub sample_locations: [u32; 8],
    pub max_vertex_attrib_stride: u32,
    pub max_shader_buffer_frag_compute: u32,
    pub max_shader_buffer_other_stages: u32,
    pub max_shader_image_frag_compute: u32,
    pub max_shader_image_other_stages: u32,
    pub max_image_samples: u32,
    pub max_compute_work_group_invocations: u32,
    pub max_compute_shared_memory_size: u32,
    pub max_compute_grid_size: [u32; 3],
    pub max_compute_block_size: [u32; 3],
    pub max_texture_2d_size: u32,
    pub max_texture_3d_size: u32,
    pub max_texture_cube_size: u32,
    pub max_combined_shader_buffers: u32,
    pub max_atomic_counters: [u32; 6],
    pub max_atomic_counter_buffers: [u32; 6],
    pub max_combined_atomic_counters: u32,
    pub max_combined_atomic_counter_buffers: u32,
    pub host_feature_check_version: u32,
}

pub const CAPS_V1_SIZE: usize = std::mem::size_of::<CapsV1>();
pub const CAPS_V2_SIZE: usize = std::mem::size_of::<CapsV2>();

/// Negotiated capabilities. `version` is the struct revision the renderer
/// answered with; fields it did not send keep their defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Caps {
    pub version: u32,
    pub v2: CapsV2,
}

impl Caps {
    /// Values assumed before (or instead of) negotiation.
    pub fn defaults() -> Self {
        let mut v2 = CapsV2::zeroed();
        v2.min_aliased_point_size = 1.0;
        v2.max_aliased_point_size = 255.0;
        v2.min_smooth_point_size = 1.0;
        v2.max_smooth_point_size = 190.0;
        v2.min_aliased_line_width = 1.0;
        v2.max_aliased_line_width = 255.0;
        v2.min_smooth_line_width = 1.0;
        v2.max_smooth_line_width = 10.0;
        v2.max_texture_lod_bias = 16.0;
        v2.max_geom_output_vertices = 256;
        v2.max_geom_total_output_components = 16384;
        v2.max_vertex_outputs = 32;
        v2.max_vertex_attribs = 16;
        v2.min_texel_offset = -8;
        v2.max_texel_offset = 7;
        v2.min_texture_gather_offset = -8;
        v2.max_texture_gather_offset = 7;
        v2.uniform_buffer_offset_alignment = 256;
        v2.shader_buffer_offset_alignment = 32;
        Self { version: 0, v2 }
    }

    pub fn v1(&self) -> &CapsV1 {
        &self.v2.v1
    }

    /// Raw byte view of the v2 block, used to read the renderer's reply in place.
    pub fn v2_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::bytes_of_mut(&mut self.v2)
    }

    /// Raw byte view of the v1 block.
    pub fn v1_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::bytes_of_mut(&mut self.v2.v1)
    }
}

impl Default for Caps {
    fn default() -> Self {
        Self::defaults()
    }
}
