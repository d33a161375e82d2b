//! Sub-resource transfers between mapped client memory and the renderer.

use tracing::debug;
use vtest_protocol::{FormatLayout, PipeBox, TransferCommand};

use crate::connection::Connection;
use crate::error::WinsysError;
use crate::resource::Resource;

/// Byte geometry of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRegion {
    /// Distance between rows, locally and on the wire.
    pub valid_stride: u32,
    /// Distance between layers/slices.
    pub valid_layer_stride: u32,
    /// Bytes on the wire: `valid_layer_stride * depth`.
    pub total_bytes: u32,
    /// Block rows per layer.
    pub rows: u32,
    pub layers: u32,
    /// Meaningful bytes at the start of each row; the rest is padding.
    pub packed_row: u32,
}

impl TransferRegion {
    /// Bytes of local memory touched, from the first row to the end of the
    /// packed part of the last row.
    pub fn required_len(&self) -> usize {
        if self.rows == 0 || self.layers == 0 {
            return 0;
        }
        (self.layers as usize - 1) * self.valid_layer_stride as usize
            + (self.rows as usize - 1) * self.valid_stride as usize
            + self.packed_row as usize
    }
}

/// Compute the row stride and byte size of `region`.
///
/// A caller-supplied stride only applies when the region spans more than one
/// row (a single row has no stride beyond its packed width); the same rule
/// holds for the layer stride and more than one layer.
pub fn compute_region(
    layout: FormatLayout,
    region: &PipeBox,
    stride: u32,
    layer_stride: u32,
) -> Result<TransferRegion, WinsysError> {
    let packed_row = layout
        .stride(region.width)
        .ok_or_else(|| overflow("row size", region))?;
    let rows = layout.nblocksy(region.height);

    let valid_stride = if stride != 0 && region.height > 1 {
        if stride < packed_row {
            return Err(WinsysError::InvalidRegion(format!(
                "stride {} is smaller than a packed row of {} bytes",
                stride, packed_row
            )));
        }
        stride
    } else {
        packed_row
    };

    let packed_layer = rows
        .checked_mul(valid_stride)
        .ok_or_else(|| overflow("layer size", region))?;
    let valid_layer_stride = if layer_stride != 0 && region.depth > 1 {
        if layer_stride < packed_layer {
            return Err(WinsysError::InvalidRegion(format!(
                "layer stride {} is smaller than a layer of {} bytes",
                layer_stride, packed_layer
            )));
        }
        layer_stride
    } else {
        packed_layer
    };

    let total_bytes = valid_layer_stride
        .checked_mul(region.depth)
        .ok_or_else(|| overflow("transfer size", region))?;

    Ok(TransferRegion {
        valid_stride,
        valid_layer_stride,
        total_bytes,
        rows,
        layers: region.depth,
        packed_row,
    })
}

fn overflow(what: &str, region: &PipeBox) -> WinsysError {
    WinsysError::InvalidRegion(format!("{} overflows 32 bits for {:?}", what, region))
}

/// Parameters shared by uploads and downloads.
#[derive(Debug, Clone, Copy)]
pub struct TransferArgs {
    pub region: PipeBox,
    pub stride: u32,
    pub layer_stride: u32,
    pub buffer_offset: usize,
    pub level: u32,
}

/// Upload `args.region` of `res` from its mapped memory.
pub fn transfer_put(
    conn: &Connection,
    res: &Resource,
    layout: FormatLayout,
    args: &TransferArgs,
) -> Result<(), WinsysError> {
    let region = compute_region(layout, &args.region, args.stride, args.layer_stride)?;
    let cmd = command(res, args, &region);

    res.with_mapped(|bytes| {
        let start = args.buffer_offset;
        let end = start
            .checked_add(region.total_bytes as usize)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| out_of_bounds(res, start, region.total_bytes as usize, bytes.len()))?;

        debug!(handle = %res.handle(), bytes = region.total_bytes, level = args.level, "transfer put");
        conn.transfer_put(&cmd, &bytes[start..end])
    })
}

/// Download `args.region` of `res` into its mapped memory.
pub fn transfer_get(
    conn: &Connection,
    res: &Resource,
    layout: FormatLayout,
    args: &TransferArgs,
) -> Result<(), WinsysError> {
    let region = compute_region(layout, &args.region, args.stride, args.layer_stride)?;
    let cmd = command(res, args, &region);

    res.with_mapped(|bytes| {
        let len = bytes.len();
        let start = args.buffer_offset;
        let in_bounds = start
            .checked_add(region.required_len())
            .is_some_and(|end| end <= len);
        if !in_bounds {
            return Err(out_of_bounds(res, start, region.required_len(), len));
        }

        debug!(handle = %res.handle(), bytes = region.total_bytes, level = args.level, "transfer get");
        conn.transfer_get(&cmd, &region, &mut bytes[start..])
    })
}

fn command(res: &Resource, args: &TransferArgs, region: &TransferRegion) -> TransferCommand {
    TransferCommand {
        handle: res.handle(),
        level: args.level,
        stride: args.stride,
        layer_stride: args.layer_stride,
        region: args.region,
        data_size: region.total_bytes,
    }
}

fn out_of_bounds(res: &Resource, offset: usize, bytes: usize, mapped: usize) -> WinsysError {
    WinsysError::InvalidRegion(format!(
        "{} bytes at offset {} exceed the {} mapped bytes of {}",
        bytes,
        offset,
        mapped,
        res.handle()
    ))
}
