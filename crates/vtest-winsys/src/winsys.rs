//! The object a state tracker holds: one renderer connection plus resource,
//! command buffer, fence and display entry points on top of it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use vtest_common::platform::{process_name, truncate_on_char_boundary};
use vtest_core::config::DisplayConfig;
use vtest_core::VtestConfig;
use vtest_protocol::commands::MAX_IDENTIFIER_LEN;
use vtest_protocol::format::BasicFormats;
use vtest_protocol::{
    Caps, DtCommand, DtSubCommand, FormatTable, PipeBox, ResourceHandle, TransferCommand,
};
use vtest_transport::{Endpoint, RingProvider, RingTransport, SocketTransport, Transport};

use crate::cmd_buf::CommandBuffer;
use crate::connection::Connection;
use crate::display::{normalize_rect, DisplayBackend, FrontbufferPresenter};
use crate::error::WinsysError;
use crate::fence::{self, Fence, WaitTimeout};
use crate::registry::Registry;
use crate::resource::{Backing, Resource, ResourceDesc, ResourceMap};
use crate::transfer::{self, compute_region, TransferArgs};

pub struct Winsys {
    conn: Arc<Connection>,
    registry: Arc<Registry>,
    caps: Caps,
    formats: Box<dyn FormatTable>,
    fence_poll: Duration,
    display: DisplayConfig,
    client_name: String,
    closed: bool,
}

impl Winsys {
    /// Connect to the renderer named by `config.transport`.
    pub fn connect(config: &VtestConfig) -> Result<Self, WinsysError> {
        Self::connect_with(config, None, None)
    }

    /// Connect with an optional shared-memory ring and display backend.
    pub fn connect_with(
        config: &VtestConfig,
        ring: Option<&dyn RingProvider>,
        display: Option<Arc<dyn DisplayBackend>>,
    ) -> Result<Self, WinsysError> {
        if let (Some(dir), None) = (&config.transport.ring, ring) {
            return Err(WinsysError::RingUnavailable(dir.clone()));
        }
        let endpoint = Endpoint::parse(&config.transport.socket)?;
        let socket = SocketTransport::connect(
            &endpoint,
            config.transport.connect_retries,
            config.transport.retry_delay(),
        )?;

        let transport: Box<dyn Transport> = match (&config.transport.ring, ring) {
            (Some(dir), Some(provider)) => {
                Box::new(RingTransport::attach(provider, socket, dir, &client_name(config))?)
            }
            _ => Box::new(socket),
        };
        Self::with_transport(transport, config, display)
    }

    /// Handshake over an already established transport.
    pub fn with_transport(
        transport: Box<dyn Transport>,
        config: &VtestConfig,
        display: Option<Arc<dyn DisplayBackend>>,
    ) -> Result<Self, WinsysError> {
        config.validate()?;
        let conn = Arc::new(Connection::new(transport, config.protocol.put_length.into()));

        let name = client_name(config);
        conn.create_renderer(&name)?;

        let caps = match conn.get_caps()? {
            Some(caps) => caps,
            None => {
                warn!(connection = conn.label(), "using default capabilities");
                Caps::defaults()
            }
        };
        info!(connection = conn.label(), client = %name, caps_version = caps.version, "connected to renderer");

        let registry = Arc::new(Registry::new(
            Arc::clone(&conn),
            config.cache.retention(),
            display,
        ));
        Ok(Self {
            conn,
            registry,
            caps,
            formats: Box::new(BasicFormats),
            fence_poll: config.fence.poll_interval(),
            display: config.display.clone(),
            client_name: name,
            closed: false,
        })
    }

    /// Replace the format table used to size transfers.
    pub fn with_formats(mut self, formats: impl FormatTable + 'static) -> Self {
        self.formats = Box::new(formats);
        self
    }

    pub fn caps(&self) -> &Caps {
        &self.caps
    }

    /// Identifier sent in the handshake, as it went on the wire.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    // Resources

    pub fn resource_create(&self, desc: ResourceDesc) -> Result<Arc<Resource>, WinsysError> {
        self.registry.create(desc)
    }

    /// Drop the caller's reference.
    pub fn resource_unref(&self, res: &Arc<Resource>) -> Result<(), WinsysError> {
        self.registry.release(res)
    }

    /// Take an additional reference.
    pub fn resource_reference(&self, res: &Arc<Resource>) -> Arc<Resource> {
        self.registry.retain(res);
        Arc::clone(res)
    }

    /// Map the local memory of `res`. Transfers of the same resource may be
    /// issued while the map is alive.
    pub fn resource_map<'a>(&self, res: &'a Resource) -> ResourceMap<'a> {
        res.map()
    }

    pub fn resource_is_busy(&self, res: &Resource) -> Result<bool, WinsysError> {
        self.registry.is_busy(res)
    }

    /// Block until the renderer has finished with `res`.
    pub fn resource_wait(&self, res: &Resource) -> Result<(), WinsysError> {
        self.registry.wait(res)
    }

    // Command buffers

    pub fn cmd_buf_create(&self) -> Result<CommandBuffer, WinsysError> {
        CommandBuffer::new(Arc::clone(&self.registry))
    }

    pub fn submit_cmd(&self, cbuf: &mut CommandBuffer) -> Result<(), WinsysError> {
        cbuf.submit()
    }

    pub fn emit_res(
        &self,
        cbuf: &mut CommandBuffer,
        res: &Arc<Resource>,
        write_handle: bool,
    ) -> Result<(), WinsysError> {
        cbuf.reference(res, write_handle)
    }

    /// True while any pending command buffer references `res`.
    pub fn res_is_referenced(&self, res: &Resource) -> bool {
        res.is_referenced()
    }

    // Fences

    pub fn create_fence(&self) -> Result<Fence, WinsysError> {
        Ok(Fence::new(self.registry.create(fence::fence_desc())?))
    }

    /// Returns whether the fence signaled before `timeout` elapsed.
    pub fn fence_wait(&self, fence: &Fence, timeout: WaitTimeout) -> Result<bool, WinsysError> {
        fence::wait(&self.registry, fence, timeout, self.fence_poll)
    }

    pub fn fence_reference(&self, fence: &Fence) -> Fence {
        Fence::new(self.resource_reference(fence.resource()))
    }

    pub fn fence_release(&self, fence: Fence) -> Result<(), WinsysError> {
        self.registry.release(fence.resource())
    }

    // Transfers

    /// Upload `region` of `res` from its local memory at `buffer_offset`.
    pub fn transfer_put(
        &self,
        res: &Resource,
        region: &PipeBox,
        stride: u32,
        layer_stride: u32,
        buffer_offset: usize,
        level: u32,
    ) -> Result<(), WinsysError> {
        let args = TransferArgs { region: *region, stride, layer_stride, buffer_offset, level };
        transfer::transfer_put(&self.conn, res, self.formats.layout(res.format()), &args)
    }

    /// Download `region` of `res` into its local memory at `buffer_offset`.
    pub fn transfer_get(
        &self,
        res: &Resource,
        region: &PipeBox,
        stride: u32,
        layer_stride: u32,
        buffer_offset: usize,
        level: u32,
    ) -> Result<(), WinsysError> {
        let args = TransferArgs { region: *region, stride, layer_stride, buffer_offset, level };
        transfer::transfer_get(&self.conn, res, self.formats.layout(res.format()), &args)
    }

    // Display

    /// Show a rendered display target.
    ///
    /// Waits for rendering to finish, tells the renderer where the window
    /// is, and lets it draw directly when the window is visible. The frame is
    /// also read back and handed to `presenter` on the first flush, whenever
    /// the window is not visible, and on every flush with `always_readback`.
    /// Resources without a display target are ignored.
    pub fn flush_frontbuffer(
        &self,
        res: &Resource,
        level: u32,
        layer: u32,
        presenter: &mut dyn FrontbufferPresenter,
        sub_box: Option<&PipeBox>,
    ) -> Result<(), WinsysError> {
        if res.display_target_id().is_none() {
            return Ok(());
        }

        let layout = self.formats.layout(res.format());
        let stride = res.stride();
        let (region, offset) = match sub_box {
            Some(b) => {
                let offset = (b.y / layout.block_height) as usize * stride as usize
                    + (b.x / layout.block_width) as usize * layout.block_size as usize;
                (*b, offset)
            }
            None => {
                let desc = res.desc();
                (PipeBox::new(0, 0, layer, desc.width, desc.height, 1), 0)
            }
        };
        let transfer = compute_region(layout, &region, stride, 0)?;

        self.registry.wait(res)?;

        let geometry = presenter.sync_geometry();
        let drawable = presenter.drawable();

        let mut backing = res.lock_backing();
        let Backing::Display(dt) = &mut *backing else {
            return Ok(());
        };

        let first_frame = dt.front.drawable.is_none();
        let rect = normalize_rect(geometry.rect, &region);
        let changed = dt.front.rect != Some(rect) || dt.front.visible != geometry.visible;
        if changed || self.display.sync_coords {
            self.conn.dt_command(&DtCommand {
                cmd: DtSubCommand::SetRect,
                x: rect.x as u32,
                y: rect.y as u32,
                width: rect.width,
                height: rect.height,
                id: dt.id,
                handle: ResourceHandle::NULL,
                extra: u32::from(geometry.visible),
            })?;
            dt.front.rect = Some(rect);
            dt.front.visible = geometry.visible;
        }

        if geometry.visible {
            self.conn.dt_command(&DtCommand {
                cmd: DtSubCommand::Flush,
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                id: dt.id,
                handle: res.handle(),
                extra: drawable,
            })?;
        }

        if geometry.visible && !first_frame && !self.display.always_readback {
            return Ok(());
        }
        dt.front.drawable = Some(drawable);

        let cmd = TransferCommand {
            handle: res.handle(),
            level,
            stride,
            layer_stride: 0,
            region,
            data_size: transfer.total_bytes,
        };
        dt.target.begin_map();
        let pixels = dt.target.pixels_mut();
        let fits = offset
            .checked_add(transfer.required_len())
            .is_some_and(|end| end <= pixels.len());
        let got = if fits {
            self.conn.transfer_get(&cmd, &transfer, &mut pixels[offset..])
        } else {
            Err(WinsysError::InvalidRegion(format!(
                "flush of {:?} does not fit the {} byte display target of {}",
                region,
                pixels.len(),
                res.handle()
            )))
        };
        dt.target.end_map();
        got?;

        debug!(handle = %res.handle(), id = dt.id, drawable, "frame read back for local present");
        presenter.present(&region, dt.target.pixels(), stride);
        Ok(())
    }

    /// Destroy every cached resource. Resources still owned by the caller are
    /// reported and left alone.
    pub fn shutdown(&mut self) -> Result<(), WinsysError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let flushed = self.registry.destroy_all_cached();
        let leaked = self.registry.live_handles();
        if !leaked.is_empty() {
            warn!(count = leaked.len(), handles = ?leaked, "resources still referenced at shutdown");
        }
        flushed.map(|_| ())
    }
}

impl Drop for Winsys {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("winsys shutdown failed: {}", e);
        }
    }
}

/// Identifier announced to the renderer, truncated to what fits on the wire.
fn client_name(config: &VtestConfig) -> String {
    match &config.client.name {
        Some(name) => truncate_on_char_boundary(name, MAX_IDENTIFIER_LEN).to_string(),
        None => process_name(MAX_IDENTIFIER_LEN),
    }
}
