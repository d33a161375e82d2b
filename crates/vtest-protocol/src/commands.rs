use crate::error::ProtocolError;
use crate::handle::ResourceHandle;
use crate::resource::{BindFlags, PipeBox, TextureTarget};

/// Protocol command identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandId {
    GetCaps = 1,
    ResourceCreate = 2,
    ResourceUnref = 3,
    TransferGet = 4,
    TransferPut = 5,
    SubmitCmd = 6,
    ResourceBusyWait = 7,
    CreateRenderer = 8,
    GetCaps2 = 9,
    DtCommand = 10,
}

impl CommandId {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => Self::GetCaps,
            2 => Self::ResourceCreate,
            3 => Self::ResourceUnref,
            4 => Self::TransferGet,
            5 => Self::TransferPut,
            6 => Self::SubmitCmd,
            7 => Self::ResourceBusyWait,
            8 => Self::CreateRenderer,
            9 => Self::GetCaps2,
            10 => Self::DtCommand,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GetCaps => "GET_CAPS",
            Self::ResourceCreate => "RESOURCE_CREATE",
            Self::ResourceUnref => "RESOURCE_UNREF",
            Self::TransferGet => "TRANSFER_GET",
            Self::TransferPut => "TRANSFER_PUT",
            Self::SubmitCmd => "SUBMIT_CMD",
            Self::ResourceBusyWait => "RESOURCE_BUSY_WAIT",
            Self::CreateRenderer => "CREATE_RENDERER",
            Self::GetCaps2 => "GET_CAPS2",
            Self::DtCommand => "DT_COMMAND",
        }
    }
}

pub const RESOURCE_CREATE_WORDS: usize = 10;
pub const RESOURCE_UNREF_WORDS: usize = 1;
pub const BUSY_WAIT_WORDS: usize = 2;
pub const TRANSFER_HDR_WORDS: usize = 11;
pub const DT_WORDS: usize = 8;

/// Maximum client identifier length sent with CREATE_RENDERER, excluding the NUL.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Payload of RESOURCE_CREATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceCreate {
    pub handle: ResourceHandle,
    pub target: TextureTarget,
    pub format: u32,
    pub bind: BindFlags,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub array_size: u32,
    pub last_level: u32,
    pub nr_samples: u32,
}

impl ResourceCreate {
    pub fn to_words(&self) -> [u32; RESOURCE_CREATE_WORDS] {
        [
            self.handle.raw(),
            self.target as u32,
            self.format,
            self.bind.bits(),
            self.width,
            self.height,
            self.depth,
            self.array_size,
            self.last_level,
            self.nr_samples,
        ]
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BusyWaitFlags: u32 {
        /// Block on the server until the resource is idle.
        const WAIT = 1;
    }
}

/// How TRANSFER_PUT declares its length in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PutLength {
    /// `11 + data_size`: the long-standing client computes `data_size + 3 / 4`,
    /// which never rounds. Servers read `data_size` from the payload instead of
    /// trusting this field, so the value is kept for byte-compatibility.
    #[default]
    Legacy,
    /// `11 + ceil(data_size / 4)`.
    Words,
}

/// Payload of TRANSFER_GET / TRANSFER_PUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferCommand {
    pub handle: ResourceHandle,
    pub level: u32,
    pub stride: u32,
    pub layer_stride: u32,
    pub region: PipeBox,
    pub data_size: u32,
}

impl TransferCommand {
    pub fn to_words(&self) -> [u32; TRANSFER_HDR_WORDS] {
        [
            self.handle.raw(),
            self.level,
            self.stride,
            self.layer_stride,
            self.region.x,
            self.region.y,
            self.region.z,
            self.region.width,
            self.region.height,
            self.region.depth,
            self.data_size,
        ]
    }

    /// Header length for a TRANSFER_PUT carrying `data_size` bytes.
    ///
    /// The legacy length adds the byte count to the word count and can exceed
    /// 32 bits for sizes the word form still encodes.
    pub fn put_header_len(&self, mode: PutLength) -> Result<u32, ProtocolError> {
        let data = match mode {
            PutLength::Legacy => self.data_size,
            PutLength::Words => self.data_size.div_ceil(4),
        };
        (TRANSFER_HDR_WORDS as u32)
            .checked_add(data)
            .ok_or(ProtocolError::PayloadTooLarge(self.data_size as usize))
    }
}

/// Display-target sub-commands carried by DT_COMMAND.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DtSubCommand {
    Create = 0,
    Destroy = 1,
    SetRect = 2,
    Flush = 3,
}

/// Payload of DT_COMMAND. `extra` is the visibility flag for `SetRect` and the
/// drawable id for `Flush`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtCommand {
    pub cmd: DtSubCommand,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub id: u32,
    pub handle: ResourceHandle,
    pub extra: u32,
}

impl DtCommand {
    pub fn create(id: u32, width: u32, height: u32) -> Self {
        Self {
            cmd: DtSubCommand::Create,
            x: 0,
            y: 0,
            width,
            height,
            id,
            handle: ResourceHandle::NULL,
            extra: 0,
        }
    }

    pub fn destroy(id: u32) -> Self {
        Self {
            cmd: DtSubCommand::Destroy,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            id,
            handle: ResourceHandle::NULL,
            extra: 0,
        }
    }

    pub fn to_words(&self) -> [u32; DT_WORDS] {
        [
            self.cmd as u32,
            self.x,
            self.y,
            self.width,
            self.height,
            self.id,
            self.handle.raw(),
            self.extra,
        ]
    }
}
