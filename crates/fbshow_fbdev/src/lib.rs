use std::{fmt::Display, io};

#[cfg(unix)]
pub mod linux;
pub mod mem;

#[cfg(unix)]
pub use linux::LinuxFbDevice;
pub use mem::MemFbDevice;

/// Bit placement of one color channel inside a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelLayout {
    pub offset: u32,
    pub length: u32,
}

impl ChannelLayout {
    #[inline]
    pub const fn new(offset: u32, length: u32) -> Self {
        Self { offset, length }
    }
}

/// Variable screen layout: resolution, panning window, and channel layout.
/// Subset of `linux/fb.h` `fb_var_screeninfo` that the backend uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VarScreenInfo {
    pub xres: u32,
    pub yres: u32,
    pub xres_virtual: u32,
    pub yres_virtual: u32,
    pub xoffset: u32,
    pub yoffset: u32,
    pub bits_per_pixel: u32,
    pub red: ChannelLayout,
    pub green: ChannelLayout,
    pub blue: ChannelLayout,
    pub transp: ChannelLayout,
}

impl VarScreenInfo {
    /// Overwrite the pixel format with the only layout the backend renders:
    /// 32bpp, R/G/B/A at bit offsets 0/8/16/24.
    pub fn force_rgba32(&mut self) {
        self.bits_per_pixel = 32;
        self.red = ChannelLayout::new(0, 8);
        self.green = ChannelLayout::new(8, 8);
        self.blue = ChannelLayout::new(16, 8);
        self.transp = ChannelLayout::new(24, 8);
    }

    #[inline]
    pub fn has_rgba32_channels(&self) -> bool {
        self.red == ChannelLayout::new(0, 8)
            && self.green == ChannelLayout::new(8, 8)
            && self.blue == ChannelLayout::new(16, 8)
            && self.transp == ChannelLayout::new(24, 8)
    }
}

/// Fixed screen layout: subset of `fb_fix_screeninfo` that the backend uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixedScreenInfo {
    /// Bytes per row, padding included.
    pub line_length: u32,
    /// Total length of the device memory in bytes.
    pub smem_len: u32,
}

#[derive(Debug)]
pub enum Error {
    CouldNotOpenDevice(String, io::Error),
    FixedInfoQueryFailed(io::Error),
    VarInfoQueryFailed(io::Error),
    VarInfoUpdateFailed(io::Error),
    MapFailed(io::Error),
    PanFailed(io::Error),
    BlankFailed(io::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::CouldNotOpenDevice(path, inner) => {
                write!(f, "Could not open framebuffer device '{}': {}", path, inner)
            }
            Error::FixedInfoQueryFailed(inner) => {
                write!(f, "Could not read fixed screen info: {}", inner)
            }
            Error::VarInfoQueryFailed(inner) => {
                write!(f, "Could not read variable screen info: {}", inner)
            }
            Error::VarInfoUpdateFailed(inner) => {
                write!(f, "Could not write variable screen info: {}", inner)
            }
            Error::MapFailed(inner) => {
                write!(f, "Could not map framebuffer memory: {}", inner)
            }
            Error::PanFailed(inner) => write!(f, "Display pan failed: {}", inner),
            Error::BlankFailed(inner) => write!(f, "Display blank failed: {}", inner),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

/// Narrow capability interface over a framebuffer device. The canvas layer
/// depends only on this trait, never on the concrete ioctl mechanism.
pub trait FbDevice {
    /// Query the fixed layout (stride, total memory size).
    fn fixed_info(&mut self) -> Result<FixedScreenInfo>;

    /// Query the variable layout (resolution, channel layout, pan window).
    fn var_info(&mut self) -> Result<VarScreenInfo>;

    /// Write the variable layout back to the device. The device is free to
    /// honor only part of it; callers re-read with [`FbDevice::var_info`].
    fn put_var_info(&mut self, var: &VarScreenInfo) -> Result<()>;

    /// Map the device's entire memory region read-write, shared with the
    /// device. Must be called before [`FbDevice::mem`] returns anything.
    fn map(&mut self) -> Result<()>;

    /// Mapped device memory. Empty before a successful [`FbDevice::map`].
    fn mem(&self) -> &[u8];

    fn mem_mut(&mut self) -> &mut [u8];

    /// Switch the displayed region of device memory (pan/commit).
    fn pan(&mut self, var: &VarScreenInfo) -> Result<()>;

    /// `true` powers the display down, `false` unblanks it.
    fn blank(&mut self, blank: bool) -> Result<()>;
}
