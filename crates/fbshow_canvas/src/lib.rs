//! Framebuffer canvas: turns a mapped fbdev device into a draw surface and
//! publishes completed frames onto the display.
//!
//! The caller renders into the buffer behind [`FbCanvas::draw_buf_mut`] and
//! calls [`FbCanvas::flip`] to make the frame visible. When the device has
//! memory for two frames the canvas pans between them; otherwise every flip
//! copies the heap draw surface into the single hardware frame.

use fbshow_fbdev::{FbDevice, FixedScreenInfo, VarScreenInfo};
use std::fmt::Display;

#[cfg(unix)]
use fbshow_fbdev::LinuxFbDevice;

mod transform;

pub const BYTES_PER_PIXEL: u32 = 4;

const DEFAULT_DEVICE_PATH: &str = "/dev/fb0";

#[derive(Debug)]
pub enum CanvasError {
    Device(fbshow_fbdev::Error),
    /// The device refused the 32bpp layout; the flip engine only understands
    /// 4-byte pixels.
    UnsupportedPixelFormat { bits_per_pixel: u32 },
}

impl From<fbshow_fbdev::Error> for CanvasError {
    fn from(err: fbshow_fbdev::Error) -> Self {
        Self::Device(err)
    }
}

impl Display for CanvasError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CanvasError::Device(inner) => write!(f, "{}", inner),
            CanvasError::UnsupportedPixelFormat { bits_per_pixel } => {
                write!(
                    f,
                    "Device reports {} bits per pixel, only 32 is supported",
                    bits_per_pixel
                )
            }
        }
    }
}

impl std::error::Error for CanvasError {}

pub type Result<T> = core::result::Result<T, CanvasError>;

/// Display rotation, fixed per canvas at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    /// Whether the draw surface swaps width and height relative to the
    /// device's native orientation.
    #[inline]
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }
}

/// Byte order of the color channels the display expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    /// Native order, frames are copied through unchanged.
    Rgba,
    /// Swap bytes 0 and 2 of every pixel on the way out.
    Bgra,
}

#[derive(Debug, Clone, Copy)]
pub struct CanvasConfig {
    pub rotation: Rotation,
    pub channel_order: ChannelOrder,
}

impl CanvasConfig {
    #[inline]
    pub fn new() -> Self {
        Self {
            rotation: Rotation::Normal,
            channel_order: ChannelOrder::Rgba,
        }
    }

    #[inline]
    pub fn set_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    #[inline]
    pub fn set_channel_order(mut self, channel_order: ChannelOrder) -> Self {
        self.channel_order = channel_order;
        self
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vector2<T> {
    pub x: T,
    pub y: T,
}

/// Draw surface descriptor. Always presented in post-rotation orientation;
/// the pixel bytes live behind [`FbCanvas::draw_buf`] / `draw_buf_mut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of consecutive rows, padding included.
    pub row_bytes: u32,
    pub pixel_bytes: u32,
}

/// Which buffer the caller currently renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawTarget {
    /// The heap surface.
    Temp,
    /// One of the two hardware frame regions.
    Hardware(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferMode {
    Single,
    Double { displayed: usize },
}

pub struct FbCanvas<D: FbDevice> {
    device: D,
    config: CanvasConfig,
    var: VarScreenInfo,
    /// One native frame: `yres * line_length` bytes.
    frame_len: usize,
    surface: Surface,
    /// Heap pixel buffer. Permanent draw surface in single-buffered mode and
    /// in rotated double-buffered mode; the initial draw surface otherwise.
    temp: Vec<u8>,
    mode: BufferMode,
    draw: DrawTarget,
}

#[cfg(unix)]
impl FbCanvas<LinuxFbDevice> {
    /// Open `/dev/fb0`.
    #[inline]
    pub fn open(config: CanvasConfig) -> Result<Self> {
        Self::open_at(DEFAULT_DEVICE_PATH, config)
    }

    #[inline]
    pub fn open_at(path: &str, config: CanvasConfig) -> Result<Self> {
        let device = LinuxFbDevice::open(path)?;
        Self::with_device(device, config)
    }
}

impl<D: FbDevice> FbCanvas<D> {
    /// Initialize the backend on `device`: negotiate the pixel layout, map
    /// and zero the device memory, pick the buffering mode, and allocate the
    /// draw surface. Any failure drops everything acquired so far.
    pub fn with_device(mut device: D, config: CanvasConfig) -> Result<Self> {
        let fixed = device.fixed_info()?;
        let mut var = device.var_info()?;
        var.force_rgba32();
        device.put_var_info(&var)?;
        let var = device.var_info()?;

        if var.bits_per_pixel != 32 {
            return Err(CanvasError::UnsupportedPixelFormat {
                bits_per_pixel: var.bits_per_pixel,
            });
        }
        if !var.has_rgba32_channels() {
            // Devices are known to report a different order while honoring
            // RGBA writes, so this stays a warning.
            log::warn!(
                "device reports a channel order other than R/G/B/A at 0/8/16/24, proceeding anyway"
            );
        }
        log::info!(
            "device reports (possibly inaccurate): {}bpp, red {}+{}, green {}+{}, blue {}+{}",
            var.bits_per_pixel,
            var.red.offset,
            var.red.length,
            var.green.offset,
            var.green.length,
            var.blue.offset,
            var.blue.length,
        );

        device.map()?;
        device.mem_mut().fill(0);

        let frame_len = var.yres as usize * fixed.line_length as usize;
        let surface = draw_surface_geometry(&var, &fixed, config.rotation);
        let temp = vec![0u8; frame_len];
        let mode = if wants_double_buffering(&var, &fixed) {
            BufferMode::Double { displayed: 0 }
        } else {
            BufferMode::Single
        };

        let mut canvas = Self {
            device,
            config,
            var,
            frame_len,
            surface,
            temp,
            mode,
            draw: DrawTarget::Temp,
        };
        log::info!(
            "framebuffer: {}x{}, {} buffering",
            canvas.surface.width,
            canvas.surface.height,
            if canvas.is_double_buffered() { "double" } else { "single" },
        );
        canvas.pan_to(0);
        canvas.blank(true);
        canvas.blank(false);
        Ok(canvas)
    }

    /// Draw surface size, post-rotation.
    #[inline]
    pub fn size(&self) -> Vector2<u32> {
        Vector2 {
            x: self.surface.width,
            y: self.surface.height,
        }
    }

    #[inline]
    pub fn draw_surface(&self) -> Surface {
        self.surface
    }

    #[inline]
    pub fn is_double_buffered(&self) -> bool {
        matches!(self.mode, BufferMode::Double { .. })
    }

    /// Which hardware frame region is currently displayed. `None` in
    /// single-buffered mode.
    #[inline]
    pub fn displayed_index(&self) -> Option<usize> {
        match self.mode {
            BufferMode::Single => None,
            BufferMode::Double { displayed } => Some(displayed),
        }
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Pixel bytes of the current draw surface, `height * row_bytes` long.
    pub fn draw_buf(&self) -> &[u8] {
        match self.draw {
            DrawTarget::Temp => &self.temp,
            DrawTarget::Hardware(index) => {
                let start = index * self.frame_len;
                &self.device.mem()[start..start + self.frame_len]
            }
        }
    }

    pub fn draw_buf_mut(&mut self) -> &mut [u8] {
        match self.draw {
            DrawTarget::Temp => &mut self.temp,
            DrawTarget::Hardware(index) => {
                let start = index * self.frame_len;
                &mut self.device.mem_mut()[start..start + self.frame_len]
            }
        }
    }

    /// Publish the current draw surface to the display and return the draw
    /// surface for the next frame.
    ///
    /// In double-buffered mode without rotation the draw surface is
    /// repointed at the hardware region the display just vacated, primed
    /// with the frame that was published so its content carries over. In
    /// every other mode the heap surface stays the draw surface and its
    /// content is retained untouched.
    pub fn flip(&mut self) -> Surface {
        match self.mode {
            BufferMode::Single => {
                let frame = self.surface.height as usize * self.surface.row_bytes as usize;
                match self.config.channel_order {
                    ChannelOrder::Rgba => {
                        self.device.mem_mut()[..frame].copy_from_slice(&self.temp[..frame]);
                    }
                    ChannelOrder::Bgra => {
                        transform::copy_swap_red_blue(
                            &self.temp[..frame],
                            &mut self.device.mem_mut()[..frame],
                        );
                    }
                }
            }
            BufferMode::Double { displayed } => {
                let target = 1 - displayed;
                match self.config.rotation {
                    Rotation::Normal => {
                        self.copy_draw_to_region(target);
                        if self.config.channel_order == ChannelOrder::Bgra {
                            // The swap lands on the buffer just copied from,
                            // not on the target; see the transform module.
                            transform::swap_red_blue_in_place(self.draw_buf_mut());
                        }
                        self.pan_to(target);
                        self.copy_draw_to_region(displayed);
                        self.draw = DrawTarget::Hardware(displayed);
                    }
                    rotation => {
                        let start = target * self.frame_len;
                        let native_width = self.var.xres as usize;
                        let native_height = self.var.yres as usize;
                        let rotate: fn(&[u8], &mut [u8], usize, usize) = match rotation {
                            Rotation::Rotate90 => transform::copy_rotate_90,
                            Rotation::Rotate180 => transform::copy_rotate_180,
                            Rotation::Rotate270 => transform::copy_rotate_270,
                            Rotation::Normal => unreachable!(),
                        };
                        rotate(
                            &self.temp,
                            &mut self.device.mem_mut()[start..start + self.frame_len],
                            native_width,
                            native_height,
                        );
                        self.pan_to(target);
                    }
                }
            }
        }
        self.surface
    }

    /// Power the display down (`true`) or unblank it (`false`). Device
    /// failure is logged, never propagated.
    pub fn blank(&mut self, blank: bool) {
        if let Err(err) = self.device.blank(blank) {
            log::warn!("{}", err);
        }
    }

    /// Release the device and the heap surfaces. Equivalent to dropping.
    #[inline]
    pub fn shutdown(self) {}

    /// Copy the current draw surface's bytes into hardware frame region
    /// `index`. No-op when the draw surface already is that region.
    fn copy_draw_to_region(&mut self, index: usize) {
        let start = index * self.frame_len;
        match self.draw {
            DrawTarget::Temp => {
                self.device.mem_mut()[start..start + self.frame_len]
                    .copy_from_slice(&self.temp[..self.frame_len]);
            }
            DrawTarget::Hardware(src) if src != index => {
                let src_start = src * self.frame_len;
                self.device
                    .mem_mut()
                    .copy_within(src_start..src_start + self.frame_len, start);
            }
            DrawTarget::Hardware(_) => {}
        }
    }

    /// Switch the displayed region. The bookkeeping advances even when the
    /// device rejects the pan: subsequent frames self-correct, failing hard
    /// would abort the session over a cosmetic glitch.
    fn pan_to(&mut self, index: usize) {
        if !self.is_double_buffered() {
            return;
        }
        let mut var = self.var;
        var.yres_virtual = self.var.yres * 2;
        var.yoffset = index as u32 * self.var.yres;
        if let Err(err) = self.device.pan(&var) {
            log::warn!("active fb swap failed: {}", err);
        }
        self.var = var;
        if let BufferMode::Double { displayed } = &mut self.mode {
            *displayed = index;
        }
    }
}

/// Double buffering is used iff the device memory holds two full frames at
/// the negotiated stride and resolution.
fn wants_double_buffering(var: &VarScreenInfo, fixed: &FixedScreenInfo) -> bool {
    2 * var.yres as u64 * fixed.line_length as u64 <= fixed.smem_len as u64
}

/// Geometry of the draw surface: the device's logical geometry, with axes
/// (and the derived stride) swapped when the rotation calls for it.
fn draw_surface_geometry(var: &VarScreenInfo, fixed: &FixedScreenInfo, rotation: Rotation) -> Surface {
    let pixel_bytes = var.bits_per_pixel / 8;
    if rotation.swaps_axes() {
        Surface {
            width: var.yres,
            height: var.xres,
            row_bytes: (fixed.line_length as u64 * var.yres as u64 / var.xres as u64) as u32,
            pixel_bytes,
        }
    } else {
        Surface {
            width: var.xres,
            height: var.yres,
            row_bytes: fixed.line_length,
            pixel_bytes,
        }
    }
}

#[cfg(test)]
fn geometry(xres: u32, yres: u32, line_length: u32) -> (VarScreenInfo, FixedScreenInfo) {
    let var = VarScreenInfo {
        xres,
        yres,
        bits_per_pixel: 32,
        ..VarScreenInfo::default()
    };
    let fixed = FixedScreenInfo {
        line_length,
        smem_len: 0,
    };
    (var, fixed)
}

#[test]
fn only_quarter_turns_swap_axes() {
    assert!(!Rotation::Normal.swaps_axes());
    assert!(Rotation::Rotate90.swaps_axes());
    assert!(!Rotation::Rotate180.swaps_axes());
    assert!(Rotation::Rotate270.swaps_axes());
}

#[test]
fn double_buffering_boundary_is_exact() {
    let (var, mut fixed) = geometry(4, 2, 16);
    fixed.smem_len = 64;
    assert!(wants_double_buffering(&var, &fixed));
    fixed.smem_len = 63;
    assert!(!wants_double_buffering(&var, &fixed));
}

#[test]
fn native_geometry_without_rotation() {
    let (var, fixed) = geometry(640, 480, 2560);
    let surface = draw_surface_geometry(&var, &fixed, Rotation::Normal);
    assert_eq!(surface.width, 640);
    assert_eq!(surface.height, 480);
    assert_eq!(surface.row_bytes, 2560);
    assert_eq!(surface.pixel_bytes, 4);
    assert!(surface.row_bytes >= surface.width * surface.pixel_bytes);
}

#[test]
fn quarter_turn_swaps_geometry_and_stride() {
    let (var, fixed) = geometry(640, 480, 2560);
    for rotation in [Rotation::Rotate90, Rotation::Rotate270] {
        let surface = draw_surface_geometry(&var, &fixed, rotation);
        assert_eq!(surface.width, 480);
        assert_eq!(surface.height, 640);
        assert_eq!(surface.row_bytes, 1920);
        assert!(surface.row_bytes >= surface.width * surface.pixel_bytes);
    }
}

#[test]
fn half_turn_keeps_native_geometry() {
    let (var, fixed) = geometry(640, 480, 2560);
    let surface = draw_surface_geometry(&var, &fixed, Rotation::Rotate180);
    assert_eq!(surface.width, 640);
    assert_eq!(surface.height, 480);
}
