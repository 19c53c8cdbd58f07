//! `/dev/fb*` device binding through the Linux fbdev ioctl interface.

use crate::{ChannelLayout, Error, FbDevice, FixedScreenInfo, Result, VarScreenInfo};
use std::{ffi::CString, io, ptr, slice};

const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;
const FBIOPUT_VSCREENINFO: libc::c_ulong = 0x4601;
const FBIOGET_FSCREENINFO: libc::c_ulong = 0x4602;
const FBIOBLANK: libc::c_ulong = 0x4611;

const FB_BLANK_UNBLANK: libc::c_int = 0;
const FB_BLANK_POWERDOWN: libc::c_int = 4;

/// `struct fb_bitfield` from `linux/fb.h`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct RawBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

/// `struct fb_fix_screeninfo` from `linux/fb.h`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct RawFixScreenInfo {
    id: [u8; 16],
    smem_start: libc::c_ulong,
    smem_len: u32,
    type_: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: libc::c_ulong,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

/// `struct fb_var_screeninfo` from `linux/fb.h`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct RawVarScreenInfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: RawBitfield,
    green: RawBitfield,
    blue: RawBitfield,
    transp: RawBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

impl RawFixScreenInfo {
    fn zeroed() -> Self {
        // All-integer repr(C) struct, the all-zeroes pattern is valid.
        unsafe { std::mem::zeroed() }
    }
}

impl RawVarScreenInfo {
    fn zeroed() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

impl From<RawBitfield> for ChannelLayout {
    fn from(raw: RawBitfield) -> Self {
        ChannelLayout::new(raw.offset, raw.length)
    }
}

struct Mapping {
    addr: *mut u8,
    len: usize,
}

/// A real framebuffer device. The file descriptor and the memory mapping are
/// held for the lifetime of the value and released on drop.
pub struct LinuxFbDevice {
    fd: libc::c_int,
    // Last raw var info read from the device. Writes overlay the negotiated
    // fields onto this so driver-private fields (timings etc.) round-trip
    // untouched.
    raw_var: RawVarScreenInfo,
    mapping: Option<Mapping>,
}

impl LinuxFbDevice {
    /// Open a framebuffer device file, e.g. `/dev/fb0`, read-write.
    pub fn open(path: &str) -> Result<Self> {
        let c_path = CString::new(path)
            .map_err(|_| Error::CouldNotOpenDevice(path.to_string(), invalid_path_error()))?;
        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDWR) };
        if fd < 0 {
            return Err(Error::CouldNotOpenDevice(
                path.to_string(),
                io::Error::last_os_error(),
            ));
        }
        Ok(Self {
            fd,
            raw_var: RawVarScreenInfo::zeroed(),
            mapping: None,
        })
    }

    fn ioctl_read<T>(&self, request: libc::c_ulong, value: &mut T) -> io::Result<()> {
        let ret = unsafe { libc::ioctl(self.fd, request, value as *mut T) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn ioctl_write<T>(&self, request: libc::c_ulong, value: &T) -> io::Result<()> {
        let ret = unsafe { libc::ioctl(self.fd, request, value as *const T) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Overlay the fields the backend negotiates onto the stored raw struct.
    fn overlay(&mut self, var: &VarScreenInfo) {
        self.raw_var.xres = var.xres;
        self.raw_var.yres = var.yres;
        self.raw_var.xres_virtual = var.xres_virtual;
        self.raw_var.yres_virtual = var.yres_virtual;
        self.raw_var.xoffset = var.xoffset;
        self.raw_var.yoffset = var.yoffset;
        self.raw_var.bits_per_pixel = var.bits_per_pixel;
        for (raw, layout) in [
            (&mut self.raw_var.red, var.red),
            (&mut self.raw_var.green, var.green),
            (&mut self.raw_var.blue, var.blue),
            (&mut self.raw_var.transp, var.transp),
        ] {
            raw.offset = layout.offset;
            raw.length = layout.length;
        }
    }
}

fn invalid_path_error() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte")
}

impl FbDevice for LinuxFbDevice {
    fn fixed_info(&mut self) -> Result<FixedScreenInfo> {
        let mut raw = RawFixScreenInfo::zeroed();
        self.ioctl_read(FBIOGET_FSCREENINFO, &mut raw)
            .map_err(Error::FixedInfoQueryFailed)?;
        Ok(FixedScreenInfo {
            line_length: raw.line_length,
            smem_len: raw.smem_len,
        })
    }

    fn var_info(&mut self) -> Result<VarScreenInfo> {
        let mut raw = RawVarScreenInfo::zeroed();
        self.ioctl_read(FBIOGET_VSCREENINFO, &mut raw)
            .map_err(Error::VarInfoQueryFailed)?;
        self.raw_var = raw;
        Ok(VarScreenInfo {
            xres: raw.xres,
            yres: raw.yres,
            xres_virtual: raw.xres_virtual,
            yres_virtual: raw.yres_virtual,
            xoffset: raw.xoffset,
            yoffset: raw.yoffset,
            bits_per_pixel: raw.bits_per_pixel,
            red: raw.red.into(),
            green: raw.green.into(),
            blue: raw.blue.into(),
            transp: raw.transp.into(),
        })
    }

    fn put_var_info(&mut self, var: &VarScreenInfo) -> Result<()> {
        self.overlay(var);
        let raw = self.raw_var;
        self.ioctl_write(FBIOPUT_VSCREENINFO, &raw)
            .map_err(Error::VarInfoUpdateFailed)
    }

    fn map(&mut self) -> Result<()> {
        let fixed = self.fixed_info()?;
        let len = fixed.smem_len as usize;
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(Error::MapFailed(io::Error::last_os_error()));
        }
        log::debug!("mapped {} bytes of framebuffer memory", len);
        self.mapping = Some(Mapping {
            addr: addr as *mut u8,
            len,
        });
        Ok(())
    }

    fn mem(&self) -> &[u8] {
        match &self.mapping {
            Some(mapping) => unsafe { slice::from_raw_parts(mapping.addr, mapping.len) },
            None => &[],
        }
    }

    fn mem_mut(&mut self) -> &mut [u8] {
        match &self.mapping {
            Some(mapping) => unsafe { slice::from_raw_parts_mut(mapping.addr, mapping.len) },
            None => &mut [],
        }
    }

    fn pan(&mut self, var: &VarScreenInfo) -> Result<()> {
        // fbdev pans through the same FBIOPUT_VSCREENINFO call used for
        // layout negotiation, with updated yoffset/yres_virtual.
        self.overlay(var);
        let raw = self.raw_var;
        self.ioctl_write(FBIOPUT_VSCREENINFO, &raw)
            .map_err(Error::PanFailed)
    }

    fn blank(&mut self, blank: bool) -> Result<()> {
        let level = if blank {
            FB_BLANK_POWERDOWN
        } else {
            FB_BLANK_UNBLANK
        };
        let ret = unsafe { libc::ioctl(self.fd, FBIOBLANK, level) };
        if ret < 0 {
            return Err(Error::BlankFailed(io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl Drop for LinuxFbDevice {
    fn drop(&mut self) {
        if let Some(mapping) = self.mapping.take() {
            unsafe {
                libc::munmap(mapping.addr as *mut libc::c_void, mapping.len);
            }
        }
        unsafe {
            libc::close(self.fd);
        }
    }
}
