//! Fully in-memory framebuffer device, used as a test double. Simulates
//! geometry, memory limits, and per-operation failures, and records panning
//! and blanking so tests can assert on the device-visible side effects.

use crate::{ChannelLayout, Error, FbDevice, FixedScreenInfo, Result, VarScreenInfo};
use std::io;

/// Byte pattern the fake device memory starts out with, so that callers that
/// forget to zero-fill after mapping are visible in tests.
const UNMAPPED_PATTERN: u8 = 0xaa;

pub struct MemFbDevice {
    fixed: FixedScreenInfo,
    var: VarScreenInfo,
    /// When set, `put_var_info` pretends the hardware honored this layout
    /// instead of the requested one.
    honored: Option<VarScreenInfo>,
    mem: Vec<u8>,
    pans: Vec<VarScreenInfo>,
    blanks: Vec<bool>,
    fail_fixed_info: bool,
    fail_var_info: bool,
    fail_put_var_info: bool,
    fail_map: bool,
    fail_pan: bool,
    fail_blank: bool,
}

impl MemFbDevice {
    /// Device with the given resolution, an unpadded stride, and room for
    /// exactly two frames.
    pub fn new(xres: u32, yres: u32) -> Self {
        let line_length = xres * 4;
        Self {
            fixed: FixedScreenInfo {
                line_length,
                smem_len: 2 * yres * line_length,
            },
            var: VarScreenInfo {
                xres,
                yres,
                xres_virtual: xres,
                yres_virtual: yres,
                xoffset: 0,
                yoffset: 0,
                // Pre-negotiation state reported by most devices: some
                // layout that is not the one the backend wants.
                bits_per_pixel: 16,
                red: ChannelLayout::new(11, 5),
                green: ChannelLayout::new(5, 6),
                blue: ChannelLayout::new(0, 5),
                transp: ChannelLayout::new(0, 0),
            },
            honored: None,
            mem: Vec::new(),
            pans: Vec::new(),
            blanks: Vec::new(),
            fail_fixed_info: false,
            fail_var_info: false,
            fail_put_var_info: false,
            fail_map: false,
            fail_pan: false,
            fail_blank: false,
        }
    }

    pub fn with_line_length(mut self, line_length: u32) -> Self {
        self.fixed.line_length = line_length;
        self.fixed.smem_len = 2 * self.var.yres * line_length;
        self
    }

    pub fn with_smem_len(mut self, smem_len: u32) -> Self {
        self.fixed.smem_len = smem_len;
        self
    }

    /// Make the device report `honored` from every layout read after the
    /// first `put_var_info`, regardless of what was requested.
    pub fn honor_var_info(mut self, honored: VarScreenInfo) -> Self {
        self.honored = Some(honored);
        self
    }

    pub fn fail_fixed_info(mut self) -> Self {
        self.fail_fixed_info = true;
        self
    }

    pub fn fail_var_info(mut self) -> Self {
        self.fail_var_info = true;
        self
    }

    pub fn fail_put_var_info(mut self) -> Self {
        self.fail_put_var_info = true;
        self
    }

    pub fn fail_map(mut self) -> Self {
        self.fail_map = true;
        self
    }

    pub fn fail_pan(mut self) -> Self {
        self.fail_pan = true;
        self
    }

    pub fn fail_blank(mut self) -> Self {
        self.fail_blank = true;
        self
    }

    /// Every pan request the device received, in order.
    pub fn pans(&self) -> &[VarScreenInfo] {
        &self.pans
    }

    /// Every blank/unblank request the device received, in order.
    pub fn blanks(&self) -> &[bool] {
        &self.blanks
    }

    pub fn is_mapped(&self) -> bool {
        !self.mem.is_empty()
    }

    /// Row `yoffset` of the last pan, i.e. which memory region the fake
    /// display is scanning out.
    pub fn displayed_yoffset(&self) -> u32 {
        self.pans.last().map(|var| var.yoffset).unwrap_or(0)
    }
}

fn injected() -> io::Error {
    io::Error::other("injected failure")
}

impl FbDevice for MemFbDevice {
    fn fixed_info(&mut self) -> Result<FixedScreenInfo> {
        if self.fail_fixed_info {
            return Err(Error::FixedInfoQueryFailed(injected()));
        }
        Ok(self.fixed)
    }

    fn var_info(&mut self) -> Result<VarScreenInfo> {
        if self.fail_var_info {
            return Err(Error::VarInfoQueryFailed(injected()));
        }
        Ok(self.var)
    }

    fn put_var_info(&mut self, var: &VarScreenInfo) -> Result<()> {
        if self.fail_put_var_info {
            return Err(Error::VarInfoUpdateFailed(injected()));
        }
        self.var = match self.honored {
            Some(honored) => honored,
            None => *var,
        };
        Ok(())
    }

    fn map(&mut self) -> Result<()> {
        if self.fail_map {
            return Err(Error::MapFailed(injected()));
        }
        self.mem = vec![UNMAPPED_PATTERN; self.fixed.smem_len as usize];
        Ok(())
    }

    fn mem(&self) -> &[u8] {
        &self.mem
    }

    fn mem_mut(&mut self) -> &mut [u8] {
        &mut self.mem
    }

    fn pan(&mut self, var: &VarScreenInfo) -> Result<()> {
        if self.fail_pan {
            return Err(Error::PanFailed(injected()));
        }
        self.var.yoffset = var.yoffset;
        self.var.yres_virtual = var.yres_virtual;
        self.pans.push(*var);
        Ok(())
    }

    fn blank(&mut self, blank: bool) -> Result<()> {
        if self.fail_blank {
            return Err(Error::BlankFailed(injected()));
        }
        self.blanks.push(blank);
        Ok(())
    }
}

#[test]
fn negotiation_round_trip() {
    let mut device = MemFbDevice::new(8, 4);
    let mut var = device.var_info().unwrap();
    assert_eq!(var.bits_per_pixel, 16);

    var.force_rgba32();
    device.put_var_info(&var).unwrap();
    let honored = device.var_info().unwrap();
    assert_eq!(honored.bits_per_pixel, 32);
    assert!(honored.has_rgba32_channels());
}

#[test]
fn honored_layout_overrides_request() {
    let stubborn = VarScreenInfo {
        xres: 8,
        yres: 4,
        bits_per_pixel: 16,
        ..VarScreenInfo::default()
    };
    let mut device = MemFbDevice::new(8, 4).honor_var_info(stubborn);
    let mut var = device.var_info().unwrap();
    var.force_rgba32();
    device.put_var_info(&var).unwrap();
    assert_eq!(device.var_info().unwrap().bits_per_pixel, 16);
}

#[test]
fn map_exposes_smem_len_bytes() {
    let mut device = MemFbDevice::new(8, 4).with_smem_len(100);
    assert!(device.mem().is_empty());
    device.map().unwrap();
    assert_eq!(device.mem().len(), 100);
    assert!(device.mem().iter().all(|&b| b == UNMAPPED_PATTERN));
}

#[test]
fn pan_and_blank_are_recorded() {
    let mut device = MemFbDevice::new(8, 4);
    let mut var = device.var_info().unwrap();
    var.yoffset = 4;
    var.yres_virtual = 8;
    device.pan(&var).unwrap();
    device.blank(true).unwrap();
    device.blank(false).unwrap();

    assert_eq!(device.displayed_yoffset(), 4);
    assert_eq!(device.blanks(), &[true, false]);
}
