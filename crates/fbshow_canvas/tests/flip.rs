//! End-to-end backend scenarios against the in-memory device double.

use fbshow_canvas::{CanvasConfig, CanvasError, ChannelOrder, FbCanvas, Rotation};
use fbshow_fbdev::{Error, FbDevice, MemFbDevice, VarScreenInfo};

const PX: usize = 4;

fn open(device: MemFbDevice, config: CanvasConfig) -> FbCanvas<MemFbDevice> {
    FbCanvas::with_device(device, config).unwrap()
}

fn fill_solid(canvas: &mut FbCanvas<MemFbDevice>, pixel: [u8; PX]) {
    for px in canvas.draw_buf_mut().chunks_exact_mut(PX) {
        px.copy_from_slice(&pixel);
    }
}

fn region(canvas: &FbCanvas<MemFbDevice>, index: usize) -> Vec<u8> {
    let surface = canvas.draw_surface();
    let frame = surface.height as usize * surface.row_bytes as usize;
    canvas.device().mem()[index * frame..(index + 1) * frame].to_vec()
}

#[test]
fn draw_surface_matches_native_geometry() {
    let canvas = open(MemFbDevice::new(640, 480), CanvasConfig::new());
    let surface = canvas.draw_surface();
    assert_eq!((surface.width, surface.height), (640, 480));
    assert_eq!(surface.row_bytes, 640 * 4);
    assert_eq!(surface.pixel_bytes, 4);
}

#[test]
fn quarter_turn_rotation_swaps_draw_surface_axes() {
    for rotation in [Rotation::Rotate90, Rotation::Rotate270] {
        let canvas = open(
            MemFbDevice::new(640, 480),
            CanvasConfig::new().set_rotation(rotation),
        );
        let surface = canvas.draw_surface();
        assert_eq!((surface.width, surface.height), (480, 640));
    }
}

#[test]
fn double_buffering_needs_exactly_two_frames_of_memory() {
    // 4x2 at 16 bytes per row: one frame is 32 bytes.
    let canvas = open(MemFbDevice::new(4, 2).with_smem_len(64), CanvasConfig::new());
    assert!(canvas.is_double_buffered());
    assert_eq!(canvas.displayed_index(), Some(0));

    let canvas = open(MemFbDevice::new(4, 2).with_smem_len(63), CanvasConfig::new());
    assert!(!canvas.is_double_buffered());
    assert_eq!(canvas.displayed_index(), None);
}

#[test]
fn open_zero_fills_device_memory_and_cycles_power() {
    let canvas = open(MemFbDevice::new(4, 2), CanvasConfig::new());
    assert!(canvas.device().mem().iter().all(|&b| b == 0));
    // Blank then unblank around initialization.
    assert_eq!(canvas.device().blanks(), &[true, false]);
    // Panned to region 0 with a two-frame virtual height.
    assert_eq!(canvas.device().pans().len(), 1);
    assert_eq!(canvas.device().pans()[0].yoffset, 0);
    assert_eq!(canvas.device().pans()[0].yres_virtual, 4);
}

#[test]
fn single_buffered_flip_copies_and_retains_the_draw_surface() {
    let mut canvas = open(MemFbDevice::new(4, 2).with_smem_len(32), CanvasConfig::new());
    fill_solid(&mut canvas, [1, 2, 3, 4]);
    canvas.flip();

    let frame: Vec<u8> = [1, 2, 3, 4].repeat(8);
    assert_eq!(canvas.device().mem(), &frame[..]);
    // Content is retained for the next frame; flipping again shows the same
    // pixels without intervening writes.
    assert_eq!(canvas.draw_buf(), &frame[..]);
    canvas.flip();
    assert_eq!(canvas.device().mem(), &frame[..]);
    // No panning in single-buffered mode.
    assert_eq!(canvas.device().pans().len(), 0);
}

#[test]
fn single_buffered_reorder_swaps_every_pixel_on_the_way_out() {
    let mut canvas = open(
        MemFbDevice::new(4, 2).with_smem_len(32),
        CanvasConfig::new().set_channel_order(ChannelOrder::Bgra),
    );
    fill_solid(&mut canvas, [1, 2, 3, 4]);
    canvas.flip();

    for px in canvas.device().mem().chunks_exact(PX) {
        assert_eq!(px, &[3, 2, 1, 4]);
    }
    // The source buffer is untouched in single-buffered mode.
    for px in canvas.draw_buf().chunks_exact(PX) {
        assert_eq!(px, &[1, 2, 3, 4]);
    }
}

#[test]
fn double_buffered_flip_cycles_regions_and_keeps_frame_content() {
    // 4x2 native frame, no rotation, no reorder, room for two frames.
    let mut canvas = open(MemFbDevice::new(4, 2), CanvasConfig::new());
    assert!(canvas.is_double_buffered());

    fill_solid(&mut canvas, [9, 8, 7, 6]);
    canvas.flip();

    let frame: Vec<u8> = [9, 8, 7, 6].repeat(8);
    assert_eq!(canvas.displayed_index(), Some(1));
    assert_eq!(canvas.device().displayed_yoffset(), 2);
    assert_eq!(region(&canvas, 1), frame);
    // The vacated region 0 is now the draw surface, holding the same frame.
    assert_eq!(canvas.draw_buf(), &frame[..]);

    canvas.flip();
    assert_eq!(canvas.displayed_index(), Some(0));
    assert_eq!(canvas.device().displayed_yoffset(), 0);
    // Flipping twice without writes shows the same visible content.
    assert_eq!(region(&canvas, 0), frame);
}

#[test]
fn double_buffered_reorder_swaps_the_source_after_the_copy() {
    let mut canvas = open(
        MemFbDevice::new(4, 2),
        CanvasConfig::new().set_channel_order(ChannelOrder::Bgra),
    );
    fill_solid(&mut canvas, [1, 2, 3, 4]);
    canvas.flip();

    // The target receives the unswapped bytes; the swap is applied to the
    // buffer that was copied from, which then seeds the next draw surface.
    assert_eq!(region(&canvas, 1), [1, 2, 3, 4].repeat(8));
    assert_eq!(canvas.draw_buf(), &[3, 2, 1, 4].repeat(8)[..]);
}

#[test]
fn half_turn_flip_reverses_pixel_order() {
    // 2x2 native frame, 180 degree rotation: [A,B,C,D] -> [D,C,B,A].
    let mut canvas = open(
        MemFbDevice::new(2, 2),
        CanvasConfig::new().set_rotation(Rotation::Rotate180),
    );
    let buf = canvas.draw_buf_mut();
    for (px, byte) in [b'A', b'B', b'C', b'D'].into_iter().enumerate() {
        buf[px * PX..px * PX + PX].copy_from_slice(&[byte; PX]);
    }
    canvas.flip();

    let published = region(&canvas, 1);
    for (px, byte) in [b'D', b'C', b'B', b'A'].into_iter().enumerate() {
        assert_eq!(&published[px * PX..px * PX + PX], &[byte; PX]);
    }
}

#[test]
fn rotated_mode_keeps_the_heap_surface_as_draw_target() {
    let mut canvas = open(
        MemFbDevice::new(4, 2),
        CanvasConfig::new().set_rotation(Rotation::Rotate90),
    );
    fill_solid(&mut canvas, [5, 5, 5, 5]);

    canvas.flip();
    assert_eq!(canvas.displayed_index(), Some(1));
    canvas.flip();
    assert_eq!(canvas.displayed_index(), Some(0));

    // The temp surface is reused untouched as the canvas between flips.
    for px in canvas.draw_buf().chunks_exact(PX) {
        assert_eq!(px, &[5, 5, 5, 5]);
    }
}

#[test]
fn quarter_turn_places_first_draw_row_in_last_native_column() {
    // 4x2 native, rotated 90: the draw surface is 2 wide and 4 tall. Its
    // pixel (row i, col j) lands at native flat index 3 + 4j - i.
    let mut canvas = open(
        MemFbDevice::new(4, 2),
        CanvasConfig::new().set_rotation(Rotation::Rotate90),
    );
    let buf = canvas.draw_buf_mut();
    for px in 0..8 {
        buf[px * PX..px * PX + PX].copy_from_slice(&[px as u8; PX]);
    }
    canvas.flip();

    let published = region(&canvas, 1);
    // Inverting dst = 3 + 4j - i with src = 2i + j over the 4x2 frame.
    let expected: [u8; 8] = [6, 4, 2, 0, 7, 5, 3, 1];
    for (native_px, &src_px) in expected.iter().enumerate() {
        assert_eq!(
            &published[native_px * PX..native_px * PX + PX],
            &[src_px; PX],
            "native pixel {}",
            native_px
        );
    }
}

#[test]
fn map_failure_aborts_initialization() {
    let result = FbCanvas::with_device(MemFbDevice::new(4, 2).fail_map(), CanvasConfig::new());
    assert!(matches!(
        result,
        Err(CanvasError::Device(Error::MapFailed(_)))
    ));
}

#[test]
fn layout_query_failures_abort_initialization() {
    assert!(matches!(
        FbCanvas::with_device(MemFbDevice::new(4, 2).fail_fixed_info(), CanvasConfig::new()),
        Err(CanvasError::Device(Error::FixedInfoQueryFailed(_)))
    ));
    assert!(matches!(
        FbCanvas::with_device(MemFbDevice::new(4, 2).fail_var_info(), CanvasConfig::new()),
        Err(CanvasError::Device(Error::VarInfoQueryFailed(_)))
    ));
    assert!(matches!(
        FbCanvas::with_device(
            MemFbDevice::new(4, 2).fail_put_var_info(),
            CanvasConfig::new()
        ),
        Err(CanvasError::Device(Error::VarInfoUpdateFailed(_)))
    ));
}

#[test]
fn refusing_32bpp_is_fatal() {
    let stubborn = VarScreenInfo {
        xres: 4,
        yres: 2,
        bits_per_pixel: 16,
        ..VarScreenInfo::default()
    };
    let result = FbCanvas::with_device(
        MemFbDevice::new(4, 2).honor_var_info(stubborn),
        CanvasConfig::new(),
    );
    assert!(matches!(
        result,
        Err(CanvasError::UnsupportedPixelFormat { bits_per_pixel: 16 })
    ));
}

#[test]
fn misreported_channel_order_is_accepted() {
    // 32bpp with B/G/R/A offsets: warned about, not fatal.
    let mut reported = VarScreenInfo {
        xres: 4,
        yres: 2,
        bits_per_pixel: 32,
        ..VarScreenInfo::default()
    };
    reported.red = fbshow_fbdev::ChannelLayout::new(16, 8);
    reported.green = fbshow_fbdev::ChannelLayout::new(8, 8);
    reported.blue = fbshow_fbdev::ChannelLayout::new(0, 8);
    reported.transp = fbshow_fbdev::ChannelLayout::new(24, 8);

    let canvas = FbCanvas::with_device(
        MemFbDevice::new(4, 2).honor_var_info(reported),
        CanvasConfig::new(),
    );
    assert!(canvas.is_ok());
}

#[test]
fn pan_failure_still_advances_the_displayed_index() {
    let mut canvas = open(MemFbDevice::new(4, 2).fail_pan(), CanvasConfig::new());
    assert!(canvas.is_double_buffered());
    assert_eq!(canvas.device().pans().len(), 0);

    fill_solid(&mut canvas, [1, 1, 1, 1]);
    canvas.flip();
    // Best-effort: the device saw nothing, the bookkeeping moved on.
    assert_eq!(canvas.displayed_index(), Some(1));
    assert_eq!(canvas.device().pans().len(), 0);
}

#[test]
fn blank_failure_is_swallowed() {
    let mut canvas = open(MemFbDevice::new(4, 2).fail_blank(), CanvasConfig::new());
    canvas.blank(true);
    assert_eq!(canvas.device().blanks().len(), 0);
}

#[test]
fn shutdown_consumes_the_canvas() {
    let canvas = open(MemFbDevice::new(4, 2), CanvasConfig::new());
    canvas.shutdown();
}
