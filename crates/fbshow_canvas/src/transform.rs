//! Pixel transforms applied while publishing a frame: the three rotation
//! copies and the red/blue channel swap.
//!
//! The rotation copies work on flat pixel indices in the native-oriented
//! destination buffer, so they assume an unpadded destination row length of
//! `native_width` pixels. Each mapping is a bijection over the frame: every
//! source pixel lands on exactly one destination pixel and vice versa.

use crate::BYTES_PER_PIXEL;

const PX: usize = BYTES_PER_PIXEL as usize;

/// 90 degree rotation. `src` is in post-rotation orientation
/// (`native_height` pixels wide, `native_width` tall), `dst` is native.
pub(crate) fn copy_rotate_90(src: &[u8], dst: &mut [u8], native_width: usize, native_height: usize) {
    for i in 0..native_width {
        for j in 0..native_height {
            let src_px = native_height * i + j;
            let dst_px = native_width - 1 + native_width * j - i;
            dst[dst_px * PX..dst_px * PX + PX]
                .copy_from_slice(&src[src_px * PX..src_px * PX + PX]);
        }
    }
}

/// 180 degree rotation: destination index `total - 1 - source index`.
pub(crate) fn copy_rotate_180(src: &[u8], dst: &mut [u8], native_width: usize, native_height: usize) {
    let total = native_width * native_height;
    for src_px in 0..total {
        let dst_px = total - 1 - src_px;
        dst[dst_px * PX..dst_px * PX + PX].copy_from_slice(&src[src_px * PX..src_px * PX + PX]);
    }
}

/// 270 degree rotation, same orientation convention as [`copy_rotate_90`].
pub(crate) fn copy_rotate_270(src: &[u8], dst: &mut [u8], native_width: usize, native_height: usize) {
    for i in 0..native_width {
        for j in 0..native_height {
            let src_px = native_height * i + j;
            let dst_px = native_width * (native_height - 1) - native_width * j + i;
            dst[dst_px * PX..dst_px * PX + PX]
                .copy_from_slice(&src[src_px * PX..src_px * PX + PX]);
        }
    }
}

/// Copy `src` into `dst` swapping bytes 0 and 2 of every pixel. Bytes 1 and
/// 3 are copied through unchanged.
pub(crate) fn copy_swap_red_blue(src: &[u8], dst: &mut [u8]) {
    for (dst_px, src_px) in dst.chunks_exact_mut(PX).zip(src.chunks_exact(PX)) {
        dst_px[0] = src_px[2];
        dst_px[1] = src_px[1];
        dst_px[2] = src_px[0];
        dst_px[3] = src_px[3];
    }
}

/// Swap bytes 0 and 2 of every pixel in place.
pub(crate) fn swap_red_blue_in_place(buf: &mut [u8]) {
    for px in buf.chunks_exact_mut(PX) {
        px.swap(0, 2);
    }
}

/// Frame where every pixel's bytes are its own index, little-endian.
#[cfg(test)]
fn index_frame(total: usize) -> Vec<u8> {
    let mut frame = vec![0u8; total * PX];
    for px in 0..total {
        frame[px * PX..px * PX + PX].copy_from_slice(&(px as u32).to_le_bytes());
    }
    frame
}

#[cfg(test)]
fn decode(frame: &[u8], px: usize) -> u32 {
    u32::from_le_bytes(frame[px * PX..px * PX + PX].try_into().unwrap())
}

/// Check that `rotate` maps every source index to a unique destination and
/// covers the whole destination frame.
#[cfg(test)]
fn assert_bijection(rotate: fn(&[u8], &mut [u8], usize, usize), width: usize, height: usize) {
    let total = width * height;
    let src = index_frame(total);
    let mut dst = vec![0xffu8; total * PX];
    rotate(&src, &mut dst, width, height);

    let mut seen = vec![false; total];
    for dst_px in 0..total {
        let src_px = decode(&dst, dst_px) as usize;
        assert!(src_px < total, "dst {} holds out-of-range source {}", dst_px, src_px);
        assert!(!seen[src_px], "source {} written to two destinations", src_px);
        seen[src_px] = true;
    }
    assert!(seen.iter().all(|&s| s));
}

#[test]
fn rotate_90_is_a_bijection() {
    assert_bijection(copy_rotate_90, 4, 2);
    assert_bijection(copy_rotate_90, 5, 3);
    assert_bijection(copy_rotate_90, 1, 7);
}

#[test]
fn rotate_180_is_a_bijection() {
    assert_bijection(copy_rotate_180, 4, 2);
    assert_bijection(copy_rotate_180, 5, 3);
}

#[test]
fn rotate_270_is_a_bijection() {
    assert_bijection(copy_rotate_270, 4, 2);
    assert_bijection(copy_rotate_270, 5, 3);
    assert_bijection(copy_rotate_270, 7, 1);
}

#[test]
fn rotate_90_sends_top_left_to_top_right() {
    // Source (0,0) must land in the last column of the first native row.
    let src = index_frame(6);
    let mut dst = vec![0u8; 6 * PX];
    copy_rotate_90(&src, &mut dst, 3, 2);
    assert_eq!(decode(&dst, 2), 0);
}

#[test]
fn rotate_180_reverses_2x2() {
    // [A, B, C, D] row-major must come out as [D, C, B, A].
    let mut src = vec![0u8; 4 * PX];
    for (px, byte) in [b'A', b'B', b'C', b'D'].into_iter().enumerate() {
        src[px * PX..px * PX + PX].copy_from_slice(&[byte; PX]);
    }
    let mut dst = vec![0u8; 4 * PX];
    copy_rotate_180(&src, &mut dst, 2, 2);
    for (px, byte) in [b'D', b'C', b'B', b'A'].into_iter().enumerate() {
        assert_eq!(&dst[px * PX..px * PX + PX], &[byte; PX]);
    }
}

#[test]
fn swap_copy_touches_only_bytes_0_and_2() {
    let src: Vec<u8> = (0..4 * PX as u8).collect();
    let mut dst = vec![0u8; src.len()];
    copy_swap_red_blue(&src, &mut dst);
    for px in 0..4 {
        let s = &src[px * PX..px * PX + PX];
        let d = &dst[px * PX..px * PX + PX];
        assert_eq!(d, &[s[2], s[1], s[0], s[3]]);
    }
}

#[test]
fn in_place_swap_matches_copy_swap() {
    let src: Vec<u8> = (0..8 * PX as u8).collect();
    let mut copied = vec![0u8; src.len()];
    copy_swap_red_blue(&src, &mut copied);

    let mut swapped = src.clone();
    swap_red_blue_in_place(&mut swapped);
    assert_eq!(swapped, copied);
}
