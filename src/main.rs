use fbshow_canvas::{CanvasConfig, FbCanvas, Result};
use std::{env, thread, time::Duration};

const FRAME_DELAY: Duration = Duration::from_millis(33);

/// Animate a scrolling gradient on the framebuffer until interrupted.
pub fn go() -> Result<()> {
    let path = env::var("FBSHOW_DEVICE").unwrap_or_else(|_| "/dev/fb0".to_string());
    let mut canvas = FbCanvas::open_at(&path, CanvasConfig::new())?;
    let size = canvas.size();
    let row_bytes = canvas.draw_surface().row_bytes as usize;

    let mut tick: u32 = 0;
    loop {
        let buf = canvas.draw_buf_mut();
        for y in 0..size.y {
            for x in 0..size.x {
                let offset = y as usize * row_bytes + x as usize * 4;
                buf[offset] = (x.wrapping_add(tick) & 0xff) as u8;
                buf[offset + 1] = (y.wrapping_add(tick) & 0xff) as u8;
                buf[offset + 2] = ((x ^ y) & 0xff) as u8;
                buf[offset + 3] = 0xff;
            }
        }
        canvas.flip();
        tick = tick.wrapping_add(2);
        thread::sleep(FRAME_DELAY);
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = go() {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
