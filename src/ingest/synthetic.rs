//! Synthetic pitch imagery for `stub://` sources.

use crate::frame::RGB_CHANNELS;

const STRIPE_WIDTH: u32 = 40;
const LIGHT_GRASS: [u8; 3] = [56, 142, 60];
const DARK_GRASS: [u8; 3] = [46, 125, 50];

/// Mown-grass stripes that scroll one pixel per frame.
pub(crate) fn pitch_pixels(width: u32, height: u32, frame_index: u64) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * RGB_CHANNELS);
    let offset = (frame_index % u64::from(STRIPE_WIDTH * 2)) as u32;
    for _ in 0..height {
        for x in 0..width {
            let stripe = ((x + offset) / STRIPE_WIDTH) % 2;
            let color = if stripe == 0 { LIGHT_GRASS } else { DARK_GRASS };
            pixels.extend_from_slice(&color);
        }
    }
    pixels
}
