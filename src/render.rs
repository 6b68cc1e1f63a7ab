//! # Screen Rendering
//!
//! Draws [`Screen`]s into a tri-colour frame buffer with embedded-graphics.
//!
//! ## Buffer layout
//! The panel is 152×296 pixels in its native portrait orientation. The ticker
//! is read in landscape, so drawing happens in a 296×152 coordinate space and
//! [`FrameBuffer::set_pixel`] rotates into the native planes:
//!
//! - **black plane**: 1 bit per pixel, `1` = white, `0` = black
//! - **red plane**: 1 bit per pixel, `1` = red, `0` = no red
//!
//! Each native row is `ceil(152 / 8) = 19` bytes, MSB first.

use crate::display::Screen;
use core::convert::Infallible;
use embedded_graphics::{
    mono_font::{
        ascii::{FONT_10X20, FONT_6X10},
        MonoTextStyle,
    },
    pixelcolor::PixelColor,
    prelude::*,
    text::{Baseline, Text},
};

/// Native panel width (pixels per RAM row)
pub const NATIVE_WIDTH: u32 = 152;
/// Native panel height (RAM rows)
pub const NATIVE_HEIGHT: u32 = 296;

/// Logical drawing width (landscape)
pub const WIDTH: u32 = NATIVE_HEIGHT;
/// Logical drawing height (landscape)
pub const HEIGHT: u32 = NATIVE_WIDTH;

/// Ink colours the panel can show.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InkColor {
    White,
    Black,
    Red,
}

impl PixelColor for InkColor {
    type Raw = ();
}

/// Black and red bit planes for the tri-colour panel.
#[derive(Clone, Debug)]
pub struct FrameBuffer {
    black: Vec<u8>,
    red: Vec<u8>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    pub const BYTES_PER_ROW: usize = NATIVE_WIDTH.div_ceil(8) as usize;
    pub const PLANE_LEN: usize = Self::BYTES_PER_ROW * NATIVE_HEIGHT as usize;

    pub fn new() -> Self {
        Self {
            black: vec![0xFF; Self::PLANE_LEN], // White by default
            red: vec![0x00; Self::PLANE_LEN],   // No red by default
        }
    }

    pub fn fill(&mut self, color: InkColor) {
        match color {
            InkColor::White => {
                self.black.fill(0xFF);
                self.red.fill(0x00);
            }
            InkColor::Black => {
                self.black.fill(0x00);
                self.red.fill(0x00);
            }
            InkColor::Red => {
                self.black.fill(0xFF);
                self.red.fill(0xFF);
            }
        }
    }

    pub fn black_plane(&self) -> &[u8] {
        &self.black
    }

    pub fn red_plane(&self) -> &[u8] {
        &self.red
    }

    /// Byte index and bit mask of a logical (landscape) coordinate.
    fn locate(x: u32, y: u32) -> Option<(usize, u8)> {
        if x >= WIDTH || y >= HEIGHT {
            return None;
        }
        // Rotate 90° clockwise into the portrait RAM layout.
        let native_x = NATIVE_WIDTH - 1 - y;
        let native_y = x;
        let index = native_y as usize * Self::BYTES_PER_ROW + (native_x / 8) as usize;
        Some((index, 0x80 >> (native_x % 8)))
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: InkColor) {
        let Some((index, mask)) = Self::locate(x, y) else {
            return;
        };
        match color {
            InkColor::White => {
                self.black[index] |= mask;
                self.red[index] &= !mask;
            }
            InkColor::Black => {
                self.black[index] &= !mask;
                self.red[index] &= !mask;
            }
            InkColor::Red => {
                self.black[index] |= mask;
                self.red[index] |= mask;
            }
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<InkColor> {
        let (index, mask) = Self::locate(x, y)?;
        Some(if self.red[index] & mask != 0 {
            InkColor::Red
        } else if self.black[index] & mask == 0 {
            InkColor::Black
        } else {
            InkColor::White
        })
    }

    /// Count of black and red pixels, handy for sanity checks in logs.
    pub fn ink_counts(&self) -> (u32, u32) {
        let black = self.black.iter().map(|b| b.count_zeros()).sum();
        let red = self.red.iter().map(|b| b.count_ones()).sum();
        (black, red)
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(WIDTH, HEIGHT)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = InkColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0 && point.y >= 0 {
                self.set_pixel(point.x as u32, point.y as u32, color);
            }
        }
        Ok(())
    }
}

/// Draw a screen onto a cleared buffer.
pub fn draw_screen(buffer: &mut FrameBuffer, screen: &Screen) {
    let small = MonoTextStyle::new(&FONT_6X10, InkColor::Black);
    let large = MonoTextStyle::new(&FONT_10X20, InkColor::Black);

    match screen {
        Screen::Message(lines) => {
            for (line, y) in lines.iter().zip([10, 40, 70]) {
                Text::with_baseline(line, Point::new(5, y), small, Baseline::Top)
                    .draw(buffer)
                    .ok();
            }
        }
        Screen::Price(view) => {
            Text::with_baseline(&view.name, Point::new(10, 10), large, Baseline::Top)
                .draw(buffer)
                .ok();
            Text::with_baseline(&view.price, Point::new(10, 50), large, Baseline::Top)
                .draw(buffer)
                .ok();

            let change_style = if view.change_negative {
                MonoTextStyle::new(&FONT_10X20, InkColor::Red)
            } else {
                large
            };
            Text::with_baseline(&view.change, Point::new(10, 100), change_style, Baseline::Top)
                .draw(buffer)
                .ok();

            Text::with_baseline(&view.updated, Point::new(10, 135), small, Baseline::Top)
                .draw(buffer)
                .ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::PriceView;

    fn price_screen(change: &str, negative: bool) -> Screen {
        Screen::Price(PriceView {
            name: "Bitcoin".to_string(),
            price: "$65,000.50".to_string(),
            change: change.to_string(),
            change_negative: negative,
            updated: "Updated 8:14PM".to_string(),
        })
    }

    #[test]
    fn test_new_buffer_is_white() {
        let buffer = FrameBuffer::new();
        assert_eq!(buffer.black_plane().len(), 19 * 296);
        assert_eq!(buffer.ink_counts(), (0, 0));
        assert_eq!(buffer.pixel(0, 0), Some(InkColor::White));
    }

    #[test]
    fn test_set_pixel_and_bounds() {
        let mut buffer = FrameBuffer::new();
        buffer.set_pixel(10, 20, InkColor::Red);
        buffer.set_pixel(11, 20, InkColor::Black);
        buffer.set_pixel(WIDTH, 0, InkColor::Black);

        assert_eq!(buffer.pixel(10, 20), Some(InkColor::Red));
        assert_eq!(buffer.pixel(11, 20), Some(InkColor::Black));
        assert_eq!(buffer.pixel(WIDTH, 0), None);
        assert_eq!(buffer.ink_counts(), (1, 1));

        buffer.set_pixel(10, 20, InkColor::White);
        assert_eq!(buffer.ink_counts(), (1, 0));
    }

    #[test]
    fn test_negative_change_uses_red() {
        let mut buffer = FrameBuffer::new();
        draw_screen(&mut buffer, &price_screen("-2.30%", true));
        let (black, red) = buffer.ink_counts();
        assert!(black > 0);
        assert!(red > 0);
    }

    #[test]
    fn test_positive_change_stays_black() {
        let mut buffer = FrameBuffer::new();
        draw_screen(&mut buffer, &price_screen("+1.20%", false));
        assert_eq!(buffer.ink_counts().1, 0);
    }

    #[test]
    fn test_message_draws_text() {
        let mut buffer = FrameBuffer::new();
        draw_screen(&mut buffer, &Screen::message(&["Config Mode"]));
        assert!(buffer.ink_counts().0 > 0);

        buffer.fill(InkColor::White);
        assert_eq!(buffer.ink_counts(), (0, 0));
    }
}
