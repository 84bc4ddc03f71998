//! The client-side mirror of the server's framebuffer.

use crate::ColorMap;
use anyhow::{anyhow, Result};
use vnc_core::Rect;
use vnc_wire::messages::PixelFormat;

/// Local mirror of the remote desktop.
///
/// Geometry is fixed at creation (the protocol subset spoken here has no
/// reshape message); the pixel store is a flat row-major `Vec<u32>` of
/// ARGB words. The active wire [`PixelFormat`] and the [`ColorMap`] for
/// indexed modes live here too, since decoders need all three together.
///
/// # Memory layout
///
/// Pixel (x, y) lives at index `y * width + x`. Stride always equals the
/// width.
#[derive(Debug, Clone)]
pub struct Framebuffer {
    width: u16,
    height: u16,
    name: String,
    format: PixelFormat,
    pixels: Vec<u32>,
    color_map: ColorMap,
}

impl Framebuffer {
    /// Create a black framebuffer from the ServerInit parameters.
    pub fn new(width: u16, height: u16, format: PixelFormat, name: impl Into<String>) -> Self {
        Self {
            width,
            height,
            name: name.into(),
            format,
            pixels: vec![0u32; width as usize * height as usize],
            color_map: ColorMap::new(),
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// The desktop name the server announced.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The currently active wire pixel format.
    pub fn format(&self) -> &PixelFormat {
        &self.format
    }

    /// Replace the active pixel format (after a SetPixelFormat override).
    pub fn set_format(&mut self, format: PixelFormat) {
        self.format = format;
    }

    pub fn color_map(&self) -> &ColorMap {
        &self.color_map
    }

    /// Install color map entries received via SetColourMapEntries.
    pub fn set_color_map_entries(&mut self, first: u16, colors: &[(u8, u8, u8)]) {
        self.color_map.set_range(first, colors);
    }

    /// The whole pixel store, row-major ARGB.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Read one pixel.
    pub fn pixel(&self, x: u16, y: u16) -> Result<u32> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    /// Write one pixel.
    pub fn set_pixel(&mut self, x: u16, y: u16, argb: u32) -> Result<()> {
        let i = self.index(x, y)?;
        self.pixels[i] = argb;
        Ok(())
    }

    /// Fill a rectangle with a single ARGB value.
    pub fn fill_rect(&mut self, rect: Rect, argb: u32) -> Result<()> {
        self.validate_rect(rect)?;
        let width = self.width as usize;
        for row in rect.y..rect.bottom() {
            let start = row as usize * width + rect.x as usize;
            self.pixels[start..start + rect.width as usize].fill(argb);
        }
        Ok(())
    }

    /// Copy a region of the framebuffer onto `dst`, reading from
    /// `(src_x, src_y)`.
    ///
    /// Source and destination may overlap. Rows are walked bottom-up when
    /// the source lies above the destination so un-copied source rows are
    /// never clobbered; within a row, `copy_within` has move semantics in
    /// both directions.
    pub fn copy_rect(&mut self, dst: Rect, src_x: u16, src_y: u16) -> Result<()> {
        self.validate_rect(dst)?;
        let src = Rect::new(src_x as i32, src_y as i32, dst.width, dst.height);
        self.validate_rect(src)?;
        if dst.is_empty() {
            return Ok(());
        }

        let width = self.width as usize;
        let row_len = dst.width as usize;
        let copy_row = |pixels: &mut Vec<u32>, row: usize| {
            let from = (src_y as usize + row) * width + src_x as usize;
            let to = (dst.y as usize + row) * width + dst.x as usize;
            pixels.copy_within(from..from + row_len, to);
        };

        if (src_y as i32) < dst.y {
            for row in (0..dst.height as usize).rev() {
                copy_row(&mut self.pixels, row);
            }
        } else {
            for row in 0..dst.height as usize {
                copy_row(&mut self.pixels, row);
            }
        }
        Ok(())
    }

    /// Check that a rectangle lies within the framebuffer.
    pub fn validate_rect(&self, rect: Rect) -> Result<()> {
        if rect.x < 0
            || rect.y < 0
            || rect.right() > self.width as i32
            || rect.bottom() > self.height as i32
        {
            return Err(anyhow!(
                "rectangle {:?} outside framebuffer {}x{}",
                rect,
                self.width,
                self.height
            ));
        }
        Ok(())
    }

    fn index(&self, x: u16, y: u16) -> Result<usize> {
        if x >= self.width || y >= self.height {
            return Err(anyhow!(
                "pixel ({}, {}) outside framebuffer {}x{}",
                x,
                y,
                self.width,
                self.height
            ));
        }
        Ok(y as usize * self.width as usize + x as usize)
    }
}
