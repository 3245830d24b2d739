// THEORY:
// Drawing is a collaborator, not part of the core: the annotator only *requests*
// boxes, lines and text, and the host decides what a request means. The
// `DrawingSurface` trait is that seam.
//
// Two surfaces ship with the crate:
// - `DrawCommandLog` records every request in order. It is what tests assert on and
//   what a host uses to defer rendering until a frame has succeeded (`replay`).
// - `Canvas` rasterizes boxes and lines onto a 3-channel `Image`, clipping anything
//   that falls outside it. Glyph rendering is left to the host; text requests are
//   kept as `TextLabel`s.

use crate::core_modules::frame_buffer::Image;
use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::region::{BoundingBox, Point};

/// The display's fixed colour set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayColor {
    Red,
    Blue,
    Green,
    Cyan,
    White,
    Black,
}

impl DisplayColor {
    /// Sensor-order (BGR) value.
    pub const fn bgr(self) -> Pixel {
        match self {
            DisplayColor::Red => Pixel::new(0, 0, 255),
            DisplayColor::Blue => Pixel::new(255, 0, 0),
            DisplayColor::Green => Pixel::new(0, 255, 0),
            DisplayColor::Cyan => Pixel::new(255, 255, 0),
            DisplayColor::White => Pixel::new(255, 255, 255),
            DisplayColor::Black => Pixel::new(0, 0, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextSize {
    #[default]
    Small,
    Large,
}

/// Receives the annotator's drawing requests.
pub trait DrawingSurface {
    fn draw_bounding_box(&mut self, bbox: BoundingBox, filled: bool, color: DisplayColor);
    fn draw_line(&mut self, from: Point, to: Point, color: DisplayColor);
    fn draw_text(&mut self, at: Point, size: TextSize, color: DisplayColor, text: &str);
}

/// One recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawCommand {
    BoundingBox {
        bbox: BoundingBox,
        filled: bool,
        color: DisplayColor,
    },
    Line {
        from: Point,
        to: Point,
        color: DisplayColor,
    },
    Text {
        at: Point,
        size: TextSize,
        color: DisplayColor,
        text: String,
    },
}

/// Records requests in the order they were made.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawCommandLog {
    pub commands: Vec<DrawCommand>,
}

impl DrawCommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn boxes(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::BoundingBox { .. }))
            .count()
    }

    pub fn lines(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Line { .. }))
            .count()
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Re-issues every recorded request to another surface.
    pub fn replay(&self, surface: &mut dyn DrawingSurface) {
        for command in &self.commands {
            match command {
                DrawCommand::BoundingBox { bbox, filled, color } => {
                    surface.draw_bounding_box(*bbox, *filled, *color)
                }
                DrawCommand::Line { from, to, color } => surface.draw_line(*from, *to, *color),
                DrawCommand::Text {
                    at,
                    size,
                    color,
                    text,
                } => surface.draw_text(*at, *size, *color, text),
            }
        }
    }
}

impl DrawingSurface for DrawCommandLog {
    fn draw_bounding_box(&mut self, bbox: BoundingBox, filled: bool, color: DisplayColor) {
        self.commands.push(DrawCommand::BoundingBox { bbox, filled, color });
    }

    fn draw_line(&mut self, from: Point, to: Point, color: DisplayColor) {
        self.commands.push(DrawCommand::Line { from, to, color });
    }

    fn draw_text(&mut self, at: Point, size: TextSize, color: DisplayColor, text: &str) {
        self.commands.push(DrawCommand::Text {
            at,
            size,
            color,
            text: text.to_owned(),
        });
    }
}

/// A text request the canvas could not render itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLabel {
    pub at: Point,
    pub size: TextSize,
    pub color: DisplayColor,
    pub text: String,
}

/// Rasterizes requests onto a colour image.
#[derive(Debug)]
pub struct Canvas<'a> {
    target: &'a mut Image,
    pub labels: Vec<TextLabel>,
}

impl<'a> Canvas<'a> {
    pub fn new(target: &'a mut Image) -> Self {
        Self {
            target,
            labels: Vec::new(),
        }
    }

    fn plot(&mut self, x: i32, y: i32, color: Pixel) {
        if x < 0 || y < 0 {
            return;
        }
        if let Some(p) = self.target.pixel_mut(x as u32, y as u32) {
            if p.len() == 3 {
                p.copy_from_slice(&color.to_array());
            }
        }
    }
}

impl DrawingSurface for Canvas<'_> {
    fn draw_bounding_box(&mut self, bbox: BoundingBox, filled: bool, color: DisplayColor) {
        let c = color.bgr();
        if filled {
            for y in bbox.top..=bbox.bottom {
                for x in bbox.left..=bbox.right {
                    self.plot(x, y, c);
                }
            }
            return;
        }
        for x in bbox.left..=bbox.right {
            self.plot(x, bbox.top, c);
            self.plot(x, bbox.bottom, c);
        }
        for y in bbox.top..=bbox.bottom {
            self.plot(bbox.left, y, c);
            self.plot(bbox.right, y, c);
        }
    }

    /// Bresenham, all octants.
    fn draw_line(&mut self, from: Point, to: Point, color: DisplayColor) {
        let c = color.bgr();
        let (mut x, mut y) = (from.x, from.y);
        let dx = (to.x - from.x).abs();
        let dy = -(to.y - from.y).abs();
        let sx = if from.x < to.x { 1 } else { -1 };
        let sy = if from.y < to.y { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.plot(x, y, c);
            if x == to.x && y == to.y {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn draw_text(&mut self, at: Point, size: TextSize, color: DisplayColor, text: &str) {
        self.labels.push(TextLabel {
            at,
            size,
            color,
            text: text.to_owned(),
        });
    }
}
