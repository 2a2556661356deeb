//! Drawing seam between pages and whatever actually puts pixels on the panel.
//!
//! The core never rasterizes anything itself; widgets issue a handful of
//! primitive calls and the backend decides how to draw them. The
//! [`RecordingSurface`] keeps every call so headless runs and tests can
//! inspect exactly what each frame contained.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(
                f,
                "#{:02x}{:02x}{:02x}{:02x}",
                self.r, self.g, self.b, self.a
            )
        }
    }
}

impl FromStr for Color {
    type Err = String;

    /// Parses `#rrggbb` or `#rrggbbaa`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        let channel = |i: usize| {
            hex.get(i..i + 2)
                .and_then(|c| u8::from_str_radix(c, 16).ok())
                .ok_or_else(|| format!("invalid colour '{}'", s))
        };
        match hex.len() {
            6 => Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Ok(Color::rgba(
                channel(0)?,
                channel(2)?,
                channel(4)?,
                channel(6)?,
            )),
            _ => Err(format!("invalid colour '{}'", s)),
        }
    }
}

impl Serialize for Color {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

pub trait Surface {
    fn bounds(&self) -> Rect;

    /// Restricts subsequent drawing to `clip`. `None` removes the clip.
    fn set_clip(&mut self, clip: Option<Rect>);

    fn fill_rect(&mut self, rect: Rect, color: Color);

    fn stroke_rect(&mut self, rect: Rect, color: Color);

    fn text(&mut self, x: i32, y: i32, text: &str, color: Color);

    /// Blits the given regions to the display and ends the frame.
    fn present(&mut self, regions: &[Rect]);
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    Fill { rect: Rect, color: Color },
    Stroke { rect: Rect, color: Color },
    Text { x: i32, y: i32, text: String, color: Color },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordedFrame {
    pub ops: Vec<DrawOp>,
    pub presented: Vec<Rect>,
}

impl RecordedFrame {
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn is_full(&self, screen: Rect) -> bool {
        self.presented.iter().any(|r| r.contains(&screen))
    }
}

/// Headless surface that records draw calls, one [`RecordedFrame`] per
/// `present`. Drawing outside the current clip is discarded, as a real
/// backend would.
#[derive(Debug)]
pub struct RecordingSurface {
    bounds: Rect,
    clip: Option<Rect>,
    current: Vec<DrawOp>,
    frames: Vec<RecordedFrame>,
    max_frames: usize,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            bounds: Rect::from_size(width, height),
            clip: None,
            current: Vec::new(),
            frames: Vec::new(),
            max_frames: 1024,
        }
    }

    /// Keeps only the most recent `max` frames.
    pub fn with_history(mut self, max: usize) -> Self {
        self.max_frames = max.max(1);
        self
    }

    pub fn frames(&self) -> &[RecordedFrame] {
        &self.frames
    }

    pub fn last_frame(&self) -> Option<&RecordedFrame> {
        self.frames.last()
    }

    pub fn take_frames(&mut self) -> Vec<RecordedFrame> {
        std::mem::take(&mut self.frames)
    }

    fn visible(&self, rect: &Rect) -> bool {
        match self.clip {
            Some(clip) => clip.intersects(rect),
            None => self.bounds.intersects(rect),
        }
    }
}

impl Surface for RecordingSurface {
    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn set_clip(&mut self, clip: Option<Rect>) {
        self.clip = clip;
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        if self.visible(&rect) {
            self.current.push(DrawOp::Fill { rect, color });
        }
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color) {
        if self.visible(&rect) {
            self.current.push(DrawOp::Stroke { rect, color });
        }
    }

    fn text(&mut self, x: i32, y: i32, text: &str, color: Color) {
        if self.visible(&Rect::new(x, y, 1, 1)) {
            self.current.push(DrawOp::Text {
                x,
                y,
                text: text.to_string(),
                color,
            });
        }
    }

    fn present(&mut self, regions: &[Rect]) {
        self.frames.push(RecordedFrame {
            ops: std::mem::take(&mut self.current),
            presented: regions.to_vec(),
        });
        if self.frames.len() > self.max_frames {
            let excess = self.frames.len() - self.max_frames;
            self.frames.drain(..excess);
        }
        self.clip = None;
    }
}
