use std::fmt::Display;

use serde::{Serialize, Serializer};

/// An RGBA color, rendered as `rgba(r, g, b, a)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// Same color with a different alpha, clamped to `0.0..=1.0`.
    pub fn with_alpha(self, a: f64) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }
}

impl Display for Rgba {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

impl Serialize for Rgba {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Red, green, blue, purple, orange.
pub const PALETTE: [Rgba; 5] = [
    Rgba::new(255, 0, 0, 1.0),
    Rgba::new(0, 255, 0, 1.0),
    Rgba::new(0, 0, 255, 1.0),
    Rgba::new(128, 0, 128, 1.0),
    Rgba::new(255, 165, 0, 1.0),
];

/// Color of `label`. Labels wrap around the palette, so with more than
/// `PALETTE.len()` clusters distinct clusters share a color.
pub fn color_for_label(label: usize, n_clusters: usize) -> Rgba {
    if n_clusters > PALETTE.len() {
        tracing::trace!(
            n_clusters,
            "More clusters than palette colors; colors will repeat"
        );
    }
    PALETTE[label % PALETTE.len()]
}
