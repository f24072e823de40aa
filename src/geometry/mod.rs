//! Geometric primitives and the signature block resolver.
//!
//! All coordinates are PDF user-space points with the origin at the lower-left
//! corner of the page and y growing upwards.

use serde::{Deserialize, Serialize};

/// Millimetres to points.
pub const MM_TO_PT: f32 = 72.0 / 25.4;

/// Narrowest block the resolver will produce when the margin has to be clamped.
pub const MIN_BLOCK_WIDTH: f32 = 72.0;

/// A 2D point in page space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
}

impl Point {
    /// Create a new point.
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in page space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// X coordinate of the lower-left corner
    pub x: f32,
    /// Y coordinate of the lower-left corner
    pub y: f32,
    /// Width of rectangle
    pub width: f32,
    /// Height of rectangle
    pub height: f32,
}

impl Rect {
    /// Create a new rectangle from its lower-left corner and dimensions.
    ///
    /// # Examples
    ///
    /// ```
    /// use pades_signer::geometry::Rect;
    ///
    /// let rect = Rect::new(0.0, 0.0, 100.0, 50.0);
    /// assert_eq!(rect.x1(), 100.0);
    /// assert_eq!(rect.y1(), 50.0);
    /// ```
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a rectangle from two corner points.
    ///
    /// The corners may be given in any order, as PDF rectangle arrays often are.
    ///
    /// # Examples
    ///
    /// ```
    /// use pades_signer::geometry::Rect;
    ///
    /// let rect = Rect::from_points(110.0, 70.0, 10.0, 20.0);
    /// assert_eq!(rect.x, 10.0);
    /// assert_eq!(rect.y, 20.0);
    /// assert_eq!(rect.width, 100.0);
    /// assert_eq!(rect.height, 50.0);
    /// ```
    pub fn from_points(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        let (left, right) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
        let (bottom, top) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        Self {
            x: left,
            y: bottom,
            width: right - left,
            height: top - bottom,
        }
    }

    /// Left edge.
    pub fn x0(&self) -> f32 {
        self.x
    }

    /// Bottom edge.
    pub fn y0(&self) -> f32 {
        self.y
    }

    /// Right edge.
    pub fn x1(&self) -> f32 {
        self.x + self.width
    }

    /// Top edge.
    pub fn y1(&self) -> f32 {
        self.y + self.height
    }

    /// Corners as `[x0, y0, x1, y1]`.
    pub fn corners(&self) -> [f32; 4] {
        [self.x0(), self.y0(), self.x1(), self.y1()]
    }

    /// Get the center point of the rectangle.
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }

    /// Shrink the rectangle by `amount` on every side (never below zero size).
    pub fn inset(&self, amount: f32) -> Rect {
        let dx = amount.min(self.width / 2.0);
        let dy = amount.min(self.height / 2.0);
        Rect::new(self.x + dx, self.y + dy, self.width - 2.0 * dx, self.height - 2.0 * dy)
    }

    /// Check if this rectangle contains a point.
    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.x0() && p.x <= self.x1() && p.y >= self.y0() && p.y <= self.y1()
    }

    /// Check if `other` lies completely inside this rectangle.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        const EPS: f32 = 1e-3;
        other.x0() >= self.x0() - EPS
            && other.y0() >= self.y0() - EPS
            && other.x1() <= self.x1() + EPS
            && other.y1() <= self.y1() + EPS
    }

    /// Compute the area of the rectangle.
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// Resolves the signature block rectangle for a page of any size.
///
/// The block is authored against a reference page width (an A4 design, in
/// millimetres, by default). Its margin scales with the actual page width so
/// the block keeps the same proportions on Letter, A4 or A3 pages, while its
/// height stays fixed in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignatureGeometry {
    /// Width of the page the block was designed for, in design units
    pub reference_width: f32,
    /// Margin to the page edges, in design units
    pub margin: f32,
    /// Block height in points
    pub block_height: f32,
}

impl Default for SignatureGeometry {
    fn default() -> Self {
        Self {
            reference_width: 210.0,
            margin: 10.0,
            block_height: 80.0,
        }
    }
}

impl SignatureGeometry {
    /// Create a resolver from explicit parameters.
    pub fn new(reference_width: f32, margin: f32, block_height: f32) -> Self {
        Self {
            reference_width,
            margin,
            block_height,
        }
    }

    /// Compute the signature rectangle for a page box, anchored to the bottom margin.
    ///
    /// On pages too short for the scaled margin the bottom margin shrinks so
    /// the block stays on the page.
    ///
    /// # Examples
    ///
    /// ```
    /// use pades_signer::geometry::{Rect, SignatureGeometry};
    ///
    /// let a4 = Rect::new(0.0, 0.0, 595.0, 842.0);
    /// let rect = SignatureGeometry::default().resolve(&a4);
    /// assert_eq!(rect.height, 80.0);
    /// assert!((rect.x0() - 595.0 * 10.0 / 210.0).abs() < 1e-3);
    /// ```
    pub fn resolve(&self, page: &Rect) -> Rect {
        let page_width = page.width.max(0.0);
        let scale = if self.reference_width > 0.0 {
            page_width / self.reference_width
        } else {
            MM_TO_PT
        };

        let mut margin = (self.margin * scale).max(0.0);
        if 2.0 * margin >= page_width {
            margin = ((page_width - MIN_BLOCK_WIDTH) / 2.0).max(0.0);
            log::debug!(
                "Page width {:.1}pt too narrow for margin, clamped to {:.1}pt",
                page_width,
                margin
            );
        }

        let page_height = page.height.max(0.0);
        let height = self.block_height.max(0.0).min(page_height);
        let bottom = margin.min((page_height - height) / 2.0);

        Rect::new(page.x0() + margin, page.y0() + bottom, page_width - 2.0 * margin, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_creation() {
        let r = Rect::new(5.0, 10.0, 100.0, 50.0);
        assert_eq!(r.x0(), 5.0);
        assert_eq!(r.y0(), 10.0);
        assert_eq!(r.x1(), 105.0);
        assert_eq!(r.y1(), 60.0);
    }

    #[test]
    fn test_rect_from_points_normalizes() {
        let r = Rect::from_points(10.0, 20.0, 110.0, 70.0);
        assert_eq!(r, Rect::from_points(110.0, 70.0, 10.0, 20.0));
        assert_eq!(r.corners(), [10.0, 20.0, 110.0, 70.0]);
    }

    #[test]
    fn test_rect_center() {
        let r = Rect::new(0.0, 0.0, 100.0, 50.0);
        let center = r.center();
        assert_eq!(center.x, 50.0);
        assert_eq!(center.y, 25.0);
    }

    #[test]
    fn test_rect_inset() {
        let r = Rect::new(0.0, 0.0, 100.0, 50.0).inset(5.0);
        assert_eq!(r, Rect::new(5.0, 5.0, 90.0, 40.0));

        let tiny = Rect::new(0.0, 0.0, 4.0, 4.0).inset(10.0);
        assert_eq!(tiny.width, 0.0);
        assert_eq!(tiny.height, 0.0);
    }

    #[test]
    fn test_rect_contains() {
        let r = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert!(r.contains_point(&Point::new(50.0, 50.0)));
        assert!(!r.contains_point(&Point::new(150.0, 150.0)));
        assert!(r.contains_rect(&Rect::new(10.0, 10.0, 20.0, 20.0)));
        assert!(!r.contains_rect(&Rect::new(90.0, 90.0, 20.0, 20.0)));
    }

    #[test]
    fn test_resolve_a4() {
        let page = Rect::new(0.0, 0.0, 595.0, 842.0);
        let rect = SignatureGeometry::default().resolve(&page);
        let margin = 595.0 * 10.0 / 210.0;
        assert!((rect.x0() - margin).abs() < 1e-3);
        assert!((rect.x1() - (595.0 - margin)).abs() < 1e-3);
        assert!((rect.y0() - margin).abs() < 1e-3);
        assert_eq!(rect.height, 80.0);
    }

    #[test]
    fn test_resolve_double_width_scales_width_only() {
        let geometry = SignatureGeometry::default();
        let narrow = geometry.resolve(&Rect::new(0.0, 0.0, 595.0, 842.0));
        let wide = geometry.resolve(&Rect::new(0.0, 0.0, 1190.0, 842.0));
        assert!((wide.width - 2.0 * narrow.width).abs() < 1e-2);
        assert_eq!(wide.height, narrow.height);
    }

    #[test]
    fn test_resolve_honours_media_box_origin() {
        let page = Rect::from_points(100.0, 50.0, 695.0, 892.0);
        let rect = SignatureGeometry::default().resolve(&page);
        assert!(rect.x0() > 100.0);
        assert!(rect.y0() > 50.0);
        assert!(page.contains_rect(&Rect::new(rect.x, rect.y, rect.width, 1.0)));
    }

    #[test]
    fn test_resolve_clamps_oversized_margin() {
        let geometry = SignatureGeometry::new(210.0, 120.0, 80.0);
        let rect = geometry.resolve(&Rect::new(0.0, 0.0, 595.0, 842.0));
        assert!(rect.width > 0.0);
        assert!((rect.width - MIN_BLOCK_WIDTH).abs() < 1e-3);
    }

    #[test]
    fn test_resolve_tiny_page_never_negative() {
        let geometry = SignatureGeometry::new(210.0, 200.0, 80.0);
        let rect = geometry.resolve(&Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(rect.x0(), 0.0);
        assert_eq!(rect.width, 10.0);
    }
}
