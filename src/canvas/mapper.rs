//! Maps on-screen pointer positions into the fixed logical canvas space.

/// A point in logical canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogicalPoint {
    pub x: f32,
    pub y: f32,
}

/// Where the canvas currently sits on screen, in the same units as the
/// pointer coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl DisplayRect {
    /// A rect anchored at the origin, e.g. a whole window.
    pub fn sized(width: f32, height: f32) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointerInput {
    Mouse { x: f32, y: f32 },
    /// All active touch points; the first one drives drawing.
    Touch { touches: Vec<(f32, f32)> },
}

impl PointerInput {
    fn client_position(&self) -> Option<(f32, f32)> {
        match self {
            PointerInput::Mouse { x, y } => Some((*x, *y)),
            PointerInput::Touch { touches } => touches.first().copied(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    logical_width: f32,
    logical_height: f32,
}

impl CoordinateMapper {
    pub fn new(logical_width: u32, logical_height: u32) -> Self {
        Self {
            logical_width: logical_width as f32,
            logical_height: logical_height as f32,
        }
    }

    /// `scale = logical / displayed` per axis, applied to the offset inside
    /// the rect. Returns `None` for a collapsed rect or a touch event
    /// without touches.
    pub fn map(&self, input: &PointerInput, rect: DisplayRect) -> Option<LogicalPoint> {
        if rect.width <= 0.0 || rect.height <= 0.0 {
            return None;
        }
        let (client_x, client_y) = input.client_position()?;

        let scale_x = self.logical_width / rect.width;
        let scale_y = self.logical_height / rect.height;

        Some(LogicalPoint {
            x: (client_x - rect.left) * scale_x,
            y: (client_y - rect.top) * scale_y,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: LogicalPoint, x: f32, y: f32) -> bool {
        (a.x - x).abs() < 0.5 && (a.y - y).abs() < 0.5
    }

    #[test]
    fn test_center_maps_to_center_at_any_display_size() {
        let mapper = CoordinateMapper::new(500, 500);
        for size in [320.0, 500.0, 731.0] {
            let rect = DisplayRect {
                left: 40.0,
                top: 12.0,
                width: size,
                height: size,
            };
            let center = PointerInput::Mouse {
                x: rect.left + size / 2.0,
                y: rect.top + size / 2.0,
            };
            let p = mapper.map(&center, rect).unwrap();
            assert!(close(p, 250.0, 250.0), "size {size}: {p:?}");
        }
    }

    #[test]
    fn test_axes_scale_independently() {
        let mapper = CoordinateMapper::new(500, 500);
        let rect = DisplayRect::sized(250.0, 1000.0);
        let p = mapper
            .map(&PointerInput::Mouse { x: 100.0, y: 100.0 }, rect)
            .unwrap();
        assert!(close(p, 200.0, 50.0));
    }

    #[test]
    fn test_touch_uses_first_touch_point() {
        let mapper = CoordinateMapper::new(500, 500);
        let rect = DisplayRect::sized(320.0, 320.0);
        let touch = PointerInput::Touch {
            touches: vec![(32.0, 64.0), (300.0, 300.0)],
        };
        let p = mapper.map(&touch, rect).unwrap();
        assert!(close(p, 50.0, 100.0));

        let empty = PointerInput::Touch { touches: vec![] };
        assert!(mapper.map(&empty, rect).is_none());
    }

    #[test]
    fn test_collapsed_rect_maps_nothing() {
        let mapper = CoordinateMapper::new(500, 500);
        let p = mapper.map(&PointerInput::Mouse { x: 1.0, y: 1.0 }, DisplayRect::sized(0.0, 10.0));
        assert!(p.is_none());
    }
}
