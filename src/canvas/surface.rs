use tiny_skia::{
    BlendMode, Color, IntSize, LineCap, LineJoin, PathBuilder, Pixmap, PixmapPaint, Stroke,
    Transform,
};

use super::mapper::LogicalPoint;
use super::{CanvasError, CANVAS_SIZE};

/// Crayon box offered to the child.
pub const PALETTE: [[u8; 3]; 10] = [
    [0xff, 0x00, 0x00],
    [0x00, 0xff, 0x00],
    [0x00, 0x00, 0xff],
    [0xff, 0xff, 0x00],
    [0xff, 0x00, 0xff],
    [0x00, 0xff, 0xff],
    [0xff, 0xa5, 0x00],
    [0x8b, 0x45, 0x13],
    [0x00, 0x00, 0x00],
    [0xff, 0xc0, 0xcb],
];

pub const DEFAULT_BRUSH_WIDTH: f32 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Brush([u8; 3]),
    Eraser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeMode {
    Color([u8; 3]),
    /// Removes stroke-layer pixels instead of painting over them.
    Erase,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeRecord {
    pub points: Vec<LogicalPoint>,
    pub width: f32,
    pub mode: StrokeMode,
}

/// Two-layer coloring page: an immutable background and the child's strokes,
/// both at `CANVAS_SIZE` regardless of how large the page is shown.
pub struct DrawingSurface {
    background: Pixmap,
    strokes: Pixmap,
    records: Vec<StrokeRecord>,
    undone: Vec<StrokeRecord>,
    tool: Tool,
    brush_width: f32,
    drawing: bool,
}

impl DrawingSurface {
    pub fn new(background: Pixmap) -> Result<Self, CanvasError> {
        Ok(Self {
            background,
            strokes: blank_layer()?,
            records: Vec::new(),
            undone: Vec::new(),
            tool: Tool::Brush(PALETTE[0]),
            brush_width: DEFAULT_BRUSH_WIDTH,
            drawing: false,
        })
    }

    /// Decode a PNG/JPEG coloring page and stretch it over the whole canvas.
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self, CanvasError> {
        Self::new(decode_background(bytes)?)
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_color(&mut self, rgb: [u8; 3]) {
        self.tool = Tool::Brush(rgb);
    }

    /// Select palette entry `index`; out-of-range indices are ignored.
    pub fn select_palette(&mut self, index: usize) {
        if let Some(rgb) = PALETTE.get(index) {
            self.set_color(*rgb);
        }
    }

    pub fn set_eraser(&mut self) {
        self.tool = Tool::Eraser;
    }

    pub fn strokes(&self) -> &[StrokeRecord] {
        &self.records
    }

    pub fn pointer_down(&mut self, at: LogicalPoint) {
        let mode = match self.tool {
            Tool::Brush(rgb) => StrokeMode::Color(rgb),
            Tool::Eraser => StrokeMode::Erase,
        };
        self.records.push(StrokeRecord {
            points: vec![at],
            width: self.brush_width,
            mode,
        });
        self.undone.clear();
        self.drawing = true;
    }

    /// Draw one round-capped segment from the last point to `to`, then
    /// continue the stroke from `to`.
    pub fn pointer_move(&mut self, to: LogicalPoint) {
        if !self.drawing {
            return;
        }
        let Some(record) = self.records.last_mut() else {
            return;
        };
        let Some(&from) = record.points.last() else {
            return;
        };
        if from == to {
            return;
        }
        paint_segment(&mut self.strokes, from, to, record.width, record.mode);
        record.points.push(to);
    }

    pub fn pointer_up(&mut self) {
        if !self.drawing {
            return;
        }
        self.drawing = false;
        // A press without movement paints nothing
        if self.records.last().is_some_and(|r| r.points.len() < 2) {
            self.records.pop();
        }
    }

    /// Wipe the stroke layer only; the background stays.
    pub fn clear(&mut self) {
        self.strokes.fill(Color::TRANSPARENT);
        self.records.clear();
        self.undone.clear();
        self.drawing = false;
    }

    /// Also ends a stroke in progress, which is the one undone.
    pub fn undo(&mut self) -> bool {
        self.drawing = false;
        match self.records.pop() {
            Some(record) => {
                self.undone.push(record);
                self.replay();
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.undone.pop() {
            Some(record) => {
                self.records.push(record);
                self.replay();
                true
            }
            None => false,
        }
    }

    fn replay(&mut self) {
        self.strokes.fill(Color::TRANSPARENT);
        for record in &self.records {
            for pair in record.points.windows(2) {
                paint_segment(&mut self.strokes, pair[0], pair[1], record.width, record.mode);
            }
        }
    }

    /// Background then strokes, flattened at the logical resolution.
    pub fn composite(&self) -> Result<Pixmap, CanvasError> {
        let mut out = blank_layer()?;
        let paint = PixmapPaint::default();
        out.draw_pixmap(0, 0, self.background.as_ref(), &paint, Transform::identity(), None);
        out.draw_pixmap(0, 0, self.strokes.as_ref(), &paint, Transform::identity(), None);
        Ok(out)
    }

    /// The exportable picture sent for evaluation, as PNG.
    pub fn finish(&self) -> Result<Vec<u8>, CanvasError> {
        let png = self
            .composite()?
            .encode_png()
            .map_err(|e| CanvasError::Encode(e.to_string()))?;
        log::info!(
            "[Canvas] Finished drawing: {} strokes, {:.1} KB PNG",
            self.records.len(),
            png.len() as f32 / 1024.0
        );
        Ok(png)
    }
}

fn blank_layer() -> Result<Pixmap, CanvasError> {
    Pixmap::new(CANVAS_SIZE, CANVAS_SIZE).ok_or(CanvasError::Pixmap(CANVAS_SIZE, CANVAS_SIZE))
}

fn decode_background(bytes: &[u8]) -> Result<Pixmap, CanvasError> {
    let image = image::load_from_memory(bytes)?
        .resize_exact(
            CANVAS_SIZE,
            CANVAS_SIZE,
            image::imageops::FilterType::Triangle,
        )
        .to_rgba8();

    // tiny-skia stores premultiplied RGBA
    let mut data = image.into_raw();
    for px in data.chunks_exact_mut(4) {
        let a = px[3] as u16;
        for c in &mut px[..3] {
            *c = ((*c as u16 * a + 127) / 255) as u8;
        }
    }

    let size = IntSize::from_wh(CANVAS_SIZE, CANVAS_SIZE)
        .ok_or(CanvasError::Pixmap(CANVAS_SIZE, CANVAS_SIZE))?;
    Pixmap::from_vec(data, size).ok_or(CanvasError::Pixmap(CANVAS_SIZE, CANVAS_SIZE))
}

fn paint_segment(
    layer: &mut Pixmap,
    from: LogicalPoint,
    to: LogicalPoint,
    width: f32,
    mode: StrokeMode,
) {
    let mut pb = PathBuilder::new();
    pb.move_to(from.x, from.y);
    pb.line_to(to.x, to.y);
    let Some(path) = pb.finish() else {
        return;
    };

    let mut paint = tiny_skia::Paint {
        anti_alias: true,
        ..Default::default()
    };
    match mode {
        StrokeMode::Color([r, g, b]) => {
            paint.set_color_rgba8(r, g, b, 255);
            paint.blend_mode = BlendMode::SourceOver;
        }
        StrokeMode::Erase => {
            paint.set_color_rgba8(0, 0, 0, 255);
            paint.blend_mode = BlendMode::DestinationOut;
        }
    }

    let stroke = Stroke {
        width,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    layer.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
}
