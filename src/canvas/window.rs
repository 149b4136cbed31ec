use std::num::NonZeroU32;
use std::sync::Arc;

use tiny_skia::Pixmap;
use winit::dpi::{LogicalSize, PhysicalPosition};
use winit::event::{ElementState, MouseButton, Touch, TouchPhase, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use super::mapper::{CoordinateMapper, DisplayRect, LogicalPoint, PointerInput};
use super::surface::{DrawingSurface, Tool};
use super::{CanvasError, CANVAS_SIZE};

/// What the application loop has to do after a canvas window event.
#[derive(Debug, PartialEq)]
pub enum CanvasAction {
    /// The child pressed Enter; carries the composited PNG.
    Finished(Vec<u8>),
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyCommand {
    Palette(usize),
    Eraser,
    Clear,
    Undo,
    Redo,
    Finish,
    Close,
}

/// Coloring page window: pointer input goes through the coordinate mapper
/// into the drawing surface, which is blitted to the window via softbuffer.
pub struct CanvasWindow {
    window: Arc<Window>,
    _context: softbuffer::Context<Arc<Window>>,
    surface: softbuffer::Surface<Arc<Window>, Arc<Window>>,
    drawing: DrawingSurface,
    mapper: CoordinateMapper,
    cursor: Option<PhysicalPosition<f64>>,
    touch_id: Option<u64>,
}

impl CanvasWindow {
    pub fn open(event_loop: &ActiveEventLoop, image: &[u8]) -> Result<Self, CanvasError> {
        let drawing = DrawingSurface::from_image_bytes(image)?;

        let attrs = Window::default_attributes()
            .with_title("Coloring")
            .with_inner_size(LogicalSize::new(CANVAS_SIZE as f64, CANVAS_SIZE as f64))
            .with_min_inner_size(LogicalSize::new(200.0, 200.0));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .map_err(|e| CanvasError::Window(e.to_string()))?,
        );

        let context = softbuffer::Context::new(window.clone())
            .map_err(|e| CanvasError::Window(e.to_string()))?;
        let surface = softbuffer::Surface::new(&context, window.clone())
            .map_err(|e| CanvasError::Window(e.to_string()))?;

        log::info!("[Canvas] Window opened");
        window.request_redraw();

        Ok(Self {
            window,
            _context: context,
            surface,
            drawing,
            mapper: CoordinateMapper::new(CANVAS_SIZE, CANVAS_SIZE),
            cursor: None,
            touch_id: None,
        })
    }

    pub fn id(&self) -> WindowId {
        self.window.id()
    }

    pub fn handle_event(&mut self, event: WindowEvent) -> Option<CanvasAction> {
        match event {
            WindowEvent::CloseRequested => return Some(CanvasAction::Closed),

            WindowEvent::Resized(_) => self.window.request_redraw(),

            WindowEvent::RedrawRequested => self.redraw(),

            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Some(position);
                if let Some(p) = self.map_mouse() {
                    self.drawing.pointer_move(p);
                    self.window.request_redraw();
                }
            }

            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                self.drawing.pointer_up();
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => {
                    if let Some(p) = self.map_mouse() {
                        self.drawing.pointer_down(p);
                    }
                }
                ElementState::Released => self.drawing.pointer_up(),
            },

            WindowEvent::Touch(touch) => self.handle_touch(touch),

            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                return self.run_key(key_command(&event.logical_key)?);
            }

            _ => {}
        }
        None
    }

    fn display_rect(&self) -> DisplayRect {
        let size = self.window.inner_size();
        DisplayRect::sized(size.width as f32, size.height as f32)
    }

    fn map_mouse(&self) -> Option<LogicalPoint> {
        let pos = self.cursor?;
        let input = PointerInput::Mouse {
            x: pos.x as f32,
            y: pos.y as f32,
        };
        self.mapper.map(&input, self.display_rect())
    }

    fn handle_touch(&mut self, touch: Touch) {
        // Only the first finger down draws
        if self.touch_id.is_some_and(|id| id != touch.id) {
            return;
        }
        let input = PointerInput::Touch {
            touches: vec![(touch.location.x as f32, touch.location.y as f32)],
        };
        let point = self.mapper.map(&input, self.display_rect());

        match touch.phase {
            TouchPhase::Started => {
                self.touch_id = Some(touch.id);
                if let Some(p) = point {
                    self.drawing.pointer_down(p);
                }
            }
            TouchPhase::Moved => {
                if let Some(p) = point {
                    self.drawing.pointer_move(p);
                    self.window.request_redraw();
                }
            }
            TouchPhase::Ended | TouchPhase::Cancelled => {
                self.touch_id = None;
                self.drawing.pointer_up();
            }
        }
    }

    fn run_key(&mut self, command: KeyCommand) -> Option<CanvasAction> {
        match command {
            KeyCommand::Palette(index) => {
                self.drawing.select_palette(index);
                self.window.set_title(&tool_title(self.drawing.tool()));
            }
            KeyCommand::Eraser => {
                self.drawing.set_eraser();
                self.window.set_title(&tool_title(self.drawing.tool()));
            }
            KeyCommand::Clear => self.drawing.clear(),
            KeyCommand::Undo | KeyCommand::Redo => {
                let changed = if command == KeyCommand::Undo {
                    self.drawing.undo()
                } else {
                    self.drawing.redo()
                };
                if changed {
                    log::debug!("[Canvas] {} strokes on the page", self.drawing.strokes().len());
                }
            }
            KeyCommand::Finish => match self.drawing.finish() {
                Ok(png) => return Some(CanvasAction::Finished(png)),
                Err(e) => log::error!("[Canvas] Export failed: {}", e),
            },
            KeyCommand::Close => return Some(CanvasAction::Closed),
        }
        self.window.request_redraw();
        None
    }

    fn redraw(&mut self) {
        let size = self.window.inner_size();
        let (Some(w), Some(h)) = (NonZeroU32::new(size.width), NonZeroU32::new(size.height))
        else {
            return;
        };
        if let Err(e) = self.surface.resize(w, h) {
            log::warn!("[Canvas] Surface resize failed: {}", e);
            return;
        }

        let composite = match self.drawing.composite() {
            Ok(p) => p,
            Err(e) => {
                log::warn!("[Canvas] Composite failed: {}", e);
                return;
            }
        };

        match self.surface.buffer_mut() {
            Ok(mut buffer) => {
                blit_scaled(&composite, size.width, size.height, &mut buffer);
                if let Err(e) = buffer.present() {
                    log::warn!("[Canvas] Present failed: {}", e);
                }
            }
            Err(e) => log::warn!("[Canvas] No surface buffer: {}", e),
        }
    }
}

fn tool_title(tool: Tool) -> String {
    match tool {
        Tool::Brush([r, g, b]) => format!("Coloring - #{:02x}{:02x}{:02x}", r, g, b),
        Tool::Eraser => "Coloring - eraser".to_string(),
    }
}

/// `1`..`9` pick the first nine crayons, `0` the tenth.
fn key_command(key: &Key) -> Option<KeyCommand> {
    match key {
        Key::Named(NamedKey::Enter) => Some(KeyCommand::Finish),
        Key::Named(NamedKey::Escape) => Some(KeyCommand::Close),
        Key::Character(c) => {
            let mut chars = c.chars();
            let ch = chars.next()?.to_ascii_lowercase();
            if chars.next().is_some() {
                return None;
            }
            match ch {
                'e' => Some(KeyCommand::Eraser),
                'c' => Some(KeyCommand::Clear),
                'u' => Some(KeyCommand::Undo),
                'r' => Some(KeyCommand::Redo),
                '0' => Some(KeyCommand::Palette(9)),
                '1'..='9' => Some(KeyCommand::Palette(ch as usize - '1' as usize)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Nearest-neighbour stretch of the logical page over the window, flattened
/// onto white and packed as 0xAARRGGBB for softbuffer.
fn blit_scaled(page: &Pixmap, width: u32, height: u32, out: &mut [u32]) {
    let src_w = page.width() as usize;
    let src_h = page.height() as usize;
    let pixels = page.pixels();

    for y in 0..height as usize {
        let sy = (y * src_h / height as usize).min(src_h - 1);
        for x in 0..width as usize {
            let sx = (x * src_w / width as usize).min(src_w - 1);
            let px = pixels[sy * src_w + sx];
            let back = 255 - px.alpha() as u32;
            let r = px.red() as u32 + back;
            let g = px.green() as u32 + back;
            let b = px.blue() as u32 + back;
            if let Some(slot) = out.get_mut(y * width as usize + x) {
                *slot = (0xff << 24) | (r << 16) | (g << 8) | b;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::Color;

    #[test]
    fn test_key_bindings() {
        assert_eq!(
            key_command(&Key::Named(NamedKey::Enter)),
            Some(KeyCommand::Finish)
        );
        assert_eq!(
            key_command(&Key::Named(NamedKey::Escape)),
            Some(KeyCommand::Close)
        );
        assert_eq!(
            key_command(&Key::Character("E".into())),
            Some(KeyCommand::Eraser)
        );
        assert_eq!(
            key_command(&Key::Character("u".into())),
            Some(KeyCommand::Undo)
        );
        assert_eq!(
            key_command(&Key::Character("1".into())),
            Some(KeyCommand::Palette(0))
        );
        assert_eq!(
            key_command(&Key::Character("0".into())),
            Some(KeyCommand::Palette(9))
        );
        assert_eq!(key_command(&Key::Character("x".into())), None);
        assert_eq!(key_command(&Key::Character("12".into())), None);
        assert_eq!(key_command(&Key::Named(NamedKey::Space)), None);
    }

    #[test]
    fn test_title_names_the_tool() {
        assert_eq!(tool_title(Tool::Brush([0xff, 0xa5, 0x00])), "Coloring - #ffa500");
        assert_eq!(tool_title(Tool::Eraser), "Coloring - eraser");
    }

    #[test]
    fn test_blit_stretches_and_flattens_on_white() {
        let mut page = Pixmap::new(2, 2).unwrap();
        page.fill(Color::from_rgba8(255, 0, 0, 255));

        let mut out = vec![0u32; 16];
        blit_scaled(&page, 4, 4, &mut out);
        assert!(out.iter().all(|&p| p == 0xffff0000));

        let empty = Pixmap::new(2, 2).unwrap();
        blit_scaled(&empty, 4, 4, &mut out);
        assert!(out.iter().all(|&p| p == 0xffffffff));
    }
}
