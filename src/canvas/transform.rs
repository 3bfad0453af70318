//! Mapping between canvas-logical, screen and SVG coordinates.
//!
//! Screen coordinates are pixels relative to the canvas container. The
//! task layer is drawn with `translate(pan) scale(zoom)`, so a logical point
//! `p` lands on screen at `p * zoom + pan`. The connection layer is an SVG
//! element laid over the container; SVG coordinates are screen coordinates
//! minus the SVG element's offset inside the container.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bounds::Bounds;
use crate::domain::task::Position;

pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 5.0;

/// Viewport reported before the container has been laid out. Culling treats
/// it as "show everything".
pub const UNMEASURED_VIEWPORT: Bounds = Bounds {
    left: -5000.0,
    top: -5000.0,
    right: 5000.0,
    bottom: 5000.0,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ContainerSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CanvasTransform {
    pub pan: Position,
    pub zoom: f64,
    #[serde(skip, default = "default_min_zoom")]
    min_zoom: f64,
    #[serde(skip, default = "default_max_zoom")]
    max_zoom: f64,
}

fn default_min_zoom() -> f64 {
    MIN_ZOOM
}

fn default_max_zoom() -> f64 {
    MAX_ZOOM
}

pub fn to_screen(canvas: Position, pan: Position, zoom: f64) -> Position {
    Position {
        x: canvas.x * zoom + pan.x,
        y: canvas.y * zoom + pan.y,
    }
}

pub fn to_canvas(screen: Position, pan: Position, zoom: f64) -> Position {
    Position {
        x: (screen.x - pan.x) / zoom,
        y: (screen.y - pan.y) / zoom,
    }
}

/// Pan that keeps `anchor` (screen space) over the same canvas point when
/// the zoom changes from `old_zoom` to `new_zoom`.
pub fn pan_for_zoom_about(anchor: Position, old_pan: Position, old_zoom: f64, new_zoom: f64) -> Position {
    let ratio = new_zoom / old_zoom;
    Position {
        x: anchor.x - (anchor.x - old_pan.x) * ratio,
        y: anchor.y - (anchor.y - old_pan.y) * ratio,
    }
}

pub fn screen_to_svg(screen: Position, svg_origin: Position) -> Position {
    Position {
        x: screen.x - svg_origin.x,
        y: screen.y - svg_origin.y,
    }
}

impl Default for CanvasTransform {
    fn default() -> Self {
        Self {
            pan: Position::default(),
            zoom: 1.0,
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
        }
    }
}

impl CanvasTransform {
    pub fn new(pan: Position, zoom: f64) -> Self {
        let mut transform = Self { pan, ..Self::default() };
        transform.zoom = transform.clamp_zoom(zoom);
        transform
    }

    /// Use custom zoom limits. The current zoom is re-clamped. Limits that
    /// are not positive or out of order are ignored.
    pub fn with_limits(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        if min_zoom > 0.0 && min_zoom <= max_zoom {
            self.min_zoom = min_zoom;
            self.max_zoom = max_zoom;
        }
        self.zoom = self.clamp_zoom(self.zoom);
        self
    }

    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    pub fn to_screen(&self, canvas: Position) -> Position {
        to_screen(canvas, self.pan, self.zoom)
    }

    pub fn to_canvas(&self, screen: Position) -> Position {
        to_canvas(screen, self.pan, self.zoom)
    }

    pub fn canvas_to_svg(&self, canvas: Position, svg_origin: Position) -> Position {
        screen_to_svg(self.to_screen(canvas), svg_origin)
    }

    /// Set the zoom (clamped). With an anchor, the pan is solved so the
    /// anchor stays fixed on screen. Returns whether the zoom changed.
    pub fn set_zoom(&mut self, zoom: f64, anchor: Option<Position>) -> bool {
        let new_zoom = self.clamp_zoom(zoom);
        if new_zoom == self.zoom {
            return false;
        }
        if let Some(anchor) = anchor {
            self.pan = pan_for_zoom_about(anchor, self.pan, self.zoom, new_zoom);
        }
        debug!(from = self.zoom, to = new_zoom, "Zoom changed");
        self.zoom = new_zoom;
        true
    }

    /// Additive zoom step, as used by the keyboard and toolbar.
    pub fn zoom_by(&mut self, delta: f64, anchor: Option<Position>) -> bool {
        self.set_zoom(self.zoom + delta, anchor)
    }

    /// Wheel zoom about the cursor; a positive `wheel_dy` zooms out.
    pub fn zoom_wheel(&mut self, wheel_dy: f64, cursor: Position, sensitivity: f64) -> bool {
        self.zoom_by(-wheel_dy * sensitivity, Some(cursor))
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan = self.pan.offset(dx, dy);
    }

    pub fn reset(&mut self) {
        self.pan = Position::default();
        self.zoom = self.clamp_zoom(1.0);
    }

    /// Fit `content` into the container with `padding` on each side. Never
    /// zooms in past 1.0. Returns false when there is nothing to fit.
    pub fn fit_to(&mut self, content: Option<Bounds>, container: ContainerSize, padding: f64) -> bool {
        let Some(content) = content else {
            return false;
        };
        if container.width <= 0.0 || container.height <= 0.0 {
            return false;
        }

        let padded = content.expand(padding);
        let scale_x = container.width / padded.width();
        let scale_y = container.height / padded.height();
        let zoom = self.clamp_zoom(scale_x.min(scale_y).min(1.0));

        self.pan = Position {
            x: (container.width - padded.width() * zoom) / 2.0 - padded.left * zoom,
            y: (container.height - padded.height() * zoom) / 2.0 - padded.top * zoom,
        };
        self.zoom = zoom;
        debug!(zoom, pan_x = self.pan.x, pan_y = self.pan.y, "Fitted content to container");
        true
    }

    /// Logical rectangle visible in a container of the given size. Returns
    /// the unmeasured sentinel when the container has not been laid out.
    pub fn viewport(&self, container: Option<ContainerSize>) -> Bounds {
        match container {
            Some(size) if size.width > 0.0 && size.height > 0.0 => {
                let top_left = self.to_canvas(Position::new(0.0, 0.0));
                let bottom_right = self.to_canvas(Position::new(size.width, size.height));
                Bounds::new(top_left.x, top_left.y, bottom_right.x, bottom_right.y)
            }
            _ => UNMEASURED_VIEWPORT,
        }
    }
}
