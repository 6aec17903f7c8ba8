//! Renderer collaborator interface.
//!
//! The runtime never inspects pixels. It forwards drawable property updates
//! computed by primitives and asks for one redraw per tick.

pub mod headless;

pub use headless::{HeadlessRenderer, RenderLog};

use indexmap::IndexMap;
use serde::Serialize;

/// Handle of a drawable owned by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DrawableId(pub u32);

impl std::fmt::Display for DrawableId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Drawable({})", self.0)
    }
}

/// Render layer groups, back to front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Layer {
    Background,
    Video,
    Pen,
    Sprite,
}

/// Partial drawable update; unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrawableProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skin: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effects: Option<IndexMap<String, f64>>,
}

impl DrawableProps {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Everything the runtime asks of a 2D renderer.
pub trait Renderer: Send {
    /// Run one redraw cycle.
    fn draw(&mut self);

    fn create_drawable(
        &mut self,
        layer: Layer,
    ) -> DrawableId;

    fn destroy_drawable(
        &mut self,
        id: DrawableId,
    );

    fn update_drawable_properties(
        &mut self,
        id: DrawableId,
        props: &DrawableProps,
    );

    /// Move a drawable within its layer; returns the new order if it moved.
    fn set_drawable_order(
        &mut self,
        id: DrawableId,
        position: i32,
        relative: bool,
    ) -> Option<i32>;

    /// Topmost drawable under a stage point.
    fn pick(
        &self,
        x: f64,
        y: f64,
    ) -> Option<DrawableId>;

    fn is_touching_drawables(
        &self,
        id: DrawableId,
        candidates: &[DrawableId],
    ) -> bool;

    fn is_touching_color(
        &self,
        id: DrawableId,
        color: [u8; 3],
    ) -> bool;

    /// Clamp a proposed position so the drawable stays on stage.
    fn fenced_position(
        &self,
        _id: DrawableId,
        x: f64,
        y: f64,
    ) -> (f64, f64) {
        let half_w = crate::runtime::stage::STAGE_WIDTH / 2.0;
        let half_h = crate::runtime::stage::STAGE_HEIGHT / 2.0;
        (x.clamp(-half_w, half_w), y.clamp(-half_h, half_h))
    }
}
