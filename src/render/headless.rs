//! Renderer that keeps drawable state in memory instead of painting it.
//!
//! Used by the CLI and by tests; the shared [`RenderLog`] lets a caller
//! inspect what the runtime asked for after handing the renderer over.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::{DrawableId, DrawableProps, Layer, Renderer};

/// Last known state of one drawable.
#[derive(Debug, Clone)]
pub struct DrawableState {
    pub layer: Layer,
    pub position: [f64; 2],
    pub direction: f64,
    pub scale: [f64; 2],
    pub visible: bool,
    pub skin: usize,
    pub effects: IndexMap<String, f64>,
    /// Half-extent used for picking and touching tests.
    pub radius: f64,
}

impl DrawableState {
    fn new(layer: Layer) -> Self {
        Self {
            layer,
            position: [0.0, 0.0],
            direction: 90.0,
            scale: [100.0, 100.0],
            visible: true,
            skin: 0,
            effects: IndexMap::new(),
            radius: 24.0,
        }
    }

    fn contains(
        &self,
        x: f64,
        y: f64,
    ) -> bool {
        let r = self.radius * self.scale[0].abs() / 100.0;
        (x - self.position[0]).abs() <= r && (y - self.position[1]).abs() <= r
    }
}

/// Counters and drawables recorded by a [`HeadlessRenderer`].
#[derive(Debug, Default)]
pub struct RenderLog {
    pub draws: u64,
    pub updates: u64,
    next_id: u32,
    /// Drawables in paint order, back to front.
    pub drawables: IndexMap<DrawableId, DrawableState>,
}

impl RenderLog {
    pub fn drawable(
        &self,
        id: DrawableId,
    ) -> Option<&DrawableState> {
        self.drawables.get(&id)
    }
}

/// In-memory renderer.
#[derive(Debug, Clone, Default)]
pub struct HeadlessRenderer {
    log: Arc<Mutex<RenderLog>>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the recorded state.
    pub fn log(&self) -> Arc<Mutex<RenderLog>> {
        self.log.clone()
    }
}

impl Renderer for HeadlessRenderer {
    fn draw(&mut self) {
        self.log.lock().draws += 1;
    }

    fn create_drawable(
        &mut self,
        layer: Layer,
    ) -> DrawableId {
        let mut log = self.log.lock();
        let id = DrawableId(log.next_id);
        log.next_id += 1;
        log.drawables.insert(id, DrawableState::new(layer));
        id
    }

    fn destroy_drawable(
        &mut self,
        id: DrawableId,
    ) {
        self.log.lock().drawables.shift_remove(&id);
    }

    fn update_drawable_properties(
        &mut self,
        id: DrawableId,
        props: &DrawableProps,
    ) {
        let mut log = self.log.lock();
        log.updates += 1;
        let Some(state) = log.drawables.get_mut(&id) else {
            return;
        };
        if let Some(position) = props.position {
            state.position = position;
        }
        if let Some(direction) = props.direction {
            state.direction = direction;
        }
        if let Some(scale) = props.scale {
            state.scale = scale;
        }
        if let Some(visible) = props.visible {
            state.visible = visible;
        }
        if let Some(skin) = props.skin {
            state.skin = skin;
        }
        if let Some(effects) = &props.effects {
            state.effects = effects.clone();
        }
    }

    fn set_drawable_order(
        &mut self,
        id: DrawableId,
        position: i32,
        relative: bool,
    ) -> Option<i32> {
        let mut log = self.log.lock();
        let current = log.drawables.get_index_of(&id)? as i32;
        let last = log.drawables.len() as i32 - 1;
        // Sprites stay above the backdrop.
        let first = log
            .drawables
            .values()
            .filter(|d| d.layer == Layer::Background)
            .count() as i32;
        let wanted = if relative { current + position } else { position };
        let wanted = wanted.clamp(first.min(last), last);
        log.drawables.move_index(current as usize, wanted as usize);
        Some(wanted)
    }

    fn pick(
        &self,
        x: f64,
        y: f64,
    ) -> Option<DrawableId> {
        let log = self.log.lock();
        log.drawables
            .iter()
            .rev()
            .find(|(_, d)| d.visible && d.layer == Layer::Sprite && d.contains(x, y))
            .map(|(id, _)| *id)
    }

    fn is_touching_drawables(
        &self,
        id: DrawableId,
        candidates: &[DrawableId],
    ) -> bool {
        let log = self.log.lock();
        let Some(me) = log.drawables.get(&id) else {
            return false;
        };
        candidates
            .iter()
            .filter_map(|c| log.drawables.get(c))
            .filter(|other| other.visible)
            .any(|other| {
                let reach = me.radius + other.radius;
                (me.position[0] - other.position[0]).abs() <= reach
                    && (me.position[1] - other.position[1]).abs() <= reach
            })
    }

    fn is_touching_color(
        &self,
        _id: DrawableId,
        _color: [u8; 3],
    ) -> bool {
        false
    }
}
