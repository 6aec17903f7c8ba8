//! Target store, renderer forwarding and the clone counter.
//!
//! All property changes of a target go through [`Stage`] so the attached
//! renderer sees them; a redraw is only requested for visible targets.

pub mod target;

pub use target::{Bubble, BubbleKind, RotationStyle, Target, TargetSpec, EFFECTS, MAX_SIZE, MIN_SIZE};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::render::{DrawableId, DrawableProps, Layer, Renderer};
use crate::runtime::ids::TargetId;
use crate::runtime::value::cast;

/// Stage width in stage units.
pub const STAGE_WIDTH: f64 = 480.0;
/// Stage height in stage units.
pub const STAGE_HEIGHT: f64 = 360.0;
/// Default clone ceiling.
pub const MAX_CLONES: usize = 300;

/// Live targets plus the renderer they are drawn with.
pub struct Stage {
    targets: IndexMap<TargetId, Target>,
    renderer: Option<Box<dyn Renderer>>,
    clone_count: usize,
    max_clones: usize,
    editing_target: Option<TargetId>,
    redraw_requested: bool,
}

impl std::fmt::Debug for Stage {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("targets", &self.targets.keys().collect::<Vec<_>>())
            .field("has_renderer", &self.renderer.is_some())
            .field("clone_count", &self.clone_count)
            .field("max_clones", &self.max_clones)
            .finish()
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::new(MAX_CLONES)
    }
}

impl Stage {
    /// Create an empty stage with the given clone ceiling.
    pub fn new(max_clones: usize) -> Self {
        Self {
            targets: IndexMap::new(),
            renderer: None,
            clone_count: 0,
            max_clones,
            editing_target: None,
            redraw_requested: false,
        }
    }

    /// Attach a renderer and create drawables for targets that lack one.
    pub fn attach_renderer(
        &mut self,
        mut renderer: Box<dyn Renderer>,
    ) {
        for target in self.targets.values_mut() {
            let layer = if target.is_stage() {
                Layer::Background
            } else {
                Layer::Sprite
            };
            let id = renderer.create_drawable(layer);
            renderer.update_drawable_properties(id, &target.drawable_props());
            target.drawable = Some(id);
        }
        self.renderer = Some(renderer);
    }

    #[inline]
    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    pub fn renderer(&self) -> Option<&dyn Renderer> {
        self.renderer.as_deref()
    }

    /// Add a target, creating its drawable. A target already stored under the
    /// same id is disposed first.
    pub fn add_target(
        &mut self,
        mut target: Target,
    ) {
        if self.targets.contains_key(target.id()) {
            warn!("Replacing existing target {}", target.id());
            self.dispose_target(&target.id().clone());
        }
        if let Some(renderer) = self.renderer.as_mut() {
            let layer = if target.is_stage() {
                Layer::Background
            } else {
                Layer::Sprite
            };
            let id = renderer.create_drawable(layer);
            renderer.update_drawable_properties(id, &target.drawable_props());
            target.drawable = Some(id);
        }
        if !target.is_original() {
            self.clone_count += 1;
        }
        self.targets.insert(target.id().clone(), target);
    }

    /// Remove a target and destroy its drawable.
    pub fn dispose_target(
        &mut self,
        id: &TargetId,
    ) -> Option<Target> {
        let target = self.targets.shift_remove(id)?;
        if !target.is_original() {
            self.change_clone_counter(-1);
        }
        if let (Some(renderer), Some(drawable)) = (self.renderer.as_mut(), target.drawable) {
            renderer.destroy_drawable(drawable);
            if target.visible {
                self.redraw_requested = true;
            }
        }
        if self.editing_target.as_ref() == Some(id) {
            self.editing_target = None;
        }
        debug!("Disposed {}", target.id());
        Some(target)
    }

    /// Remove every clone, leaving originals intact.
    pub fn dispose_clones(&mut self) -> Vec<Target> {
        let clones: Vec<TargetId> = self
            .targets
            .values()
            .filter(|t| !t.is_original())
            .map(|t| t.id().clone())
            .collect();
        clones
            .iter()
            .filter_map(|id| self.dispose_target(id))
            .collect()
    }

    /// Adjust the live clone count.
    pub fn change_clone_counter(
        &mut self,
        amount: isize,
    ) {
        self.clone_count = self.clone_count.saturating_add_signed(amount);
    }

    /// Whether another clone may be created.
    #[inline]
    pub fn clones_available(&self) -> bool {
        self.clone_count < self.max_clones
    }

    #[inline]
    pub fn clone_count(&self) -> usize {
        self.clone_count
    }

    #[inline]
    pub fn max_clones(&self) -> usize {
        self.max_clones
    }

    #[inline]
    pub fn contains(
        &self,
        id: &TargetId,
    ) -> bool {
        self.targets.contains_key(id)
    }

    pub fn get(
        &self,
        id: &TargetId,
    ) -> Option<&Target> {
        self.targets.get(id)
    }

    pub fn get_mut(
        &mut self,
        id: &TargetId,
    ) -> Option<&mut Target> {
        self.targets.get_mut(id)
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn targets_mut(&mut self) -> impl Iterator<Item = &mut Target> {
        self.targets.values_mut()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Original sprite with the given name. The stage is never returned.
    pub fn sprite_by_name(
        &self,
        name: &str,
    ) -> Option<&Target> {
        self.targets
            .values()
            .find(|t| !t.is_stage() && t.is_original() && t.name() == name)
    }

    pub fn target_by_drawable(
        &self,
        drawable: DrawableId,
    ) -> Option<&Target> {
        self.targets.values().find(|t| t.drawable == Some(drawable))
    }

    pub fn stage_target(&self) -> Option<&Target> {
        self.targets.values().find(|t| t.is_stage())
    }

    pub fn editing_target(&self) -> Option<&Target> {
        self.editing_target.as_ref().and_then(|id| self.targets.get(id))
    }

    /// Select the target being edited; unknown ids are ignored.
    pub fn set_editing_target(
        &mut self,
        id: &TargetId,
    ) -> bool {
        if self.targets.contains_key(id) {
            self.editing_target = Some(id.clone());
            true
        } else {
            false
        }
    }

    /// Flag that the next frame should be redrawn.
    #[inline]
    pub fn request_redraw(&mut self) {
        self.redraw_requested = true;
    }

    /// Read and reset the redraw flag.
    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.redraw_requested)
    }

    /// Run the renderer's redraw cycle, if one is attached.
    pub fn draw(&mut self) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.draw();
        }
    }

    // ========================================================================
    // Property updates
    // ========================================================================

    /// Move a target, optionally keeping it inside the stage fence.
    pub fn set_xy(
        &mut self,
        id: &TargetId,
        x: f64,
        y: f64,
        fenced: bool,
    ) -> bool {
        let Some(target) = self.targets.get_mut(id) else {
            return false;
        };
        if target.is_stage() {
            return false;
        }
        let (x, y) = match (fenced, self.renderer.as_ref(), target.drawable) {
            (true, Some(renderer), Some(drawable)) => renderer.fenced_position(drawable, x, y),
            _ => (x, y),
        };
        target.x = x;
        target.y = y;
        self.push_props(
            id,
            DrawableProps {
                position: Some([x, y]),
                ..DrawableProps::default()
            },
        );
        true
    }

    /// Point a target; the angle is wrapped into [-179, 180].
    pub fn set_direction(
        &mut self,
        id: &TargetId,
        direction: f64,
    ) -> bool {
        let Some(target) = self.targets.get_mut(id) else {
            return false;
        };
        if target.is_stage() || !direction.is_finite() {
            return false;
        }
        target.direction = cast::wrap_clamp(direction, -179.0, 180.0);
        let (direction, scale) = target.rendered_direction_and_scale();
        self.push_props(
            id,
            DrawableProps {
                direction: Some(direction),
                scale: Some(scale),
                ..DrawableProps::default()
            },
        );
        true
    }

    pub fn set_rotation_style(
        &mut self,
        id: &TargetId,
        style: RotationStyle,
    ) -> bool {
        let Some(target) = self.targets.get_mut(id) else {
            return false;
        };
        target.rotation_style = style;
        let (direction, scale) = target.rendered_direction_and_scale();
        self.push_props(
            id,
            DrawableProps {
                direction: Some(direction),
                scale: Some(scale),
                ..DrawableProps::default()
            },
        );
        true
    }

    /// Resize, clamped to [`MIN_SIZE`]..=[`MAX_SIZE`].
    pub fn set_size(
        &mut self,
        id: &TargetId,
        size: f64,
    ) -> bool {
        let Some(target) = self.targets.get_mut(id) else {
            return false;
        };
        if target.is_stage() {
            return false;
        }
        target.size = size.clamp(MIN_SIZE, MAX_SIZE);
        let (_, scale) = target.rendered_direction_and_scale();
        self.push_props(
            id,
            DrawableProps {
                scale: Some(scale),
                ..DrawableProps::default()
            },
        );
        true
    }

    pub fn set_visible(
        &mut self,
        id: &TargetId,
        visible: bool,
    ) -> bool {
        let Some(target) = self.targets.get_mut(id) else {
            return false;
        };
        if target.is_stage() {
            return false;
        }
        target.visible = visible;
        if let (Some(renderer), Some(drawable)) = (self.renderer.as_mut(), target.drawable) {
            renderer.update_drawable_properties(
                drawable,
                &DrawableProps {
                    visible: Some(visible),
                    ..DrawableProps::default()
                },
            );
            // Hiding is a visible change too.
            self.redraw_requested = true;
        }
        true
    }

    /// Switch costume; the index wraps around the costume count.
    pub fn set_costume(
        &mut self,
        id: &TargetId,
        costume: i64,
    ) -> bool {
        let Some(target) = self.targets.get_mut(id) else {
            return false;
        };
        let count = target.costume_count.max(1) as i64;
        target.costume = costume.rem_euclid(count) as usize;
        let skin = target.costume;
        self.push_props(
            id,
            DrawableProps {
                skin: Some(skin),
                ..DrawableProps::default()
            },
        );
        true
    }

    /// Set a graphic effect; unknown effect names are ignored.
    pub fn set_effect(
        &mut self,
        id: &TargetId,
        effect: &str,
        value: f64,
    ) -> bool {
        if !EFFECTS.contains(&effect) {
            return false;
        }
        let Some(target) = self.targets.get_mut(id) else {
            return false;
        };
        target
            .effects
            .insert(effect.to_string(), Target::clamp_effect(effect, value));
        let effects = target.effects.clone();
        self.push_props(
            id,
            DrawableProps {
                effects: Some(effects),
                ..DrawableProps::default()
            },
        );
        true
    }

    pub fn clear_effects(
        &mut self,
        id: &TargetId,
    ) {
        if let Some(target) = self.targets.get_mut(id) {
            target.clear_effects();
            self.push_props(
                id,
                DrawableProps {
                    effects: Some(IndexMap::new()),
                    ..DrawableProps::default()
                },
            );
        }
    }

    /// Show or clear a speech bubble.
    pub fn set_bubble(
        &mut self,
        id: &TargetId,
        bubble: Option<Bubble>,
    ) -> bool {
        let Some(target) = self.targets.get_mut(id) else {
            return false;
        };
        let visible = target.visible;
        target.bubble = bubble.filter(|b| !b.text.is_empty());
        if visible {
            self.redraw_requested = true;
        }
        true
    }

    /// Move a sprite within the sprite layer.
    pub fn set_layer_order(
        &mut self,
        id: &TargetId,
        position: i32,
        relative: bool,
    ) -> Option<i32> {
        let drawable = self.targets.get(id)?.drawable?;
        let order = self
            .renderer
            .as_mut()?
            .set_drawable_order(drawable, position, relative);
        self.redraw_requested = true;
        order
    }

    /// Forward a property update and request a redraw if the target shows.
    fn push_props(
        &mut self,
        id: &TargetId,
        props: DrawableProps,
    ) {
        let Some(target) = self.targets.get(id) else {
            return;
        };
        if let (Some(renderer), Some(drawable)) = (self.renderer.as_mut(), target.drawable) {
            renderer.update_drawable_properties(drawable, &props);
            if target.visible {
                self.redraw_requested = true;
            }
        }
    }

    /// Reset per-run state when the green flag is clicked.
    pub fn on_green_flag(&mut self) {
        let ids: Vec<TargetId> = self.targets.keys().cloned().collect();
        for id in &ids {
            self.clear_effects(id);
        }
    }

    /// Clear bubbles and effects after a global stop.
    pub fn on_stop_all(&mut self) {
        let ids: Vec<TargetId> = self.targets.keys().cloned().collect();
        for id in &ids {
            self.set_bubble(id, None);
            self.clear_effects(id);
        }
    }

    /// Targets able to run scripts owned by `owner` (the sprite and its clones).
    pub fn instances_of(
        &self,
        owner: &TargetId,
    ) -> Vec<TargetId> {
        self.targets
            .values()
            .filter(|t| t.script_owner() == owner)
            .map(|t| t.id().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests;
