//! Sprites, clones and the stage.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::render::{DrawableId, DrawableProps};
use crate::runtime::ids::TargetId;
use crate::runtime::value::{cast, Value};

/// Graphic effects a target may carry.
pub const EFFECTS: [&str; 7] = [
    "color",
    "fisheye",
    "whirl",
    "pixelate",
    "mosaic",
    "brightness",
    "ghost",
];

/// Smallest and largest sprite size, in percent.
pub const MIN_SIZE: f64 = 5.0;
pub const MAX_SIZE: f64 = 535.0;

/// How the sprite's direction affects its rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RotationStyle {
    #[default]
    #[serde(rename = "all around")]
    AllAround,
    #[serde(rename = "left-right")]
    LeftRight,
    #[serde(rename = "don't rotate")]
    DontRotate,
}

impl RotationStyle {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "all around" => Some(Self::AllAround),
            "left-right" => Some(Self::LeftRight),
            "don't rotate" => Some(Self::DontRotate),
            _ => None,
        }
    }
}

/// Speech or thought bubble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bubble {
    pub kind: BubbleKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BubbleKind {
    Say,
    Think,
}

/// Target description as it appears in a project file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
    pub id: TargetId,
    pub name: String,
    #[serde(default)]
    pub is_stage: bool,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "default_direction")]
    pub direction: f64,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default = "default_size")]
    pub size: f64,
    #[serde(default)]
    pub costume: usize,
    #[serde(default)]
    pub costume_count: Option<usize>,
    #[serde(default)]
    pub rotation_style: RotationStyle,
    #[serde(default)]
    pub variables: IndexMap<String, Value>,
}

fn default_direction() -> f64 {
    90.0
}

fn default_visible() -> bool {
    true
}

fn default_size() -> f64 {
    100.0
}

/// An executable entity: the stage, an original sprite, or a clone.
#[derive(Debug, Clone)]
pub struct Target {
    id: TargetId,
    name: String,
    is_stage: bool,
    original: Option<TargetId>,
    pub x: f64,
    pub y: f64,
    pub direction: f64,
    pub visible: bool,
    pub size: f64,
    pub costume: usize,
    pub costume_count: usize,
    pub rotation_style: RotationStyle,
    pub effects: IndexMap<String, f64>,
    pub variables: IndexMap<String, Value>,
    pub bubble: Option<Bubble>,
    pub drawable: Option<DrawableId>,
}

impl Target {
    /// Create an original sprite at the stage centre.
    pub fn sprite(
        id: impl Into<TargetId>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_stage: false,
            original: None,
            x: 0.0,
            y: 0.0,
            direction: 90.0,
            visible: true,
            size: 100.0,
            costume: 0,
            costume_count: 1,
            rotation_style: RotationStyle::AllAround,
            effects: IndexMap::new(),
            variables: IndexMap::new(),
            bubble: None,
            drawable: None,
        }
    }

    /// Create the stage target.
    pub fn stage(id: impl Into<TargetId>) -> Self {
        let mut target = Self::sprite(id, "Stage");
        target.is_stage = true;
        target
    }

    /// Build from a project file entry.
    pub fn from_spec(spec: TargetSpec) -> Self {
        let mut target = if spec.is_stage {
            Self::stage(spec.id)
        } else {
            Self::sprite(spec.id, spec.name)
        };
        target.x = spec.x;
        target.y = spec.y;
        target.direction = cast::wrap_clamp(spec.direction, -179.0, 180.0);
        target.visible = spec.visible;
        target.size = spec.size.clamp(MIN_SIZE, MAX_SIZE);
        target.costume_count = spec.costume_count.unwrap_or(1).max(1);
        target.costume = spec.costume % target.costume_count;
        target.rotation_style = spec.rotation_style;
        target.variables = spec.variables;
        target
    }

    #[inline]
    pub fn id(&self) -> &TargetId {
        &self.id
    }

    /// Sprite name; clones share their original's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_stage(&self) -> bool {
        self.is_stage
    }

    /// False for clones.
    #[inline]
    pub fn is_original(&self) -> bool {
        self.original.is_none()
    }

    /// Id of the original sprite whose scripts this target runs.
    pub fn script_owner(&self) -> &TargetId {
        self.original.as_ref().unwrap_or(&self.id)
    }

    /// Copy runtime state into a new clone.
    pub fn make_clone(
        &self,
        id: TargetId,
    ) -> Self {
        Self {
            id,
            name: self.name.clone(),
            is_stage: false,
            original: Some(self.script_owner().clone()),
            x: self.x,
            y: self.y,
            direction: self.direction,
            visible: self.visible,
            size: self.size,
            costume: self.costume,
            costume_count: self.costume_count,
            rotation_style: self.rotation_style,
            effects: self.effects.clone(),
            variables: self.variables.clone(),
            bubble: None,
            drawable: None,
        }
    }

    /// Direction and scale as the renderer should apply them.
    pub fn rendered_direction_and_scale(&self) -> (f64, [f64; 2]) {
        let mut direction = self.direction;
        let mut scale = [self.size, self.size];
        match self.rotation_style {
            RotationStyle::AllAround => {}
            RotationStyle::DontRotate => direction = 90.0,
            RotationStyle::LeftRight => {
                direction = 90.0;
                if self.direction < 0.0 {
                    scale[0] = -self.size;
                }
            }
        }
        (direction, scale)
    }

    /// Full property snapshot for the renderer.
    pub fn drawable_props(&self) -> DrawableProps {
        let (direction, scale) = self.rendered_direction_and_scale();
        DrawableProps {
            position: Some([self.x, self.y]),
            direction: Some(direction),
            scale: Some(scale),
            visible: Some(self.visible),
            skin: Some(self.costume),
            effects: Some(self.effects.clone()),
        }
    }

    pub fn clear_effects(&mut self) {
        self.effects.clear();
    }

    /// Clamp an effect value to the range the renderer accepts.
    pub fn clamp_effect(
        name: &str,
        value: f64,
    ) -> f64 {
        match name {
            "ghost" => value.clamp(0.0, 100.0),
            "brightness" => value.clamp(-100.0, 100.0),
            _ => value,
        }
    }
}
