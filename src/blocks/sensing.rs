//! Sensing blocks: timer, keyboard, mouse and queries about other targets.

use crate::render::DrawableId;
use crate::runtime::primitives::{BlockPackage, BlockResult, BlockUtility, PrimitiveExport};
use crate::runtime::stage::{Target, STAGE_HEIGHT, STAGE_WIDTH};
use crate::runtime::value::{cast, BlockArgs, Value};

/// Menu entry for the mouse pointer.
pub const MOUSE: &str = "_mouse_";
/// Menu entry for the stage edge.
pub const EDGE: &str = "_edge_";
/// Menu entry for the stage target.
pub const STAGE: &str = "_stage_";

// ============================================================================
// SensingPackage - BlockPackage Implementation
// ============================================================================

/// Sensing package.
#[derive(Debug, Default)]
pub struct SensingPackage;

impl BlockPackage for SensingPackage {
    fn name(&self) -> &'static str {
        "sensing"
    }

    fn primitives(&self) -> Vec<PrimitiveExport> {
        vec![
            PrimitiveExport::new("sensing_timer", block_timer),
            PrimitiveExport::new("sensing_resettimer", block_reset_timer),
            PrimitiveExport::new("sensing_keypressed", block_key_pressed),
            PrimitiveExport::new("sensing_mousedown", block_mouse_down),
            PrimitiveExport::new("sensing_mousex", block_mouse_x),
            PrimitiveExport::new("sensing_mousey", block_mouse_y),
            PrimitiveExport::new("sensing_touchingobject", block_touching_object),
            PrimitiveExport::new("sensing_distanceto", block_distance_to),
            PrimitiveExport::new("sensing_of", block_of),
        ]
    }
}

// ============================================================================
// Block Implementations
// ============================================================================

/// sensing_timer, in seconds.
fn block_timer(
    _args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    Ok(cast::number_value(util.io().clock.project_timer()))
}

fn block_reset_timer(
    _args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    util.io_mut().clock.reset_project_timer();
    Ok(Value::Null)
}

/// sensing_keypressed KEY_OPTION
fn block_key_pressed(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let key = args.string("KEY_OPTION");
    Ok(Value::Bool(util.io().keyboard.is_key_pressed(&key)))
}

fn block_mouse_down(
    _args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    Ok(Value::Bool(util.io().mouse.is_down()))
}

fn block_mouse_x(
    _args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    Ok(cast::number_value(util.io().mouse.scratch_x()))
}

fn block_mouse_y(
    _args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    Ok(cast::number_value(util.io().mouse.scratch_y()))
}

/// sensing_touchingobject TOUCHINGOBJECTMENU
///
/// Sprite and mouse checks need a renderer; without one they are false.
fn block_touching_object(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let menu = args.string("TOUCHINGOBJECTMENU");
    let me = util.require_target()?;
    if me.is_stage() {
        return Ok(Value::Bool(false));
    }

    if menu == EDGE {
        let half_w = STAGE_WIDTH / 2.0;
        let half_h = STAGE_HEIGHT / 2.0;
        return Ok(Value::Bool(me.x.abs() >= half_w || me.y.abs() >= half_h));
    }

    let (Some(renderer), Some(drawable)) = (util.stage().renderer(), me.drawable) else {
        return Ok(Value::Bool(false));
    };
    let touching = if menu == MOUSE {
        let mouse = &util.io().mouse;
        renderer.pick(mouse.scratch_x(), mouse.scratch_y()) == Some(drawable)
    } else {
        let candidates: Vec<DrawableId> = match util.stage().sprite_by_name(&menu) {
            Some(sprite) => util
                .stage()
                .instances_of(sprite.id())
                .iter()
                .filter(|id| *id != me.id())
                .filter_map(|id| util.stage().get(id).and_then(|t| t.drawable))
                .collect(),
            None => Vec::new(),
        };
        renderer.is_touching_drawables(drawable, &candidates)
    };
    Ok(Value::Bool(touching))
}

/// sensing_distanceto DISTANCETOMENU
fn block_distance_to(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let menu = args.string("DISTANCETOMENU");
    let me = util.require_target()?;
    if me.is_stage() {
        return Ok(Value::from(10000));
    }
    let (x, y) = if menu == MOUSE {
        (util.io().mouse.scratch_x(), util.io().mouse.scratch_y())
    } else {
        match util.stage().sprite_by_name(&menu) {
            Some(sprite) => (sprite.x, sprite.y),
            None => return Ok(Value::from(10000)),
        }
    };
    let distance = ((me.x - x).powi(2) + (me.y - y).powi(2)).sqrt();
    Ok(cast::number_value(distance))
}

/// sensing_of PROPERTY OBJECT
///
/// Built-in properties first, then a variable of that name.
fn block_of(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let object = args.string("OBJECT");
    let property = args.string("PROPERTY");
    let target = if object == STAGE {
        util.stage().stage_target()
    } else {
        util.stage().sprite_by_name(&object)
    };
    Ok(target.map(|t| property_of(t, &property)).unwrap_or(Value::from(0)))
}

fn property_of(
    target: &Target,
    property: &str,
) -> Value {
    if target.is_stage() {
        if property == "backdrop #" {
            return Value::from(target.costume as u64 + 1);
        }
    } else {
        match property {
            "x position" => return cast::number_value(target.x),
            "y position" => return cast::number_value(target.y),
            "direction" => return cast::number_value(target.direction),
            "costume #" => return Value::from(target.costume as u64 + 1),
            "size" => return cast::number_value(target.size),
            _ => {}
        }
    }
    target
        .variables
        .get(property)
        .cloned()
        .unwrap_or(Value::from(0))
}
