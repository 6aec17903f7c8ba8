//! Motion blocks.

use crate::runtime::primitives::{BlockError, BlockPackage, BlockResult, BlockUtility, PrimitiveExport};
use crate::runtime::stage::RotationStyle;
use crate::runtime::value::{cast, BlockArgs, Value};

// ============================================================================
// MotionPackage - BlockPackage Implementation
// ============================================================================

/// Motion package. Every block is a no-op on the stage target.
#[derive(Debug, Default)]
pub struct MotionPackage;

impl BlockPackage for MotionPackage {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn primitives(&self) -> Vec<PrimitiveExport> {
        vec![
            PrimitiveExport::new("motion_movesteps", block_move_steps),
            PrimitiveExport::new("motion_gotoxy", block_go_to_xy),
            PrimitiveExport::new("motion_glidesecstoxy", block_glide_secs_to_xy),
            PrimitiveExport::new("motion_turnright", block_turn_right),
            PrimitiveExport::new("motion_turnleft", block_turn_left),
            PrimitiveExport::new("motion_pointindirection", block_point_in_direction),
            PrimitiveExport::new("motion_changexby", block_change_x_by),
            PrimitiveExport::new("motion_setx", block_set_x),
            PrimitiveExport::new("motion_changeyby", block_change_y_by),
            PrimitiveExport::new("motion_sety", block_set_y),
            PrimitiveExport::new("motion_setrotationstyle", block_set_rotation_style),
            PrimitiveExport::new("motion_xposition", block_x_position),
            PrimitiveExport::new("motion_yposition", block_y_position),
            PrimitiveExport::new("motion_direction", block_direction),
        ]
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Current position and direction of the running target.
fn pose(util: &BlockUtility<'_>) -> Result<(f64, f64, f64), BlockError> {
    let target = util.require_target()?;
    Ok((target.x, target.y, target.direction))
}

fn move_to(
    util: &mut BlockUtility<'_>,
    x: f64,
    y: f64,
) {
    let id = util.target_id().clone();
    util.stage_mut().set_xy(&id, x, y, true);
}

fn point(
    util: &mut BlockUtility<'_>,
    direction: f64,
) {
    let id = util.target_id().clone();
    util.stage_mut().set_direction(&id, direction);
}

/// Round-trip through the display cast so reporters give tidy numbers.
fn limit_precision(n: f64) -> Value {
    let rounded = (n * 1e8).round() / 1e8;
    cast::number_value(rounded)
}

// ============================================================================
// Block Implementations
// ============================================================================

/// motion_movesteps STEPS
fn block_move_steps(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let steps = args.number("STEPS");
    let (x, y, direction) = pose(util)?;
    let radians = (90.0 - direction).to_radians();
    move_to(util, x + steps * radians.cos(), y + steps * radians.sin());
    Ok(Value::Null)
}

/// motion_gotoxy X Y
fn block_go_to_xy(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    move_to(util, args.number("X"), args.number("Y"));
    Ok(Value::Null)
}

/// motion_glidesecstoxy SECS X Y
///
/// Interpolates once per tick. The start point is kept in frame scratch.
fn block_glide_secs_to_xy(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let secs = args.number("SECS").max(0.0);
    let (end_x, end_y) = (args.number("X"), args.number("Y"));
    let now = util.now_ms();

    if util.is_first_run() {
        let (x, y, _) = pose(util)?;
        let locals = util.locals();
        locals.deadline_ms = Some(now + secs * 1000.0);
        locals.scratch = Some(serde_json::json!([x, y, now]));
        if secs > 0.0 {
            util.yield_thread();
            return Ok(Value::Null);
        }
    }

    let (start_x, start_y, started) = match util.locals().scratch.as_ref() {
        Some(Value::Array(items)) if items.len() == 3 => (
            cast::to_number(&items[0]),
            cast::to_number(&items[1]),
            cast::to_number(&items[2]),
        ),
        _ => (end_x, end_y, now),
    };
    let elapsed = now - started;
    let total = secs * 1000.0;
    if elapsed < total {
        let fraction = elapsed / total;
        move_to(
            util,
            start_x + (end_x - start_x) * fraction,
            start_y + (end_y - start_y) * fraction,
        );
        util.yield_thread();
    } else {
        move_to(util, end_x, end_y);
    }
    Ok(Value::Null)
}

/// motion_turnright DEGREES
fn block_turn_right(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let (_, _, direction) = pose(util)?;
    point(util, direction + args.number("DEGREES"));
    Ok(Value::Null)
}

/// motion_turnleft DEGREES
fn block_turn_left(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let (_, _, direction) = pose(util)?;
    point(util, direction - args.number("DEGREES"));
    Ok(Value::Null)
}

/// motion_pointindirection DIRECTION
fn block_point_in_direction(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    point(util, args.number("DIRECTION"));
    Ok(Value::Null)
}

fn block_change_x_by(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let (x, y, _) = pose(util)?;
    move_to(util, x + args.number("DX"), y);
    Ok(Value::Null)
}

fn block_set_x(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let (_, y, _) = pose(util)?;
    move_to(util, args.number("X"), y);
    Ok(Value::Null)
}

fn block_change_y_by(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let (x, y, _) = pose(util)?;
    move_to(util, x, y + args.number("DY"));
    Ok(Value::Null)
}

fn block_set_y(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let (x, _, _) = pose(util)?;
    move_to(util, x, args.number("Y"));
    Ok(Value::Null)
}

/// motion_setrotationstyle STYLE
fn block_set_rotation_style(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let text = args.string("STYLE");
    let style = RotationStyle::parse(&text).ok_or_else(|| BlockError::InvalidArgument {
        name: "STYLE".into(),
        reason: format!("unknown rotation style '{}'", text),
    })?;
    let id = util.target_id().clone();
    util.stage_mut().set_rotation_style(&id, style);
    Ok(Value::Null)
}

fn block_x_position(
    _args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let (x, _, _) = pose(util)?;
    Ok(limit_precision(x))
}

fn block_y_position(
    _args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let (_, y, _) = pose(util)?;
    Ok(limit_precision(y))
}

fn block_direction(
    _args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let (_, _, direction) = pose(util)?;
    Ok(cast::number_value(direction))
}
