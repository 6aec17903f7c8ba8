//! Looks blocks: bubbles, visibility, size, costumes, effects and layers.

use crate::runtime::primitives::{BlockError, BlockPackage, BlockResult, BlockUtility, PrimitiveExport};
use crate::runtime::stage::{Bubble, BubbleKind};
use crate::runtime::value::{cast, BlockArgs, Value};

use super::control::wait_for_secs;

// ============================================================================
// LooksPackage - BlockPackage Implementation
// ============================================================================

/// Looks package.
#[derive(Debug, Default)]
pub struct LooksPackage;

impl BlockPackage for LooksPackage {
    fn name(&self) -> &'static str {
        "looks"
    }

    fn primitives(&self) -> Vec<PrimitiveExport> {
        vec![
            PrimitiveExport::new("looks_say", block_say),
            PrimitiveExport::new("looks_sayforsecs", block_say_for_secs),
            PrimitiveExport::new("looks_think", block_think),
            PrimitiveExport::new("looks_thinkforsecs", block_think_for_secs),
            PrimitiveExport::new("looks_show", block_show),
            PrimitiveExport::new("looks_hide", block_hide),
            PrimitiveExport::new("looks_setsizeto", block_set_size_to),
            PrimitiveExport::new("looks_changesizeby", block_change_size_by),
            PrimitiveExport::new("looks_size", block_size),
            PrimitiveExport::new("looks_switchcostumeto", block_switch_costume_to),
            PrimitiveExport::new("looks_nextcostume", block_next_costume),
            PrimitiveExport::new("looks_costumenumbername", block_costume_number),
            PrimitiveExport::new("looks_seteffectto", block_set_effect_to),
            PrimitiveExport::new("looks_changeeffectby", block_change_effect_by),
            PrimitiveExport::new("looks_cleargraphiceffects", block_clear_graphic_effects),
            PrimitiveExport::new("looks_gotofrontback", block_go_to_front_back),
            PrimitiveExport::new("looks_goforwardbackwardlayers", block_go_forward_backward_layers),
        ]
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn bubble(
    util: &mut BlockUtility<'_>,
    kind: BubbleKind,
    text: String,
) {
    let id = util.target_id().clone();
    util.stage_mut().set_bubble(&id, Some(Bubble { kind, text }));
}

fn clear_bubble(util: &mut BlockUtility<'_>) {
    let id = util.target_id().clone();
    util.stage_mut().set_bubble(&id, None);
}

/// Show a bubble for `SECS`, then clear it if it is still ours.
fn timed_bubble(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
    kind: BubbleKind,
) -> BlockResult {
    let text = args.string("MESSAGE");
    if util.is_first_run() {
        bubble(util, kind, text);
        let now = util.now_ms();
        util.locals().deadline_ms = Some(now + args.number("SECS").max(0.0) * 1000.0);
        util.yield_thread();
        return Ok(Value::Null);
    }
    if wait_for_secs(util, args.number("SECS")) {
        let unchanged = util
            .target()
            .and_then(|t| t.bubble.as_ref())
            .is_some_and(|b| b.kind == kind && b.text == text);
        if unchanged {
            clear_bubble(util);
        }
    }
    Ok(Value::Null)
}

fn effect_name(args: &BlockArgs) -> String {
    args.string("EFFECT").to_lowercase()
}

// ============================================================================
// Block Implementations
// ============================================================================

/// looks_say MESSAGE
fn block_say(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    bubble(util, BubbleKind::Say, args.string("MESSAGE"));
    Ok(Value::Null)
}

/// looks_sayforsecs MESSAGE SECS
fn block_say_for_secs(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    timed_bubble(args, util, BubbleKind::Say)
}

/// looks_think MESSAGE
fn block_think(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    bubble(util, BubbleKind::Think, args.string("MESSAGE"));
    Ok(Value::Null)
}

fn block_think_for_secs(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    timed_bubble(args, util, BubbleKind::Think)
}

fn block_show(
    _args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let id = util.target_id().clone();
    util.stage_mut().set_visible(&id, true);
    Ok(Value::Null)
}

fn block_hide(
    _args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let id = util.target_id().clone();
    util.stage_mut().set_visible(&id, false);
    Ok(Value::Null)
}

/// looks_setsizeto SIZE (percent)
fn block_set_size_to(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let id = util.target_id().clone();
    util.stage_mut().set_size(&id, args.number("SIZE"));
    Ok(Value::Null)
}

/// looks_changesizeby CHANGE
fn block_change_size_by(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let size = util.require_target()?.size;
    let id = util.target_id().clone();
    util.stage_mut().set_size(&id, size + args.number("CHANGE"));
    Ok(Value::Null)
}

fn block_size(
    _args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    Ok(cast::number_value(util.require_target()?.size.round()))
}

/// looks_switchcostumeto COSTUME, a 1-based costume number.
fn block_switch_costume_to(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let number = args.number("COSTUME");
    if !number.is_finite() {
        return Err(BlockError::InvalidArgument {
            name: "COSTUME".into(),
            reason: "not a costume number".into(),
        });
    }
    let id = util.target_id().clone();
    util.stage_mut().set_costume(&id, number.round() as i64 - 1);
    Ok(Value::Null)
}

fn block_next_costume(
    _args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let costume = util.require_target()?.costume as i64;
    let id = util.target_id().clone();
    util.stage_mut().set_costume(&id, costume + 1);
    Ok(Value::Null)
}

/// looks_costumenumbername, reporting the 1-based number.
fn block_costume_number(
    _args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let costume = util.require_target()?.costume;
    Ok(Value::from(costume as u64 + 1))
}

/// looks_seteffectto EFFECT VALUE
fn block_set_effect_to(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let id = util.target_id().clone();
    util.stage_mut()
        .set_effect(&id, &effect_name(args), args.number("VALUE"));
    Ok(Value::Null)
}

/// looks_changeeffectby EFFECT CHANGE
fn block_change_effect_by(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let effect = effect_name(args);
    let current = util
        .require_target()?
        .effects
        .get(&effect)
        .copied()
        .unwrap_or(0.0);
    let id = util.target_id().clone();
    util.stage_mut()
        .set_effect(&id, &effect, current + args.number("CHANGE"));
    Ok(Value::Null)
}

fn block_clear_graphic_effects(
    _args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let id = util.target_id().clone();
    util.stage_mut().clear_effects(&id);
    Ok(Value::Null)
}

/// looks_gotofrontback FRONT_BACK ("front" or "back")
fn block_go_to_front_back(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let position = match args.string("FRONT_BACK").as_str() {
        "front" => i32::MAX,
        "back" => 0,
        other => {
            return Err(BlockError::InvalidArgument {
                name: "FRONT_BACK".into(),
                reason: format!("expected front or back, got '{}'", other),
            });
        }
    };
    let id = util.target_id().clone();
    util.stage_mut().set_layer_order(&id, position, false);
    Ok(Value::Null)
}

/// looks_goforwardbackwardlayers FORWARD_BACKWARD NUM
fn block_go_forward_backward_layers(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let layers = args.number("NUM").round() as i32;
    let delta = if args.string("FORWARD_BACKWARD") == "backward" {
        -layers
    } else {
        layers
    };
    let id = util.target_id().clone();
    util.stage_mut().set_layer_order(&id, delta, true);
    Ok(Value::Null)
}
