//! Control blocks: waiting, stopping and clones.

use tracing::debug;

use crate::runtime::ids::TargetId;
use crate::runtime::primitives::{
    BlockError, BlockPackage, BlockResult, BlockUtility, HatInfo, PrimitiveExport,
};
use crate::runtime::scheduler::START_AS_CLONE_HAT;
use crate::runtime::value::{BlockArgs, Value};

/// Clone menu entry meaning the running sprite.
pub const MYSELF: &str = "_myself_";

// ============================================================================
// ControlPackage - BlockPackage Implementation
// ============================================================================

/// Control package.
#[derive(Debug, Default)]
pub struct ControlPackage;

impl BlockPackage for ControlPackage {
    fn name(&self) -> &'static str {
        "control"
    }

    fn primitives(&self) -> Vec<PrimitiveExport> {
        vec![
            PrimitiveExport::new("control_wait", block_wait),
            PrimitiveExport::new("control_stop", block_stop),
            PrimitiveExport::new("control_create_clone_of", block_create_clone_of),
            PrimitiveExport::new("control_delete_this_clone", block_delete_this_clone),
        ]
    }

    fn hats(&self) -> Vec<(&'static str, HatInfo)> {
        vec![(START_AS_CLONE_HAT, HatInfo::non_restarting())]
    }
}

// ============================================================================
// Block Implementations
// ============================================================================

/// Yield until `secs` of project time have passed since the first run.
///
/// Shared with the timed looks and motion blocks.
pub(crate) fn wait_for_secs(
    util: &mut BlockUtility<'_>,
    secs: f64,
) -> bool {
    let now = util.now_ms();
    let deadline = *util
        .locals()
        .deadline_ms
        .get_or_insert(now + secs.max(0.0) * 1000.0);
    if now < deadline {
        util.yield_thread();
        return false;
    }
    true
}

/// control_wait DURATION
fn block_wait(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let secs = args.number("DURATION");
    if util.is_first_run() {
        // Always give up the rest of this tick, even for a zero wait.
        util.locals().deadline_ms = Some(util.now_ms() + secs.max(0.0) * 1000.0);
        util.yield_thread();
        return Ok(Value::Null);
    }
    wait_for_secs(util, secs);
    Ok(Value::Null)
}

/// control_stop STOP_OPTION
fn block_stop(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    match args.string("STOP_OPTION").as_str() {
        "all" => util.stop_all(),
        "this script" => util.stop_this_thread(),
        "other scripts in sprite" | "other scripts in stage" => util.stop_other_threads(),
        other => {
            return Err(BlockError::InvalidArgument {
                name: "STOP_OPTION".into(),
                reason: format!("unknown option '{}'", other),
            });
        }
    }
    Ok(Value::Null)
}

/// control_create_clone_of CLONE_OPTION
///
/// Returns the clone id, or null when no clone was made.
fn block_create_clone_of(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let option = args.string("CLONE_OPTION");
    let source: TargetId = if option == MYSELF {
        util.target_id().clone()
    } else {
        match util.stage().sprite_by_name(&option) {
            Some(sprite) => sprite.id().clone(),
            None => {
                debug!("No sprite named '{}' to clone", option);
                return Ok(Value::Null);
            }
        }
    };
    Ok(match util.make_clone(&source)? {
        Some(id) => Value::String(id.into_inner()),
        None => Value::Null,
    })
}

/// control_delete_this_clone
fn block_delete_this_clone(
    _args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    util.dispose_this_clone();
    Ok(Value::Null)
}
