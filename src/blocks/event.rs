//! Event blocks: green flag, keys and broadcasts.

use crate::runtime::primitives::{BlockPackage, BlockResult, BlockUtility, HatInfo, PrimitiveExport};
use crate::runtime::scheduler::{HatMatch, GREEN_FLAG_HAT, KEY_PRESSED_HAT};
use crate::runtime::value::{BlockArgs, Value};

use super::spawn_and_wait;

/// Hat started by broadcasts, keyed by message name.
pub const BROADCAST_HAT: &str = "event_whenbroadcastreceived";

// ============================================================================
// EventPackage - BlockPackage Implementation
// ============================================================================

/// Event package.
#[derive(Debug, Default)]
pub struct EventPackage;

impl BlockPackage for EventPackage {
    fn name(&self) -> &'static str {
        "event"
    }

    fn primitives(&self) -> Vec<PrimitiveExport> {
        vec![
            PrimitiveExport::new("event_broadcast", block_broadcast),
            PrimitiveExport::new("event_broadcastandwait", block_broadcast_and_wait),
        ]
    }

    fn hats(&self) -> Vec<(&'static str, HatInfo)> {
        vec![
            (GREEN_FLAG_HAT, HatInfo::restarting()),
            (BROADCAST_HAT, HatInfo::restarting()),
            (KEY_PRESSED_HAT, HatInfo::non_restarting()),
        ]
    }
}

// ============================================================================
// Block Implementations
// ============================================================================

fn broadcast_name(args: &BlockArgs) -> String {
    args.string("BROADCAST_OPTION")
}

/// event_broadcast: start receivers and carry on.
fn block_broadcast(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let message = broadcast_name(args);
    util.start_hats(BROADCAST_HAT, &HatMatch::option(message))?;
    Ok(Value::Null)
}

/// event_broadcastandwait: start receivers, then wait for all of them.
fn block_broadcast_and_wait(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let message = broadcast_name(args);
    spawn_and_wait(util, |util| util.start_hats(BROADCAST_HAT, &HatMatch::option(message)))?;
    Ok(Value::Null)
}
