//! Custom procedures.
//!
//! A procedure body is a script under a definition hat whose option is the
//! procedure code. Calls start the body on the caller's own target and wait
//! for it; a reporting call then collects the value the body reported.

use crate::runtime::primitives::{BlockPackage, BlockResult, BlockUtility, HatInfo, PrimitiveExport};
use crate::runtime::scheduler::HatMatch;
use crate::runtime::value::{BlockArgs, Value};

use super::spawn_and_wait;

pub const DEFINE_HAT: &str = "procedures_defnoreturn";
pub const DEFINE_RETURN_HAT: &str = "procedures_defreturn";

// ============================================================================
// ProceduresPackage - BlockPackage Implementation
// ============================================================================

#[derive(Debug, Default)]
pub struct ProceduresPackage;

impl BlockPackage for ProceduresPackage {
    fn name(&self) -> &'static str {
        "procedures"
    }

    fn primitives(&self) -> Vec<PrimitiveExport> {
        vec![
            PrimitiveExport::new("procedures_callnoreturn", block_call_no_return),
            PrimitiveExport::new("procedures_callreturn", block_call_return),
            PrimitiveExport::new("procedures_report", block_report),
        ]
    }

    fn hats(&self) -> Vec<(&'static str, HatInfo)> {
        vec![
            (DEFINE_HAT, HatInfo::non_restarting()),
            (DEFINE_RETURN_HAT, HatInfo::non_restarting()),
        ]
    }
}

// ============================================================================
// Block Implementations
// ============================================================================

fn call(
    hat: &'static str,
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> Result<Option<Vec<crate::runtime::ids::ThreadId>>, crate::runtime::primitives::BlockError> {
    let code = args.string("PROCCODE");
    let target = util.target_id().clone();
    spawn_and_wait(util, |util| util.start_hats(hat, &HatMatch::option(code).with_target(target)))
}

/// procedures_callnoreturn PROCCODE
///
/// Waits for the body, so the caller continues only after it has run.
fn block_call_no_return(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    call(DEFINE_HAT, args, util)?;
    Ok(Value::Null)
}

/// procedures_callreturn PROCCODE
///
/// Reports "" when the body finished without reporting.
fn block_call_return(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let Some(callees) = call(DEFINE_RETURN_HAT, args, util)? else {
        return Ok(Value::Null);
    };
    let mut value = None;
    for callee in &callees {
        if let Some(reported) = util.take_return(callee) {
            value.get_or_insert(reported);
        }
    }
    Ok(value.unwrap_or_else(|| Value::String(String::new())))
}

/// procedures_report VALUE: hand the value back and end the body.
fn block_report(
    args: &BlockArgs,
    util: &mut BlockUtility<'_>,
) -> BlockResult {
    let value = args.get("VALUE").cloned().unwrap_or(Value::Null);
    util.report_return(value);
    util.stop_this_thread();
    Ok(Value::Null)
}
