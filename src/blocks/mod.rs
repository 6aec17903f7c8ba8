//! Default block packages.
//!
//! Each package is a leaf: it implements opcodes against the
//! [`BlockUtility`](crate::runtime::primitives::BlockUtility) contract and
//! holds no scheduling logic of its own.

pub mod control;
pub mod event;
pub mod looks;
pub mod motion;
pub mod peripheral;
pub mod procedures;
pub mod sensing;

use std::sync::Arc;

use crate::runtime::primitives::BlockPackage;

pub use control::ControlPackage;
pub use event::EventPackage;
pub use looks::LooksPackage;
pub use motion::MotionPackage;
pub use peripheral::{LoopbackMotorLink, MotorLink, PeripheralPackage};
pub use procedures::ProceduresPackage;
pub use sensing::SensingPackage;

/// The packages every runtime starts with, in registration order.
pub fn default_packages() -> Vec<Arc<dyn BlockPackage>> {
    vec![
        Arc::new(EventPackage),
        Arc::new(ControlPackage),
        Arc::new(MotionPackage),
        Arc::new(LooksPackage),
        Arc::new(SensingPackage),
        Arc::new(ProceduresPackage),
        Arc::new(PeripheralPackage::new(Box::new(LoopbackMotorLink::default()))),
    ]
}

/// Shared helper for "start sub-threads, then wait for all of them".
///
/// On the first run `spawn` is called and its thread ids are saved in the
/// frame; every run after that yields while any of them is still active.
/// Returns the spawned ids once all are finished.
pub(crate) fn spawn_and_wait(
    util: &mut crate::runtime::primitives::BlockUtility<'_>,
    spawn: impl FnOnce(
        &mut crate::runtime::primitives::BlockUtility<'_>,
    ) -> Result<Vec<crate::runtime::ids::ThreadId>, crate::runtime::primitives::BlockError>,
) -> Result<Option<Vec<crate::runtime::ids::ThreadId>>, crate::runtime::primitives::BlockError> {
    if util.is_first_run() {
        let spawned = spawn(util)?;
        util.locals().spawned.extend(spawned);
    }
    let waiting = util
        .frame()
        .locals
        .spawned
        .iter()
        .any(|id| util.is_thread_active(id));
    if waiting {
        util.yield_thread();
        return Ok(None);
    }
    Ok(Some(util.frame().locals.spawned.to_vec()))
}
