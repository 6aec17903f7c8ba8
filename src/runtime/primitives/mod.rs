//! Primitive registry and the block package interface.
//!
//! The registry is built once, from a fixed list of packages, and is then
//! immutable; the scheduler receives it by injection.
//!
//! # Architecture
//!
//! ```text
//! BlockPackage::primitives() ─┐
//! BlockPackage::hats()       ─┼─► PrimitiveRegistry ──► Scheduler::execute_block
//!                             │        (frozen)
//! later packages overwrite ───┘
//! ```

pub mod util;

pub use util::BlockUtility;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::runtime::events::RuntimeEvent;
use crate::runtime::value::Value;

/// Faults raised by a primitive while running.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BlockError {
    #[error("Missing argument {0}")]
    MissingArgument(String),
    #[error("Invalid argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },
    #[error("Target {0} is not available")]
    TargetUnavailable(String),
    #[error("{0}")]
    Failed(String),
}

/// Result of a primitive.
pub type BlockResult = Result<Value, BlockError>;

/// A primitive implementation, bound to whatever state its package keeps.
pub type PrimitiveFn =
    Arc<dyn Fn(&crate::runtime::value::BlockArgs, &mut BlockUtility<'_>) -> BlockResult + Send + Sync>;

/// Start-up metadata of a hat opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HatInfo {
    /// Triggering the hat while a thread for it is live replaces that thread.
    pub restart_existing_threads: bool,
}

impl HatInfo {
    #[inline]
    pub const fn restarting() -> Self {
        Self {
            restart_existing_threads: true,
        }
    }

    #[inline]
    pub const fn non_restarting() -> Self {
        Self {
            restart_existing_threads: false,
        }
    }
}

/// One opcode exported by a package.
#[derive(Clone)]
pub struct PrimitiveExport {
    pub opcode: &'static str,
    pub handler: PrimitiveFn,
}

impl PrimitiveExport {
    pub fn new<F>(
        opcode: &'static str,
        handler: F,
    ) -> Self
    where
        F: Fn(&crate::runtime::value::BlockArgs, &mut BlockUtility<'_>) -> BlockResult + Send + Sync + 'static,
    {
        Self {
            opcode,
            handler: Arc::new(handler),
        }
    }
}

impl std::fmt::Debug for PrimitiveExport {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PrimitiveExport")
            .field("opcode", &self.opcode)
            .finish()
    }
}

/// A provider of primitives and hats.
pub trait BlockPackage: Send + Sync {
    /// Package name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Opcodes this package implements.
    fn primitives(&self) -> Vec<PrimitiveExport>;

    /// Hat opcodes this package declares.
    fn hats(&self) -> Vec<(&'static str, HatInfo)> {
        Vec::new()
    }

    /// Runtime notifications, e.g. to release hardware on a global stop.
    fn on_event(
        &self,
        _event: &RuntimeEvent,
    ) {
    }
}

/// Immutable opcode table.
pub struct PrimitiveRegistry {
    primitives: HashMap<String, PrimitiveFn>,
    hats: HashMap<String, HatInfo>,
    packages: Vec<Arc<dyn BlockPackage>>,
}

impl std::fmt::Debug for PrimitiveRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("PrimitiveRegistry")
            .field("primitives_count", &self.primitives.len())
            .field("hats", &self.hats.keys().collect::<Vec<_>>())
            .field(
                "packages",
                &self.packages.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PrimitiveRegistry {
    /// Build a registry from packages, in order. On an opcode collision the
    /// later package wins.
    pub fn from_packages(packages: Vec<Arc<dyn BlockPackage>>) -> Self {
        let mut primitives = HashMap::new();
        let mut hats = HashMap::new();
        for package in &packages {
            for export in package.primitives() {
                if primitives
                    .insert(export.opcode.to_string(), export.handler)
                    .is_some()
                {
                    debug!("Package {} overrides opcode {}", package.name(), export.opcode);
                }
            }
            for (opcode, info) in package.hats() {
                hats.insert(opcode.to_string(), info);
            }
        }
        Self {
            primitives,
            hats,
            packages,
        }
    }

    /// Registry with the default block packages.
    pub fn with_defaults() -> Self {
        Self::from_packages(crate::blocks::default_packages())
    }

    /// Implementation of `opcode`.
    pub fn primitive(
        &self,
        opcode: &str,
    ) -> Option<PrimitiveFn> {
        self.primitives.get(opcode).cloned()
    }

    #[inline]
    pub fn has_primitive(
        &self,
        opcode: &str,
    ) -> bool {
        self.primitives.contains_key(opcode)
    }

    /// Hat metadata, if `opcode` is a hat.
    pub fn hat(
        &self,
        opcode: &str,
    ) -> Option<HatInfo> {
        self.hats.get(opcode).copied()
    }

    #[inline]
    pub fn is_hat(
        &self,
        opcode: &str,
    ) -> bool {
        self.hats.contains_key(opcode)
    }

    /// Sorted list of primitive opcodes.
    pub fn opcodes(&self) -> Vec<&str> {
        let mut ops: Vec<&str> = self.primitives.keys().map(String::as_str).collect();
        ops.sort_unstable();
        ops
    }

    /// Sorted list of hats with their metadata.
    pub fn hat_opcodes(&self) -> Vec<(&str, HatInfo)> {
        let mut hats: Vec<(&str, HatInfo)> = self.hats.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        hats.sort_unstable_by_key(|(k, _)| *k);
        hats
    }

    /// Body opcodes in `referenced` with no implementation. Hats only start
    /// scripts, so a hat used as a statement is missing too.
    pub fn missing<'a>(
        &self,
        referenced: impl IntoIterator<Item = &'a str>,
    ) -> Vec<String> {
        let mut missing: Vec<String> = referenced
            .into_iter()
            .filter(|op| !self.has_primitive(op))
            .map(str::to_string)
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }

    pub fn packages(&self) -> &[Arc<dyn BlockPackage>] {
        &self.packages
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}

#[cfg(test)]
mod tests;
