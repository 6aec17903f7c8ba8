//! PrimitiveRegistry 单元测试
//!
//! 测试包注册顺序、操作码覆盖、帽子块元数据和缺失检测

use std::sync::Arc;
use std::time::Duration;

use crate::runtime::ids::TargetId;
use crate::runtime::primitives::{
    BlockError, BlockPackage, BlockResult, BlockUtility, HatInfo, PrimitiveExport, PrimitiveRegistry,
};
use crate::runtime::scheduler::{BlockOutcome, Scheduler, SchedulerConfig};
use crate::runtime::stage::Target;
use crate::runtime::value::{BlockArgs, Value};
use crate::worker::{script_worker_bridge, WorkerMode};

/// Package whose single primitive returns a fixed value.
struct Constant {
    name: &'static str,
    value: i64,
}

impl BlockPackage for Constant {
    fn name(&self) -> &'static str {
        self.name
    }

    fn primitives(&self) -> Vec<PrimitiveExport> {
        let value = self.value;
        vec![
            PrimitiveExport::new("test_value", move |_args: &BlockArgs, _util: &mut BlockUtility<'_>| -> BlockResult {
                Ok(Value::from(value))
            }),
            PrimitiveExport::new(self.name, |_args: &BlockArgs, _util: &mut BlockUtility<'_>| -> BlockResult {
                Err(BlockError::Failed("unused".into()))
            }),
        ]
    }

    fn hats(&self) -> Vec<(&'static str, HatInfo)> {
        if self.value == 1 {
            vec![("test_when", HatInfo::restarting())]
        } else {
            vec![("test_when", HatInfo::non_restarting())]
        }
    }
}

fn registry() -> PrimitiveRegistry {
    let packages: Vec<Arc<dyn BlockPackage>> = vec![
        Arc::new(Constant {
            name: "first",
            value: 1,
        }),
        Arc::new(Constant {
            name: "second",
            value: 2,
        }),
    ];
    PrimitiveRegistry::from_packages(packages)
}

#[cfg(test)]
mod registry_tests {
    use super::*;

    #[test]
    fn test_later_package_wins() {
        let registry = Arc::new(registry());
        assert_eq!(registry.hat("test_when"), Some(HatInfo::non_restarting()));

        let bridge = script_worker_bridge(WorkerMode::Inline, Duration::from_secs(1), None).unwrap();
        let mut scheduler = Scheduler::new(SchedulerConfig::default(), registry, bridge);
        scheduler.add_target(Target::sprite("cat", "Cat"));
        let thread = scheduler.register_thread(&TargetId::from("cat"), None);
        let outcome = scheduler
            .execute_block(&thread, "test_value", BlockArgs::new(), None)
            .unwrap();
        assert_eq!(outcome, BlockOutcome::Completed(Value::from(2)));
    }

    #[test]
    fn test_opcodes_are_sorted() {
        let registry = registry();
        assert_eq!(registry.opcodes(), vec!["first", "second", "test_value"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_hat_lookup() {
        let registry = registry();
        assert!(registry.is_hat("test_when"));
        assert!(!registry.is_hat("test_value"));
        assert!(registry.hat("nope").is_none());
        assert_eq!(registry.hat_opcodes().len(), 1);
    }

    #[test]
    fn test_missing_ignores_known_and_dedups() {
        let registry = registry();
        let missing = registry.missing(["test_value", "zzz", "aaa", "zzz"]);
        assert_eq!(missing, vec!["aaa".to_string(), "zzz".to_string()]);
    }

    #[test]
    fn test_hat_is_not_a_statement() {
        let registry = registry();
        assert!(registry.is_hat("test_when"));
        assert!(!registry.has_primitive("test_when"));
        assert_eq!(registry.missing(["test_when"]), vec!["test_when".to_string()]);
    }

    #[test]
    fn test_packages_keep_order() {
        let registry = registry();
        let names: Vec<&str> = registry.packages().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_empty_registry() {
        let registry = PrimitiveRegistry::from_packages(Vec::new());
        assert!(registry.is_empty());
        assert!(registry.opcodes().is_empty());
    }

    #[test]
    fn test_defaults_cover_core_packages() {
        let registry = PrimitiveRegistry::with_defaults();
        for opcode in [
            "event_broadcast",
            "control_wait",
            "motion_movesteps",
            "looks_say",
            "sensing_timer",
            "procedures_callnoreturn",
            "peripheral_setmotorspeed",
        ] {
            assert!(registry.has_primitive(opcode), "{opcode} missing");
        }
        assert!(registry.is_hat("event_whenflagclicked"));
        assert_eq!(
            registry.hat("control_start_as_clone"),
            Some(HatInfo::non_restarting())
        );
    }
}
