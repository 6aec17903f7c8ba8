//! Linker 单元测试
//!
//! 测试脚本 ID 分配、事件映射、选项事件以及全有或全无的失败语义

use serde_json::json;

use crate::linker::{EventEntry, LinkError, LinkOutput, Linker, ScriptBatch};
use crate::runtime::ids::TargetId;
use crate::runtime::uid::{is_safe_identifier, SafeIdentifierGenerator};
use crate::worker::script::parse_unit;

fn batch(value: serde_json::Value) -> ScriptBatch {
    serde_json::from_value(value).unwrap()
}

fn link(value: serde_json::Value) -> Result<LinkOutput, LinkError> {
    let mut uid = SafeIdentifierGenerator::with_seed(1);
    Linker::new().link(&batch(value), |t| t.as_str() != "ghost", &mut uid)
}

#[cfg(test)]
mod link_tests {
    use super::*;

    #[test]
    fn test_every_fragment_gets_a_script_id() {
        let output = link(json!({
            "cat": {
                "event_whenflagclicked": ["motion_movesteps STEPS=1", "looks_say MESSAGE=hi"],
                "event_whenbroadcastreceived": {"go": ["looks_show"], "stop": ["looks_hide"]}
            },
            "stage": {
                "event_whenflagclicked": ["looks_nextcostume"]
            }
        }))
        .unwrap();

        assert_eq!(output.registrations.len(), 5);
        assert!(output
            .registrations
            .keys()
            .all(|id| is_safe_identifier(id.as_str())));

        let EventEntry::Scripts(flag) = &output.unit.event_map["event_whenflagclicked"] else {
            panic!("flag event should be plain");
        };
        assert_eq!(flag.len(), 3);

        let EventEntry::Options(broadcast) = &output.unit.event_map["event_whenbroadcastreceived"] else {
            panic!("broadcast event should have options");
        };
        assert_eq!(broadcast["go"].len(), 1);
        assert_eq!(broadcast["stop"].len(), 1);
    }

    #[test]
    fn test_registrations_record_origin() {
        let output = link(json!({
            "cat": {"event_whenbroadcastreceived": {"go": ["looks_show"]}}
        }))
        .unwrap();
        let registration = output.registrations.values().next().unwrap();
        assert_eq!(registration.target, TargetId::from("cat"));
        assert_eq!(registration.event, "event_whenbroadcastreceived");
        assert_eq!(registration.option.as_deref(), Some("go"));
        assert_eq!(registration.code, "looks_show");
    }

    #[test]
    fn test_source_addresses_every_script() {
        let output = link(json!({
            "cat": {"event_whenflagclicked": ["motion_movesteps STEPS=1\nlooks_show"]},
            "stage": {"event_whenflagclicked": ["looks_nextcostume"]}
        }))
        .unwrap();

        let scripts = parse_unit(&output.unit.source).unwrap();
        assert_eq!(scripts.len(), 2);
        for script in &scripts {
            let registration = &output.registrations[&script.id];
            assert_eq!(script.target, registration.target);
        }
        assert_eq!(scripts[0].body.len(), 2);
    }

    #[test]
    fn test_opcodes_are_collected() {
        let output = link(json!({
            "cat": {"event_whenflagclicked": ["motion_movesteps STEPS=1\nset x = motion_xposition\nmotion_movesteps STEPS=2"]}
        }))
        .unwrap();
        let opcodes: Vec<&str> = output.opcodes.iter().map(String::as_str).collect();
        assert_eq!(opcodes, vec!["motion_movesteps", "motion_xposition"]);
    }

    #[test]
    fn test_same_seed_same_ids() {
        let a = link(json!({"cat": {"event_whenflagclicked": ["looks_show"]}})).unwrap();
        let b = link(json!({"cat": {"event_whenflagclicked": ["looks_show"]}})).unwrap();
        assert_eq!(
            a.registrations.keys().collect::<Vec<_>>(),
            b.registrations.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_empty_batch_links_to_empty_unit() {
        let output = link(json!({})).unwrap();
        assert!(output.registrations.is_empty());
        assert!(output.unit.source.is_empty());
        assert!(output.unit.event_map.is_empty());
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_unknown_target_fails_whole_batch() {
        let err = link(json!({
            "cat": {"event_whenflagclicked": ["looks_show"]},
            "ghost": {"event_whenflagclicked": ["looks_show"]}
        }))
        .unwrap_err();
        assert_eq!(err, LinkError::UnknownTarget(TargetId::from("ghost")));
    }

    #[test]
    fn test_syntax_error_names_event() {
        let err = link(json!({
            "cat": {"event_whenflagclicked": ["looks_show", "!!!"]}
        }))
        .unwrap_err();
        match err {
            LinkError::Syntax { target, event, source } => {
                assert_eq!(target, TargetId::from("cat"));
                assert_eq!(event, "event_whenflagclicked");
                assert_eq!(source.line, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_mixed_event_shape_is_rejected() {
        let err = link(json!({
            "cat": {"event_whenbroadcastreceived": ["looks_show"]},
            "stage": {"event_whenbroadcastreceived": {"go": ["looks_show"]}}
        }))
        .unwrap_err();
        assert_eq!(
            err,
            LinkError::MixedEventShape("event_whenbroadcastreceived".into())
        );
    }

    #[test]
    fn test_error_message() {
        let err = link(json!({"ghost": {}})).unwrap_err();
        assert_eq!(err.to_string(), "Cannot find target with id Target(ghost)");
    }
}
