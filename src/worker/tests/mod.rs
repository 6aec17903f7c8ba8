//! Worker 单元测试
//!
//! 测试令牌表、脚本语言解析、ScriptWorker 协议流程以及两种传输方式

use std::time::{Duration, Instant};

use serde_json::json;

use crate::linker::LinkedUnit;
use crate::runtime::ids::{ReplyToken, ScriptId, TargetId, ThreadId};
use crate::runtime::value::{BlockArgs, Value};
use crate::worker::backend::{Backend, ScriptWorker};
use crate::worker::bridge::WorkerBridge;
use crate::worker::protocol::{FromVm, ThreadStart, ToVm};
use crate::worker::script::{parse_body, parse_unit, render_unit, Operand, SectionHeader};
use crate::worker::tokens::{PendingTokens, TokenError};
use crate::worker::transport::{InlineTransport, ThreadTransport, Transport};
use crate::worker::BridgeError;

fn token(text: &str) -> ReplyToken {
    ReplyToken::from(text)
}

fn unit(sections: &[(&str, &str, &str)]) -> LinkedUnit {
    let source = render_unit(sections.iter().map(|(script, target, code)| {
        (
            SectionHeader {
                script: ScriptId::from(*script),
                target: TargetId::from(*target),
            },
            *code,
        )
    }));
    LinkedUnit {
        source,
        event_map: Default::default(),
    }
}

fn start(
    thread: &str,
    script: &str,
) -> ThreadStart {
    ThreadStart {
        thread_id: ThreadId::from(thread),
        script_id: ScriptId::from(script),
        target_id: TargetId::from("cat"),
    }
}

/// Worker with one registered script, outbox drained.
fn worker_with(code: &str) -> ScriptWorker {
    let mut worker = ScriptWorker::new(None);
    let mut outbox = Vec::new();
    worker.handle(
        FromVm::RegisterThreads {
            token: token("h-0"),
            unit: unit(&[("s1", "cat", code)]),
        },
        &mut outbox,
    );
    worker
}

fn start_hats(
    worker: &mut ScriptWorker,
    starts: Vec<ThreadStart>,
) -> Vec<ToVm> {
    let mut outbox = Vec::new();
    worker.handle(
        FromVm::StartHats {
            token: token("h-1"),
            hat: "event_whenflagclicked".into(),
            option: None,
            starts,
        },
        &mut outbox,
    );
    outbox
}

fn reply(
    worker: &mut ScriptWorker,
    to: &str,
    value: Value,
) -> Vec<ToVm> {
    let mut outbox = Vec::new();
    worker.handle(
        FromVm::ResultValue {
            token: token(to),
            value,
        },
        &mut outbox,
    );
    outbox
}

fn block_op(
    opcode: &str,
    args: BlockArgs,
    to: &str,
) -> ToVm {
    ToVm::BlockOp {
        target_id: TargetId::from("cat"),
        thread_id: ThreadId::from("t1"),
        op_code: opcode.into(),
        args,
        token: token(to),
    }
}

/// Backend that swallows everything.
struct Silent;

impl Backend for Silent {
    fn handle(
        &mut self,
        _message: FromVm,
        _outbox: &mut Vec<ToVm>,
    ) {
    }
}

#[cfg(test)]
mod token_tests {
    use super::*;

    #[test]
    fn test_resolve_is_one_shot() {
        let mut pending = PendingTokens::new();
        pending.register(token("w-0"), 1, None).unwrap();
        assert_eq!(pending.resolve(&token("w-0")), Some(1));
        assert_eq!(pending.resolve(&token("w-0")), None);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut pending = PendingTokens::new();
        pending.register(token("w-0"), 1, None).unwrap();
        let err = pending.register(token("w-0"), 2, None).unwrap_err();
        assert_eq!(err, TokenError::Duplicate(token("w-0")));
        assert_eq!(pending.resolve(&token("w-0")), Some(1));
    }

    #[test]
    fn test_expire_takes_only_due_entries() {
        let now = Instant::now();
        let mut pending = PendingTokens::new();
        pending.register(token("a"), "due", Some(now)).unwrap();
        pending
            .register(token("b"), "later", Some(now + Duration::from_secs(60)))
            .unwrap();
        pending.register(token("c"), "never", None).unwrap();

        let expired = pending.expire(now);
        assert_eq!(expired, vec![(token("a"), "due")]);
        assert_eq!(pending.len(), 2);
        assert!(pending.resolve(&token("a")).is_none());
    }

    #[test]
    fn test_retain_drops_by_continuation() {
        let mut pending = PendingTokens::new();
        pending.register(token("a"), 1, None).unwrap();
        pending.register(token("b"), 2, None).unwrap();
        pending.retain(|v| *v != 1);
        assert!(!pending.contains(&token("a")));
        assert!(pending.contains(&token("b")));
    }
}

#[cfg(test)]
mod script_tests {
    use super::*;

    #[test]
    fn test_parse_statements_and_operands() {
        let body = parse_body(
            "# comment\n\nmotion_movesteps STEPS=10\nset pos = motion_xposition\nlooks_say MESSAGE=$pos FLAG=true\nlooks_say MESSAGE=\"hello there\"\n",
        )
        .unwrap();
        assert_eq!(body.len(), 4);

        assert_eq!(body[0].line, 3);
        assert_eq!(body[0].opcode, "motion_movesteps");
        assert_eq!(body[0].args, vec![("STEPS".to_string(), Operand::Literal(json!(10)))]);

        assert_eq!(body[1].assign.as_deref(), Some("pos"));
        assert!(body[1].args.is_empty());

        assert_eq!(body[2].args[0], ("MESSAGE".to_string(), Operand::Var("pos".into())));
        assert_eq!(body[2].args[1], ("FLAG".to_string(), Operand::Literal(json!(true))));

        assert_eq!(body[3].args[0].1, Operand::Literal(json!("hello there")));
    }

    #[test]
    fn test_non_numeric_literal_is_string() {
        let body = parse_body("looks_say MESSAGE=hi").unwrap();
        assert_eq!(body[0].args[0].1, Operand::Literal(json!("hi")));
    }

    #[test]
    fn test_parse_errors_carry_line() {
        let err = parse_body("motion_movesteps STEPS=10\n!!!").unwrap_err();
        assert_eq!(err.line, 2);

        let err = parse_body("looks_say MESSAGE=$").unwrap_err();
        assert_eq!(err.message, "empty variable name");

        let err = parse_body("looks_say MESSAGE=\"open").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_bind_args_reports_unknown_variable() {
        let body = parse_body("looks_say MESSAGE=$missing").unwrap();
        let err = body[0].bind_args(|_| None).unwrap_err();
        assert_eq!(err, "missing");

        let args = body[0].bind_args(|_| Some(json!(3))).unwrap();
        assert_eq!(args.get("MESSAGE"), Some(&json!(3)));
    }

    #[test]
    fn test_unit_sections_parse_back() {
        let unit = unit(&[
            ("s1", "cat", "motion_movesteps STEPS=1"),
            ("s2", "stage", "# nothing\n"),
        ]);
        let scripts = parse_unit(&unit.source).unwrap();
        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts[0].id, ScriptId::from("s1"));
        assert_eq!(scripts[0].target, TargetId::from("cat"));
        assert_eq!(scripts[0].body.len(), 1);
        assert!(scripts[1].body.is_empty());
    }

    #[test]
    fn test_unit_errors() {
        assert!(parse_unit("motion_movesteps STEPS=1").is_err());

        let err = parse_unit("@script {\"script\":\"s1\",\"target\":\"cat\"}\nmotion_movesteps").unwrap_err();
        assert_eq!(err.line, 1);

        // Body errors are reported against the unit's own line numbers.
        let err = parse_unit("@script {\"script\":\"s1\",\"target\":\"cat\"}\nok\n!!!\n@end\n").unwrap_err();
        assert_eq!(err.line, 3);
    }
}

#[cfg(test)]
mod worker_tests {
    use super::*;

    #[test]
    fn test_init_backend_reports_environment() {
        let mut worker = ScriptWorker::default();
        let mut outbox = Vec::new();
        worker.handle(
            FromVm::InitBackend {
                backend_url: String::new(),
            },
            &mut outbox,
        );
        assert_eq!(outbox, vec![ToVm::EnvironmentLoading, ToVm::EnvironmentLoaded]);
    }

    #[test]
    fn test_register_acknowledges_with_token() {
        let mut worker = ScriptWorker::new(None);
        let mut outbox = Vec::new();
        worker.handle(
            FromVm::RegisterThreads {
                token: token("h-0"),
                unit: unit(&[("s1", "cat", "motion_movesteps STEPS=1")]),
            },
            &mut outbox,
        );
        assert_eq!(
            outbox,
            vec![
                ToVm::ScriptLoading,
                ToVm::ThreadsRegistered {
                    token: token("h-0"),
                    error: None,
                },
            ]
        );
        assert_eq!(worker.script_count(), 1);
    }

    #[test]
    fn test_register_rejects_bad_unit() {
        let mut worker = ScriptWorker::new(None);
        let mut outbox = Vec::new();
        worker.handle(
            FromVm::RegisterThreads {
                token: token("h-0"),
                unit: LinkedUnit {
                    source: "garbage".into(),
                    event_map: Default::default(),
                },
            },
            &mut outbox,
        );
        assert!(matches!(outbox[1], ToVm::ScriptError { thread_id: None, .. }));
        assert!(matches!(outbox[2], ToVm::ThreadsRegistered { error: Some(_), .. }));
    }

    #[test]
    fn test_script_runs_block_by_block() {
        let mut worker = worker_with("probe_a X=1\nset v = probe_b\nprobe_c Y=$v");

        let out = start_hats(&mut worker, vec![start("t1", "s1")]);
        assert_eq!(
            out,
            vec![
                ToVm::ScriptRunning,
                ToVm::HatsStarted {
                    token: token("h-1"),
                    thread_ids: vec![ThreadId::from("t1")],
                },
                block_op("probe_a", BlockArgs::new().with("X", 1), "w-0"),
            ]
        );

        let out = reply(&mut worker, "w-0", Value::Null);
        assert_eq!(out, vec![block_op("probe_b", BlockArgs::new(), "w-1")]);

        let out = reply(&mut worker, "w-1", json!("hi"));
        assert_eq!(out, vec![block_op("probe_c", BlockArgs::new().with("Y", "hi"), "w-2")]);

        let out = reply(&mut worker, "w-2", Value::Null);
        assert_eq!(
            out,
            vec![
                ToVm::EndOfThread {
                    thread_id: ThreadId::from("t1"),
                },
                ToVm::ScriptFinished,
            ]
        );
        assert_eq!(worker.running_count(), 0);
    }

    #[test]
    fn test_second_reply_is_ignored() {
        let mut worker = worker_with("probe_a\nprobe_b");
        start_hats(&mut worker, vec![start("t1", "s1")]);
        assert_eq!(reply(&mut worker, "w-0", Value::Null).len(), 1);
        assert!(reply(&mut worker, "w-0", Value::Null).is_empty());
        assert_eq!(worker.pending_count(), 1);
    }

    #[test]
    fn test_unknown_script_is_not_started() {
        let mut worker = worker_with("probe_a");
        let out = start_hats(&mut worker, vec![start("t1", "nope")]);
        assert_eq!(
            out,
            vec![ToVm::HatsStarted {
                token: token("h-1"),
                thread_ids: Vec::new(),
            }]
        );
    }

    #[test]
    fn test_result_error_fails_thread() {
        let mut worker = worker_with("probe_a\nprobe_b");
        start_hats(&mut worker, vec![start("t1", "s1")]);

        let mut out = Vec::new();
        worker.handle(
            FromVm::ResultError {
                token: token("w-0"),
                message: "boom".into(),
            },
            &mut out,
        );
        assert_eq!(
            out,
            vec![
                ToVm::ScriptError {
                    thread_id: Some(ThreadId::from("t1")),
                    error: "boom".into(),
                },
                ToVm::ScriptFinished,
            ]
        );
    }

    #[test]
    fn test_unknown_variable_fails_thread() {
        let mut worker = worker_with("probe_c Y=$nope");
        let out = start_hats(&mut worker, vec![start("t1", "s1")]);
        assert!(matches!(
            &out[2],
            ToVm::ScriptError { thread_id: Some(_), error } if error.contains("$nope")
        ));
        assert_eq!(out.last(), Some(&ToVm::ScriptFinished));
    }

    #[test]
    fn test_stop_threads_drops_pending_calls() {
        let mut worker = worker_with("probe_a\nprobe_b");
        start_hats(&mut worker, vec![start("t1", "s1"), start("t2", "s1")]);
        assert_eq!(worker.pending_count(), 2);

        let mut out = Vec::new();
        worker.handle(
            FromVm::StopThreads {
                thread_ids: vec![ThreadId::from("t1")],
            },
            &mut out,
        );
        assert!(out.is_empty());
        assert_eq!(worker.running_count(), 1);
        assert!(reply(&mut worker, "w-0", Value::Null).is_empty());
    }

    #[test]
    fn test_stop_all_finishes_once() {
        let mut worker = worker_with("probe_a");
        start_hats(&mut worker, vec![start("t1", "s1")]);

        let mut out = Vec::new();
        worker.handle(FromVm::StopAll, &mut out);
        worker.handle(FromVm::StopAll, &mut out);
        assert_eq!(out, vec![ToVm::ScriptFinished]);
        assert_eq!(worker.pending_count(), 0);
    }

    #[test]
    fn test_block_timeout_expires_call() {
        let mut worker = ScriptWorker::new(Some(Duration::ZERO));
        let mut out = Vec::new();
        worker.handle(
            FromVm::RegisterThreads {
                token: token("h-0"),
                unit: unit(&[("s1", "cat", "probe_a")]),
            },
            &mut out,
        );
        start_hats(&mut worker, vec![start("t1", "s1")]);

        let mut out = Vec::new();
        worker.poll(Instant::now() + Duration::from_millis(1), &mut out);
        assert!(matches!(
            &out[0],
            ToVm::ScriptError { error, .. } if error.contains("timed out")
        ));
        assert_eq!(worker.running_count(), 0);
    }

    #[test]
    fn test_async_run_starts_immediately() {
        let mut worker = ScriptWorker::new(None);
        let mut out = Vec::new();
        worker.handle(
            FromVm::AsyncRun {
                source: unit(&[("s9", "cat", "probe_a")]).source,
                targets: vec![ThreadStart {
                    thread_id: ThreadId::from("t1"),
                    script_id: ScriptId::from("s9"),
                    target_id: TargetId::from("cat"),
                }],
            },
            &mut out,
        );
        assert_eq!(out[0], ToVm::ScriptLoading);
        assert_eq!(out[1], ToVm::ScriptRunning);
        assert_eq!(out[2], block_op("probe_a", BlockArgs::new(), "w-0"));
    }
}

#[cfg(test)]
mod wire_tests {
    use super::*;

    #[test]
    fn test_block_op_wire_shape() {
        let message = block_op("motion_movesteps", BlockArgs::new().with("STEPS", 10), "w-4");
        let wire = serde_json::to_value(&message).unwrap();
        assert_eq!(
            wire,
            json!({
                "id": "BlockOP",
                "targetId": "cat",
                "threadId": "t1",
                "opCode": "motion_movesteps",
                "args": {"STEPS": 10},
                "token": "w-4"
            })
        );
    }

    #[test]
    fn test_result_value_from_wire() {
        let message: FromVm = serde_json::from_value(json!({
            "id": "ResultValue",
            "token": "w-4",
            "value": null
        }))
        .unwrap();
        assert_eq!(
            message,
            FromVm::ResultValue {
                token: token("w-4"),
                value: Value::Null,
            }
        );
        assert_eq!(message.kind(), "ResultValue");
    }

    #[test]
    fn test_reply_token_only_for_replies() {
        let registered = ToVm::ThreadsRegistered {
            token: token("h-3"),
            error: None,
        };
        assert_eq!(registered.reply_token(), Some(&token("h-3")));
        assert!(block_op("x", BlockArgs::new(), "w-0").reply_token().is_none());
        assert!(ToVm::ScriptRunning.status().is_some());
    }
}

#[cfg(test)]
mod bridge_tests {
    use super::*;

    fn inline_bridge() -> WorkerBridge {
        WorkerBridge::new(
            Box::new(InlineTransport::new(ScriptWorker::new(None))),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_request_backlogs_other_messages() {
        let mut bridge = inline_bridge();
        bridge
            .register_threads(unit(&[("s1", "cat", "probe_a")]))
            .unwrap();
        assert_eq!(bridge.next_message().unwrap(), Some(ToVm::ScriptLoading));

        let started = bridge
            .start_hats("event_whenflagclicked", None, vec![start("t1", "s1")])
            .unwrap();
        assert_eq!(started, vec![ThreadId::from("t1")]);
        assert_eq!(bridge.next_message().unwrap(), Some(ToVm::ScriptRunning));
        assert!(matches!(
            bridge.next_message().unwrap(),
            Some(ToVm::BlockOp { op_code, .. }) if op_code == "probe_a"
        ));
        assert_eq!(bridge.next_message().unwrap(), None);
    }

    #[test]
    fn test_rejected_registration() {
        let mut bridge = inline_bridge();
        let err = bridge
            .register_threads(LinkedUnit {
                source: "nonsense".into(),
                event_map: Default::default(),
            })
            .unwrap_err();
        assert!(matches!(err, BridgeError::Rejected(_)));
    }

    #[test]
    fn test_silent_backend_times_out() {
        let mut bridge = WorkerBridge::new(Box::new(InlineTransport::new(Silent)), Duration::from_millis(10));
        let err = bridge.start_hats("hat", None, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Timeout {
                request: "StartHats",
                ..
            }
        ));
    }

    #[test]
    fn test_empty_stop_threads_is_not_sent() {
        let mut bridge = inline_bridge();
        bridge.stop_threads(Vec::new()).unwrap();
        assert_eq!(bridge.next_message().unwrap(), None);
    }

    #[test]
    fn test_thread_transport_round_trip() {
        let mut transport = ThreadTransport::spawn(ScriptWorker::new(None)).unwrap();
        transport
            .send(FromVm::InitBackend {
                backend_url: String::new(),
            })
            .unwrap();
        let first = transport.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = transport.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first, Some(ToVm::EnvironmentLoading));
        assert_eq!(second, Some(ToVm::EnvironmentLoaded));
    }

    #[test]
    fn test_thread_bridge_request() {
        let transport = ThreadTransport::spawn(ScriptWorker::new(None)).unwrap();
        let mut bridge = WorkerBridge::new(Box::new(transport), Duration::from_secs(5));
        bridge
            .register_threads(unit(&[("s1", "cat", "probe_a")]))
            .unwrap();
    }
}
