//! 端到端场景测试

use std::thread;
use std::time::Duration;

use serde_json::json;

use patchvm::runtime::ids::ThreadId;
use patchvm::runtime::scheduler::{HatMatch, SchedulerConfig, SchedulerError};
use patchvm::runtime::thread::ThreadStatus;
use patchvm::runtime::value::BlockArgs;
use patchvm::worker::WorkerMode;

use crate::common::{batch, fixture, fixture_with, sprite};

#[test]
fn test_yielding_body_finishes_on_fourth_tick() {
    let mut f = fixture();
    f.scheduler
        .load_scripts(&batch(json!({"Sprite1": {"event_whenflagclicked": ["probe_yield3"]}})))
        .unwrap();
    let started = f.scheduler.green_flag().unwrap();
    assert_eq!(started.len(), 1);
    let id = started[0].clone();

    for tick in 1..=3 {
        f.scheduler.step_once();
        let status = f.scheduler.get_thread(&id).unwrap().status();
        assert_eq!(status, ThreadStatus::Yield, "tick {tick}");
    }

    f.scheduler.step_once();
    assert_eq!(f.scheduler.get_thread(&id).unwrap().status(), ThreadStatus::Done);

    let report = f.scheduler.step_once();
    assert_eq!(report.evicted, vec![id.clone()]);
    assert!(matches!(
        f.scheduler.get_thread(&id),
        Err(SchedulerError::NotFound(_))
    ));
}

#[test]
fn test_non_restarting_hat_triggered_twice() {
    let mut f = fixture();
    f.scheduler
        .load_scripts(&batch(json!({
            "Sprite1": {"probe_whenireceive": {"go": ["probe_forever"]}}
        })))
        .unwrap();

    let first = f
        .scheduler
        .start_hats("probe_whenireceive", &HatMatch::option("go"))
        .unwrap();
    let second = f
        .scheduler
        .start_hats("probe_whenireceive", &HatMatch::option("go"))
        .unwrap();
    assert!(!first.is_empty());
    assert!(second.is_empty());
}

#[test]
fn test_clone_ceiling_of_three_hundred() {
    let mut f = fixture_with(
        SchedulerConfig {
            max_clones: 300,
            ..SchedulerConfig::default()
        },
        WorkerMode::Inline,
    );
    for _ in 0..300 {
        assert!(f.scheduler.make_clone(&sprite()).unwrap().is_some());
    }
    assert_eq!(f.scheduler.make_clone(&sprite()).unwrap(), None);
    assert_eq!(f.scheduler.clone_count(), 300);
}

#[test]
fn test_block_on_ghost_thread() {
    let mut f = fixture();
    let err = f
        .scheduler
        .execute_block(
            &ThreadId::from("ghost"),
            "probe_log",
            BlockArgs::new().with("MSG", "lost"),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, SchedulerError::NotFound(_)));

    let id = f.scheduler.register_thread(&sprite(), None);
    f.scheduler
        .execute_block(&id, "probe_log", BlockArgs::new().with("MSG", "ok"), None)
        .unwrap();
    assert_eq!(*f.log.lock(), vec!["ok".to_string()]);
    assert!(f.scheduler.step_once().faults.is_empty());
}

#[test]
fn test_threaded_worker_runs_scripts() {
    let mut f = fixture_with(SchedulerConfig::default(), WorkerMode::Thread);
    f.scheduler
        .load_scripts(&batch(json!({
            "Sprite1": {"event_whenflagclicked": ["probe_log MSG=a\nprobe_log MSG=b"]}
        })))
        .unwrap();
    f.scheduler.green_flag().unwrap();

    for _ in 0..500 {
        f.scheduler.step_once();
        if f.scheduler.thread_count() == 0 {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(*f.log.lock(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(f.scheduler.thread_count(), 0);
}

#[test]
fn test_broadcast_reaches_receivers() {
    let mut f = fixture();
    f.scheduler
        .load_scripts(&batch(json!({
            "Sprite1": {"event_whenflagclicked": ["event_broadcast BROADCAST_OPTION=ping"]},
            "stage": {"event_whenbroadcastreceived": {"ping": ["probe_log MSG=pong"]}}
        })))
        .unwrap();
    f.scheduler.green_flag().unwrap();
    for _ in 0..5 {
        f.scheduler.step_once();
    }
    assert_eq!(*f.log.lock(), vec!["pong".to_string()]);
    assert_eq!(f.scheduler.thread_count(), 0);
}

#[test]
fn test_reloading_scripts_ends_running_threads() {
    let mut f = fixture();
    f.scheduler
        .load_scripts(&batch(json!({"Sprite1": {"event_whenflagclicked": ["probe_forever"]}})))
        .unwrap();
    f.scheduler.green_flag().unwrap();
    f.scheduler.step_once();
    assert_eq!(f.scheduler.thread_count(), 1);

    f.scheduler
        .load_scripts(&batch(json!({"Sprite1": {"event_whenflagclicked": ["probe_log MSG=second"]}})))
        .unwrap();
    for _ in 0..20 {
        assert!(f.scheduler.step_once().faults.is_empty());
    }
    assert_eq!(f.scheduler.thread_count(), 0);

    f.scheduler.green_flag().unwrap();
    for _ in 0..3 {
        f.scheduler.step_once();
    }
    assert_eq!(*f.log.lock(), vec!["second".to_string()]);
    assert_eq!(f.scheduler.thread_count(), 0);
}

#[test]
fn test_procedure_call_without_return_runs_body() {
    let mut f = fixture();
    f.scheduler
        .load_scripts(&batch(json!({
            "Sprite1": {
                "event_whenflagclicked": ["procedures_callnoreturn PROCCODE=greet\nprobe_log MSG=after"],
                "procedures_defnoreturn": {"greet": ["probe_log MSG=body"]}
            }
        })))
        .unwrap();
    f.scheduler.green_flag().unwrap();
    for _ in 0..10 {
        f.scheduler.step_once();
    }
    assert_eq!(*f.log.lock(), vec!["body".to_string(), "after".to_string()]);
    assert_eq!(f.scheduler.thread_count(), 0);
}
