//! Thread 单元测试

use std::sync::Arc;

use parking_lot::Mutex;

use crate::runtime::ids::{ScriptId, TargetId, ThreadId};
use crate::runtime::thread::{FrameState, HatBinding, StackFrame, Thread, ThreadStatus};
use crate::runtime::value::{BlockArgs, Value};

fn thread() -> Thread {
    Thread::new(ThreadId::from("t1"), TargetId::from("Sprite1"), None)
}

#[cfg(test)]
mod status_tests {
    use super::*;

    #[test]
    fn test_new_thread_is_running_with_body_frame() {
        let t = thread();
        assert_eq!(t.status(), ThreadStatus::Running);
        assert_eq!(t.depth(), 1);
        assert!(t.is_active());
    }

    #[test]
    fn test_end_is_idempotent() {
        let mut t = thread();
        t.end();
        t.end();
        assert!(t.is_done());
    }

    #[test]
    fn test_done_is_terminal() {
        let mut t = thread();
        t.end();
        t.set_status(ThreadStatus::Running);
        assert_eq!(t.status(), ThreadStatus::Done);
    }

    #[test]
    fn test_popping_last_frame_finishes() {
        let mut t = thread();
        assert!(t.pop_frame().is_some());
        assert_eq!(t.depth(), 0);
        assert!(t.is_done());
    }
}

#[cfg(test)]
mod frame_tests {
    use super::*;

    #[test]
    fn test_take_block_frame_keeps_body() {
        let mut t = thread();
        assert!(t.take_block_frame().is_none());

        t.push_frame(StackFrame::new("control_wait", BlockArgs::new(), None));
        let frame = t.take_block_frame().unwrap();
        assert_eq!(frame.opcode(), "control_wait");
        assert_eq!(t.depth(), 1);
        assert!(t.is_active());
    }

    #[test]
    fn test_new_frame_is_first_run() {
        let mut frame = StackFrame::new("x", BlockArgs::new(), None);
        assert!(frame.is_first_run());
        frame.state = FrameState::Waiting;
        assert!(!frame.is_first_run());
    }

    #[test]
    fn test_hat_thread_records_binding() {
        let binding = HatBinding {
            script: ScriptId::from("s1"),
            hat: "event_whenflagclicked".to_string(),
            option: None,
        };
        let t = Thread::for_hat(ThreadId::from("t2"), TargetId::from("Stage"), binding.clone());
        assert_eq!(t.binding(), Some(&binding));
        assert_eq!(t.peek_frame().unwrap().opcode(), "event_whenflagclicked");
    }

    #[test]
    fn test_result_callback_receives_values() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut t = Thread::new(
            ThreadId::from("t3"),
            TargetId::from("Sprite1"),
            Some(Box::new(move |id: &ThreadId, v: &Value| {
                sink.lock().push((id.clone(), v.clone()));
            })),
        );
        t.report_result(&Value::from(5));
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, ThreadId::from("t3"));
        assert_eq!(seen[0].1, Value::from(5));
    }
}
