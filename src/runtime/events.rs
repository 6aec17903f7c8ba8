//! Runtime-wide notifications.

use crate::runtime::ids::TargetId;

/// Lifecycle status reported by the worker backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    EnvironmentLoading,
    EnvironmentLoaded,
    ScriptLoading,
    ScriptRunning,
    ScriptFinished,
}

/// Something observers of the runtime may react to.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// The green flag was clicked.
    ProjectStart,
    /// Everything is being stopped; release external resources.
    ProjectStopAll,
    /// All threads of one target were stopped.
    StopForTarget(TargetId),
    ProjectLoaded,
    ProjectChanged,
    TargetsUpdate,
    RuntimeStarted,
    RuntimeDisposed,
    TargetWasCreated {
        target: TargetId,
        source: Option<TargetId>,
    },
    TargetWasRemoved(TargetId),
    /// A key went down (scratch key name).
    KeyPressed(String),
    WorkerStatus(WorkerStatus),
}

/// Receives runtime events. Called synchronously on the scheduler thread.
pub trait EventSubscriber: Send {
    fn on_event(
        &self,
        event: &RuntimeEvent,
    );
}

impl<F> EventSubscriber for F
where
    F: Fn(&RuntimeEvent) + Send,
{
    fn on_event(
        &self,
        event: &RuntimeEvent,
    ) {
        self(event)
    }
}
