//! Hat dispatch, global stop and clones.

use tracing::{debug, warn};

use super::{Scheduler, SchedulerError, SchedulerResult, GREEN_FLAG_HAT, KEY_PRESSED_HAT, START_AS_CLONE_HAT};
use crate::io::IoSignal;
use crate::runtime::events::RuntimeEvent;
use crate::runtime::ids::{ScriptId, TargetId, ThreadId};
use crate::runtime::thread::{HatBinding, Thread};
use crate::runtime::value::Value;
use crate::worker::ThreadStart;

/// Which scripts of a hat should start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HatMatch {
    /// Event option to match (case-insensitive), e.g. a broadcast name.
    pub option: Option<String>,
    /// Restrict to one target.
    pub target: Option<TargetId>,
}

impl HatMatch {
    /// Match every script of the hat.
    pub fn any() -> Self {
        Self::default()
    }

    /// Match scripts registered under `option`.
    pub fn option(option: impl Into<String>) -> Self {
        Self {
            option: Some(option.into()),
            target: None,
        }
    }

    /// Match scripts running on `target`.
    pub fn for_target(target: TargetId) -> Self {
        Self {
            option: None,
            target: Some(target),
        }
    }

    pub fn with_target(
        mut self,
        target: TargetId,
    ) -> Self {
        self.target = Some(target);
        self
    }
}

impl Scheduler {
    /// Start the scripts registered for `hat` that satisfy `matching`.
    ///
    /// Scripts of a sprite also run on its clones. When the hat does not
    /// restart existing threads, a script already live on a target yields no
    /// new thread for that target; otherwise the old thread is ended and a
    /// new one takes its place.
    pub fn start_hats(
        &mut self,
        hat: &str,
        matching: &HatMatch,
    ) -> SchedulerResult<Vec<ThreadId>> {
        let info = self
            .registry
            .hat(hat)
            .ok_or_else(|| SchedulerError::UnknownHat(hat.to_string()))?;

        let mut candidates: Vec<(ScriptId, TargetId, Option<String>)> = Vec::new();
        for (script, registration) in &self.scripts {
            if registration.event != hat {
                continue;
            }
            if let Some(wanted) = &matching.option {
                match &registration.option {
                    Some(option) if option.eq_ignore_ascii_case(wanted) => {}
                    _ => continue,
                }
            }
            for target in self.stage.instances_of(&registration.target) {
                if matching.target.as_ref().is_some_and(|t| t != &target) {
                    continue;
                }
                candidates.push((script.clone(), target, registration.option.clone()));
            }
        }

        let mut starts = Vec::new();
        let mut replaced = Vec::new();
        for (script, target, option) in candidates {
            let live: Vec<ThreadId> = self
                .threads
                .values()
                .filter(|t| {
                    t.is_active() && t.target() == &target && t.binding().is_some_and(|b| b.script == script)
                })
                .map(|t| t.id().clone())
                .collect();
            if !live.is_empty() {
                if !info.restart_existing_threads {
                    debug!("{} already running on {}", script, target);
                    continue;
                }
                for id in live {
                    self.retire(&id);
                    replaced.push(id);
                }
            }

            let id = self.fresh_thread_id();
            let binding = HatBinding {
                script: script.clone(),
                hat: hat.to_string(),
                option,
            };
            self.threads
                .insert(id.clone(), Thread::for_hat(id.clone(), target.clone(), binding));
            self.stats.record_registered();
            starts.push(ThreadStart {
                thread_id: id,
                script_id: script,
                target_id: target,
            });
        }

        if let Err(e) = self.bridge.stop_threads(replaced) {
            warn!("Cannot stop replaced threads: {}", e);
        }
        if starts.is_empty() {
            return Ok(Vec::new());
        }

        let requested: Vec<ThreadId> = starts.iter().map(|s| s.thread_id.clone()).collect();
        match self
            .bridge
            .start_hats(hat, matching.option.as_deref(), starts)
        {
            Ok(accepted) => {
                for id in requested.iter().filter(|id| !accepted.contains(id)) {
                    self.retire(id);
                }
                debug!("Started {} threads for {}", accepted.len(), hat);
                Ok(accepted)
            }
            Err(e) => {
                for id in &requested {
                    self.retire(id);
                }
                Err(e.into())
            }
        }
    }

    /// Stop everything, then start every green flag script.
    pub fn green_flag(&mut self) -> SchedulerResult<Vec<ThreadId>> {
        self.stop_all();
        self.emit(RuntimeEvent::ProjectStart);
        self.stage.on_green_flag();
        self.io.clock.reset_project_timer();
        self.start_hats(GREEN_FLAG_HAT, &HatMatch::any())
    }

    /// Stop everything.
    ///
    /// Packages hear about it first so they can release external resources.
    /// Every thread is ended; threads of clones leave the live set right away
    /// and the clones are disposed. Originals stay.
    pub fn stop_all(&mut self) {
        self.emit(RuntimeEvent::ProjectStopAll);
        self.stage.on_stop_all();

        let ids = self.thread_ids();
        for id in &ids {
            self.retire(id);
        }
        let stage = &self.stage;
        self.threads
            .retain(|_, t| stage.get(t.target()).is_some_and(|target| target.is_original()));

        for clone in self.stage.dispose_clones() {
            self.emit(RuntimeEvent::TargetWasRemoved(clone.id().clone()));
        }
        self.return_values.clear();

        if let Err(e) = self.bridge.stop_all() {
            warn!("Cannot tell the backend to stop: {}", e);
        }
        self.stage.request_redraw();
    }

    /// End every thread running on `target`, except `keep`.
    pub fn stop_for_target(
        &mut self,
        target: &TargetId,
        keep: Option<&ThreadId>,
    ) -> Vec<ThreadId> {
        let ended: Vec<ThreadId> = self
            .threads
            .values()
            .filter(|t| t.is_active() && t.target() == target && Some(t.id()) != keep)
            .map(|t| t.id().clone())
            .collect();
        for id in &ended {
            self.retire(id);
        }
        if let Err(e) = self.bridge.stop_threads(ended.clone()) {
            warn!("Cannot stop threads of {}: {}", target, e);
        }
        self.emit(RuntimeEvent::StopForTarget(target.clone()));
        ended
    }

    /// End one thread from the host side, telling the backend to drop it.
    pub fn stop_thread(
        &mut self,
        id: &ThreadId,
    ) -> SchedulerResult<()> {
        self.end_thread(id)?;
        self.retire(id);
        if let Err(e) = self.bridge.stop_threads(vec![id.clone()]) {
            warn!("Cannot stop {}: {}", id, e);
        }
        Ok(())
    }

    // ========================================================================
    // Clones
    // ========================================================================

    /// Clone `source`. Returns `Ok(None)` when the clone ceiling is reached
    /// or the source is the stage.
    pub fn make_clone(
        &mut self,
        source: &TargetId,
    ) -> SchedulerResult<Option<TargetId>> {
        if !self.stage.clones_available() {
            debug!("Clone limit of {} reached", self.stage.max_clones());
            return Ok(None);
        }
        let original = self
            .stage
            .get(source)
            .ok_or_else(|| SchedulerError::UnknownTarget(source.clone()))?;
        if original.is_stage() {
            return Ok(None);
        }

        let stage = &self.stage;
        let id = TargetId::new(
            self.uid
                .generate_unique(|c| stage.contains(&TargetId::from(c))),
        );
        let clone = original.make_clone(id.clone());
        self.stage.add_target(clone);
        self.emit(RuntimeEvent::TargetWasCreated {
            target: id.clone(),
            source: Some(source.clone()),
        });

        if self.registry.is_hat(START_AS_CLONE_HAT) {
            if let Err(e) = self.start_hats(START_AS_CLONE_HAT, &HatMatch::for_target(id.clone())) {
                warn!("Cannot start clone scripts for {}: {}", id, e);
            }
        }
        Ok(Some(id))
    }

    /// Dispose a clone and end its threads. Originals are left alone.
    pub fn dispose_clone(
        &mut self,
        id: &TargetId,
    ) -> SchedulerResult<bool> {
        match self.stage.get(id) {
            None => return Err(SchedulerError::UnknownTarget(id.clone())),
            Some(target) if target.is_original() => return Ok(false),
            Some(_) => {}
        }
        let ended: Vec<ThreadId> = self
            .threads
            .values()
            .filter(|t| t.is_active() && t.target() == id)
            .map(|t| t.id().clone())
            .collect();
        for thread in &ended {
            self.retire(thread);
        }
        if let Err(e) = self.bridge.stop_threads(ended) {
            warn!("Cannot stop threads of {}: {}", id, e);
        }
        self.stage.dispose_target(id);
        self.emit(RuntimeEvent::TargetWasRemoved(id.clone()));
        Ok(true)
    }

    /// Whether another clone may be created.
    #[inline]
    pub fn clones_available(&self) -> bool {
        self.stage.clones_available()
    }

    /// Live clone count.
    #[inline]
    pub fn clone_count(&self) -> usize {
        self.stage.clone_count()
    }

    // ========================================================================
    // I/O
    // ========================================================================

    /// Route device data and fire key hats for key presses.
    pub fn post_io_data(
        &mut self,
        device: &str,
        data: Value,
    ) -> SchedulerResult<Vec<ThreadId>> {
        match self.io.post_data(device, data)? {
            IoSignal::None => Ok(Vec::new()),
            IoSignal::KeyPressed(key) => {
                self.emit(RuntimeEvent::KeyPressed(key.clone()));
                if !self.registry.is_hat(KEY_PRESSED_HAT) {
                    return Ok(Vec::new());
                }
                let mut started = self.start_hats(KEY_PRESSED_HAT, &HatMatch::option(key))?;
                started.extend(self.start_hats(KEY_PRESSED_HAT, &HatMatch::option("any"))?);
                Ok(started)
            }
        }
    }
}
