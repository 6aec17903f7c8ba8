//! Script registration and backend bootstrap.

use tracing::{debug, info};

use super::{Scheduler, SchedulerError, SchedulerResult};
use crate::linker::{EventMap, LinkOutput, Linker, ScriptBatch};
use crate::runtime::events::RuntimeEvent;
use crate::runtime::ids::ThreadId;
use crate::runtime::thread::Thread;
use crate::worker::ThreadStart;

impl Scheduler {
    /// Announce the host and bootstrap the backend environment.
    pub fn init_backend(
        &mut self,
        backend_url: &str,
    ) -> SchedulerResult<()> {
        self.bridge.connect()?;
        self.bridge.init_backend(backend_url)?;
        Ok(())
    }

    /// Link `batch` against the live targets and check every opcode it uses.
    fn link_checked(
        &mut self,
        batch: &ScriptBatch,
    ) -> SchedulerResult<LinkOutput> {
        let stage = &self.stage;
        let output = Linker::new().link(batch, |id| stage.contains(id), &mut self.uid)?;
        let missing = self
            .registry
            .missing(output.opcodes.iter().map(String::as_str));
        if !missing.is_empty() {
            return Err(SchedulerError::UnregisteredOpcodes(missing));
        }
        Ok(output)
    }

    /// Register a batch of scripts with the backend, replacing the previous one.
    ///
    /// Nothing is applied unless linking, the opcode check and the backend
    /// acknowledgement all succeed. Once applied, every live thread is ended
    /// and leaves on the next sweep.
    pub fn load_scripts(
        &mut self,
        batch: &ScriptBatch,
    ) -> SchedulerResult<&EventMap> {
        let output = self.link_checked(batch)?;
        let event_map = output.unit.event_map.clone();
        self.bridge.register_threads(output.unit)?;

        // The backend dropped every running body when it took the new unit.
        let dropped = self.thread_ids();
        for id in &dropped {
            self.retire(id);
        }
        self.return_values.clear();
        if !dropped.is_empty() {
            debug!("Ended {} threads replaced by the new batch", dropped.len());
        }

        info!(
            "Loaded {} scripts for {} targets",
            output.registrations.len(),
            batch.len()
        );
        self.scripts = output.registrations;
        self.event_map = event_map;
        self.emit(RuntimeEvent::ProjectLoaded);
        Ok(&self.event_map)
    }

    /// Run every body in `batch` immediately, one thread per body, without
    /// waiting for a hat.
    pub fn run_batch(
        &mut self,
        batch: &ScriptBatch,
    ) -> SchedulerResult<Vec<ThreadId>> {
        let output = self.link_checked(batch)?;
        let mut starts = Vec::with_capacity(output.registrations.len());
        for (script, registration) in &output.registrations {
            let id = self.fresh_thread_id();
            self.threads.insert(
                id.clone(),
                Thread::new(id.clone(), registration.target.clone(), None),
            );
            self.stats.record_registered();
            starts.push(ThreadStart {
                thread_id: id,
                script_id: script.clone(),
                target_id: registration.target.clone(),
            });
        }
        let ids: Vec<ThreadId> = starts.iter().map(|s| s.thread_id.clone()).collect();
        if let Err(e) = self.bridge.async_run(output.unit.source, starts) {
            for id in &ids {
                self.retire(id);
            }
            return Err(e.into());
        }
        debug!("Running {} threads", ids.len());
        Ok(ids)
    }
}
