//! Linker: turns a registration batch into one executable unit.
//!
//! Input is `{targetId -> {eventId -> [code] | {optionId -> [code]}}}`.
//! Every code fragment gets a fresh script id; the output is the linked
//! source (all bodies addressable by script id) plus the event map the
//! scheduler consults when a hat fires.
//!
//! Linking is all-or-nothing: an unknown target or a syntax error in any
//! fragment fails the whole batch and nothing is registered.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::runtime::ids::{ScriptId, TargetId};
use crate::runtime::uid::SafeIdentifierGenerator;
use crate::worker::script::{self, ParseError, SectionHeader};

/// Code registered for one event of one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventScripts {
    /// Plain event: a list of script bodies.
    Plain(Vec<String>),
    /// Event with options (e.g. broadcast names), each with its bodies.
    Options(IndexMap<String, Vec<String>>),
}

/// Registration batch, keyed by target then event.
pub type ScriptBatch = IndexMap<TargetId, IndexMap<String, EventScripts>>;

/// Flattened event map entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventEntry {
    Scripts(IndexMap<ScriptId, String>),
    Options(IndexMap<String, IndexMap<ScriptId, String>>),
}

/// `{eventId -> {scriptId -> code} | {optionId -> {scriptId -> code}}}`.
pub type EventMap = IndexMap<String, EventEntry>;

/// What one script id stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRegistration {
    pub target: TargetId,
    pub event: String,
    pub option: Option<String>,
    pub code: String,
}

/// Executable unit handed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedUnit {
    pub source: String,
    pub event_map: EventMap,
}

/// Result of linking a batch.
#[derive(Debug, Clone)]
pub struct LinkOutput {
    pub unit: LinkedUnit,
    pub registrations: IndexMap<ScriptId, ScriptRegistration>,
    /// Every opcode referenced by any body.
    pub opcodes: IndexSet<String>,
}

/// Link failures.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LinkError {
    #[error("Cannot find target with id {0}")]
    UnknownTarget(TargetId),
    #[error("Syntax error in {target} / {event}: {source}")]
    Syntax {
        target: TargetId,
        event: String,
        #[source]
        source: ParseError,
    },
    #[error("Event {0} is registered both with and without options")]
    MixedEventShape(String),
}

/// Stateless linker.
#[derive(Debug, Default)]
pub struct Linker;

impl Linker {
    pub fn new() -> Self {
        Self
    }

    /// Link `batch`. `is_live` reports whether a target id currently exists.
    pub fn link(
        &self,
        batch: &ScriptBatch,
        is_live: impl Fn(&TargetId) -> bool,
        uid: &mut SafeIdentifierGenerator,
    ) -> Result<LinkOutput, LinkError> {
        // Validate everything before allocating any id.
        let mut opcodes = IndexSet::new();
        for (target, events) in batch {
            if !is_live(target) {
                return Err(LinkError::UnknownTarget(target.clone()));
            }
            for (event, scripts) in events {
                for code in fragments(scripts) {
                    let statements = script::parse_body(code).map_err(|source| LinkError::Syntax {
                        target: target.clone(),
                        event: event.clone(),
                        source,
                    })?;
                    opcodes.extend(statements.into_iter().map(|s| s.opcode));
                }
            }
        }

        let mut event_map: EventMap = IndexMap::new();
        let mut registrations: IndexMap<ScriptId, ScriptRegistration> = IndexMap::new();

        for (target, events) in batch {
            for (event, scripts) in events {
                match scripts {
                    EventScripts::Plain(codes) => {
                        let entry = event_map
                            .entry(event.clone())
                            .or_insert_with(|| EventEntry::Scripts(IndexMap::new()));
                        let EventEntry::Scripts(map) = entry else {
                            return Err(LinkError::MixedEventShape(event.clone()));
                        };
                        for code in codes {
                            let id = fresh_id(uid, &registrations);
                            map.insert(id.clone(), code.clone());
                            registrations.insert(
                                id,
                                ScriptRegistration {
                                    target: target.clone(),
                                    event: event.clone(),
                                    option: None,
                                    code: code.clone(),
                                },
                            );
                        }
                    }
                    EventScripts::Options(options) => {
                        let entry = event_map
                            .entry(event.clone())
                            .or_insert_with(|| EventEntry::Options(IndexMap::new()));
                        let EventEntry::Options(map) = entry else {
                            return Err(LinkError::MixedEventShape(event.clone()));
                        };
                        for (option, codes) in options {
                            let slot = map.entry(option.clone()).or_default();
                            for code in codes {
                                let id = fresh_id(uid, &registrations);
                                slot.insert(id.clone(), code.clone());
                                registrations.insert(
                                    id,
                                    ScriptRegistration {
                                        target: target.clone(),
                                        event: event.clone(),
                                        option: Some(option.clone()),
                                        code: code.clone(),
                                    },
                                );
                            }
                        }
                    }
                }
            }
        }

        let source = script::render_unit(registrations.iter().map(|(id, reg)| {
            (
                SectionHeader {
                    script: id.clone(),
                    target: reg.target.clone(),
                },
                reg.code.as_str(),
            )
        }));
        debug!(
            "Linked {} scripts over {} events",
            registrations.len(),
            event_map.len()
        );

        Ok(LinkOutput {
            unit: LinkedUnit { source, event_map },
            registrations,
            opcodes,
        })
    }
}

fn fragments(scripts: &EventScripts) -> Box<dyn Iterator<Item = &String> + '_> {
    match scripts {
        EventScripts::Plain(codes) => Box::new(codes.iter()),
        EventScripts::Options(options) => Box::new(options.values().flatten()),
    }
}

fn fresh_id(
    uid: &mut SafeIdentifierGenerator,
    taken: &IndexMap<ScriptId, ScriptRegistration>,
) -> ScriptId {
    ScriptId::new(uid.generate_unique(|candidate| taken.contains_key(candidate)))
}

#[cfg(test)]
mod tests;
