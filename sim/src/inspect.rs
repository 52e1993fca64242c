//! Decodes captured server messages into JSON-friendly reports.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use codec::{decode_hints, decode_snapshot_fragment, CodecLimits, EntityState};
use schema::{ComponentKind, ComponentRegistry};
use serde::Serialize;
use wire::{decode_message, MessageKind, WireLimits};

#[derive(Debug, Serialize)]
pub struct MessageReport {
    pub kind: String,
    pub tick: u32,
    pub base_tick: u32,
    pub fragment_index: u16,
    pub fragment_count: u16,
    pub bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangesReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<HintReport>,
}

#[derive(Debug, Serialize)]
pub struct ChangesReport {
    pub created: Vec<EntityReport>,
    pub updated: Vec<EntityReport>,
    pub removed: Vec<u32>,
}

#[derive(Debug, Serialize)]
pub struct EntityReport {
    pub id: u32,
    pub components: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed_components: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HintReport {
    pub entity: u32,
    pub component: String,
    pub value: String,
}

/// Reports on one message as the demo schema sees it.
pub fn inspect(bytes: &[u8], registry: &ComponentRegistry) -> Result<MessageReport> {
    let message = decode_message(bytes, &WireLimits::default()).context("decode header")?;
    let header = message.header;
    let limits = CodecLimits::default();
    let mut report = MessageReport {
        kind: format!("{:?}", header.kind),
        tick: header.tick,
        base_tick: header.base_tick,
        fragment_index: header.fragment_index,
        fragment_count: header.fragment_count,
        bytes: bytes.len(),
        changes: None,
        hints: Vec::new(),
    };

    match header.kind {
        MessageKind::FullSnapshot | MessageKind::Delta => {
            let fragment = decode_snapshot_fragment(&message, registry, &limits)
                .context("decode snapshot body")?;
            let changes = fragment.changes;
            report.changes = Some(ChangesReport {
                created: changes
                    .created
                    .iter()
                    .map(|(id, state)| entity(registry, id.raw(), state, Vec::new()))
                    .collect(),
                updated: changes
                    .updated
                    .iter()
                    .map(|update| {
                        let removed = update.removed.iter().map(|kind| name(registry, kind));
                        entity(registry, update.id.raw(), &update.changed, removed.collect())
                    })
                    .collect(),
                removed: changes.removed.iter().map(|id| id.raw()).collect(),
            });
        }
        MessageKind::Hint => {
            let (_, hints) = decode_hints(&message, registry, &limits).context("decode hints")?;
            report.hints = hints
                .iter()
                .map(|hint| HintReport {
                    entity: hint.entity.raw(),
                    component: name(registry, hint.kind),
                    value: describe(registry, hint.kind, &hint.payload),
                })
                .collect();
        }
        _ => {}
    }
    Ok(report)
}

fn entity(
    registry: &ComponentRegistry,
    id: u32,
    state: &EntityState,
    removed_components: Vec<String>,
) -> EntityReport {
    EntityReport {
        id,
        components: state
            .iter()
            .map(|(kind, payload)| (name(registry, kind), describe(registry, kind, payload)))
            .collect(),
        removed_components,
    }
}

fn name(registry: &ComponentRegistry, kind: ComponentKind) -> String {
    registry
        .get(kind)
        .map_or_else(|| format!("kind-{kind}"), |entry| entry.name.to_owned())
}

fn describe(registry: &ComponentRegistry, kind: ComponentKind, payload: &[u8]) -> String {
    registry
        .describe(kind, payload)
        .unwrap_or_else(|err| format!("<{err}>"))
}

#[cfg(test)]
mod tests {
    use codec::{encode_full_snapshot, encode_hints, EntityId, Hint, Snapshot, Tick};
    use demo::{demo_registry, ActorTag, Name, Position};
    use schema::Component;

    use super::*;

    #[test]
    fn full_snapshot_lists_named_components() {
        let registry = demo_registry().unwrap();
        let mut snapshot = Snapshot::empty(Tick::new(9));
        let state = EntityState::new()
            .with(&Position::new(3, -4))
            .with(&ActorTag)
            .with(&Name("ada".to_owned()));
        snapshot.insert(EntityId::new(5), state).unwrap();

        let report = inspect(&encode_full_snapshot(&snapshot, &registry), &registry).unwrap();
        assert_eq!(report.kind, "FullSnapshot");
        assert_eq!(report.tick, 9);
        let changes = report.changes.unwrap();
        assert_eq!(changes.created.len(), 1);
        let components = &changes.created[0].components;
        assert!(components.contains_key("Position"));
        assert!(components.contains_key("Name"));
    }

    #[test]
    fn hints_name_their_component() {
        let registry = demo_registry().unwrap();
        let hint = Hint {
            entity: EntityId::new(2),
            kind: Position::KIND,
            payload: Position::new(1, 1).to_payload(),
        };
        let report = inspect(&encode_hints(Tick::new(4), &[hint]), &registry).unwrap();
        assert_eq!(report.hints.len(), 1);
        assert_eq!(report.hints[0].component, "Position");
        assert!(report.changes.is_none());
    }

    #[test]
    fn garbage_is_an_error() {
        let registry = demo_registry().unwrap();
        assert!(inspect(&[1, 2, 3], &registry).is_err());
    }
}
