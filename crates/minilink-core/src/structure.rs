//! Structure file schema and the flat device registry
//!
//! After authentication the client fetches the miniserver's structure
//! document: a deeply nested JSON tree of controls, rooms, categories,
//! autopilot definitions, media-server entries, a weather-server block and
//! a global-states block. Controls carry named states (each a single
//! identifier or an ordered identifier array) and may nest further
//! controls under `subControls`.
//!
//! [`Registry::from_structure`] flattens that tree into a single map
//! keyed by identifier, so every incoming event-table update can be
//! resolved in one lookup. Flattening resolves display-name prefixes
//! (`(Room) `, `parent / child`, `::state[idx]`) and applies the
//! state-aliasing rule: a state identifier that collides with an entry
//! already in the map (typically the owning control itself) is tagged
//! `_primarystate_`, any other state `_state_`.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::uuid::Uuid;

/// The miniserver structure document.
///
/// Only the groups the registry needs are modelled; unknown fields are
/// ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StructureFile {
    pub last_modified: Option<String>,
    pub controls: HashMap<Uuid, Control>,
    pub rooms: HashMap<Uuid, Control>,
    pub cats: HashMap<Uuid, Control>,
    pub autopilot: HashMap<Uuid, Control>,
    pub media_server: HashMap<Uuid, Control>,
    pub weather_server: Option<WeatherServer>,
    pub global_states: HashMap<String, StateRef>,
}

/// One node of the configuration tree.
///
/// Rooms, categories, autopilot definitions and media-server entries
/// share this shape; they simply never populate `states`/`subControls`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Control {
    pub name: Option<String>,
    #[serde(rename = "type", deserialize_with = "type_tag")]
    pub control_type: Option<String>,
    pub states: HashMap<String, StateRef>,
    pub sub_controls: HashMap<Uuid, Control>,
}

/// Control types are strings, but structural nodes (rooms, categories)
/// carry numeric type codes in the same field.
fn type_tag<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }))
}

/// A named state: one identifier, or an ordered sequence of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StateRef {
    One(Uuid),
    Many(Vec<Uuid>),
}

/// The weather-server block: a plain bundle of named states.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WeatherServer {
    pub states: HashMap<String, StateRef>,
}

/// Category tag of a registry entry: one of the structural tags, or the
/// server-declared control type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Room,
    Category,
    Autopilot,
    State,
    PrimaryState,
    Control(String),
}

impl EntryKind {
    /// Structural entries are not directly commandable.
    pub fn is_structural(&self) -> bool {
        !matches!(self, EntryKind::Control(_))
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Room => f.write_str("_room_"),
            EntryKind::Category => f.write_str("_category_"),
            EntryKind::Autopilot => f.write_str("_autopilot_"),
            EntryKind::State => f.write_str("_state_"),
            EntryKind::PrimaryState => f.write_str("_primarystate_"),
            EntryKind::Control(t) => f.write_str(t),
        }
    }
}

/// Last known value of a device, typed by whichever table updated it.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Float(f64),
    Text(String),
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Float(v) => write!(f, "{v}"),
            StateValue::Text(t) => f.write_str(t),
        }
    }
}

/// One addressable device or state in the flat registry.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEntry {
    pub name: String,
    pub kind: EntryKind,
    pub value: Option<StateValue>,
}

/// Flat map from identifier to device metadata and last known value.
///
/// Built once per successful config load and mutated in place by incoming
/// table decodes. The session's single consumption path is the only
/// writer.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    devices: HashMap<Uuid, DeviceEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten a structure document into a fresh registry.
    pub fn from_structure(structure: &StructureFile) -> Self {
        let mut devices = HashMap::new();

        flatten_group(&mut devices, &structure.controls, "", None);
        flatten_group(&mut devices, &structure.media_server, "(MediaServer) ", None);
        flatten_group(&mut devices, &structure.rooms, "(Room) ", Some(&EntryKind::Room));
        flatten_group(&mut devices, &structure.cats, "(Category) ", Some(&EntryKind::Category));
        flatten_group(
            &mut devices,
            &structure.autopilot,
            "(autopilot) ",
            Some(&EntryKind::Autopilot),
        );

        if let Some(weather) = &structure.weather_server {
            flatten_states(
                &mut devices,
                &weather.states,
                "(WeatherServer) WeatherServer",
                None,
            );
        }
        flatten_states(
            &mut devices,
            &structure.global_states,
            "(GlobalStates) GlobalState",
            None,
        );

        Self { devices }
    }

    /// Look up a device by identifier.
    pub fn get(&self, uuid: &Uuid) -> Option<&DeviceEntry> {
        self.devices.get(uuid)
    }

    /// Human-readable name for an identifier, falling back to the
    /// canonical identifier string for unknown ones.
    pub fn display_name<'a>(&'a self, uuid: &'a Uuid) -> &'a str {
        self.devices
            .get(uuid)
            .map(|entry| entry.name.as_str())
            .unwrap_or_else(|| uuid.as_str())
    }

    /// Apply one decoded update in place.
    ///
    /// An unknown identifier is reportable but non-fatal; the caller logs
    /// it and keeps applying the rest of the table.
    pub fn apply(&mut self, uuid: &Uuid, value: StateValue) -> Result<()> {
        match self.devices.get_mut(uuid) {
            Some(entry) => {
                entry.value = Some(value);
                Ok(())
            }
            None => Err(Error::UnknownIdentifier(uuid.clone())),
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &DeviceEntry)> {
        self.devices.iter()
    }
}

/// Flatten one group of controls, recursing into sub-controls.
///
/// `forced` pins the entry kind for structural groups (rooms, categories,
/// autopilot); otherwise the control's own declared type is used.
/// Sub-controls always derive their kind themselves.
fn flatten_group(
    out: &mut HashMap<Uuid, DeviceEntry>,
    group: &HashMap<Uuid, Control>,
    prefix: &str,
    forced: Option<&EntryKind>,
) {
    for (uuid, control) in group {
        let name = format!("{prefix}{}", control.name.as_deref().unwrap_or(""));
        let kind = match forced {
            Some(kind) => kind.clone(),
            None => EntryKind::Control(control.control_type.clone().unwrap_or_default()),
        };
        out.insert(
            uuid.clone(),
            DeviceEntry {
                name: name.clone(),
                kind,
                value: None,
            },
        );

        flatten_states(out, &control.states, &name, forced);

        if !control.sub_controls.is_empty() {
            flatten_group(out, &control.sub_controls, &format!("{name} / "), None);
        }
    }
}

/// Register the states of one device under its display name.
fn flatten_states(
    out: &mut HashMap<Uuid, DeviceEntry>,
    states: &HashMap<String, StateRef>,
    device_name: &str,
    forced: Option<&EntryKind>,
) {
    for (state_name, state_ref) in states {
        match state_ref {
            StateRef::One(uuid) => {
                alias_state(out, uuid, format!("{device_name}::{state_name}"), forced);
            }
            StateRef::Many(uuids) => {
                for (idx, uuid) in uuids.iter().enumerate() {
                    alias_state(
                        out,
                        uuid,
                        format!("{device_name}::{state_name}[{idx}]"),
                        forced,
                    );
                }
            }
        }
    }
}

/// Insert one state, applying the aliasing rule.
///
/// A state whose identifier is already registered (most often the owning
/// control itself) becomes the device's primary state; the entry is
/// overwritten with the suffixed name and the `_primarystate_` tag.
fn alias_state(
    out: &mut HashMap<Uuid, DeviceEntry>,
    uuid: &Uuid,
    name: String,
    forced: Option<&EntryKind>,
) {
    let kind = match forced {
        Some(kind) => kind.clone(),
        None if out.contains_key(uuid) => EntryKind::PrimaryState,
        None => EntryKind::State,
    };
    out.insert(
        uuid.clone(),
        DeviceEntry {
            name,
            kind,
            value: None,
        },
    );
}
