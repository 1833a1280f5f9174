//! Deterministic node names.
//!
//! Every exported entity is looked up by a `db_name` built from its
//! identity and primitive kind, so the same entity maps to the same node
//! across frames and a kind change maps to a different one.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use tether_core::{EntityId, Material, Object, ObjectInstance, ParticleSystem, Scene};

use crate::kind::PrimitiveKind;

/// Name of the camera node created for viewport renders.
pub const VIEWPORT_CAMERA: &str = "main_camera";

/// Name of the fallback light.
pub const DEFAULT_LIGHT: &str = "__defaultlight";

/// Replace anything that is not alphanumeric, `_` or `.` with `_`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

/// Name plus identity. Host names are not unique, ids are.
pub fn entity_tag(name: &str, id: EntityId) -> String {
    format!("{}_{}", sanitize(name), id)
}

/// Meta objects named `Ball`, `Ball.001`, ... form the family `Ball`.
pub fn meta_family(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

pub fn db_name(ob: &Object, kind: PrimitiveKind) -> String {
    match kind {
        PrimitiveKind::Meta => format!("{}-{}", sanitize(meta_family(&ob.name)), kind.tag()),
        _ => format!("{}-{}", entity_tag(&ob.name, ob.id), kind.tag()),
    }
}

/// Name of the node a particle system exports to.
pub fn particles_db_name(emitter: &Object, psys: &ParticleSystem, kind: PrimitiveKind) -> String {
    format!(
        "{}|{}-{}",
        entity_tag(&emitter.name, emitter.id),
        sanitize(&psys.name),
        kind.tag()
    )
}

pub fn material_db_name(material: &Material) -> String {
    format!(
        "{}-{}",
        entity_tag(&material.name, material.id),
        PrimitiveKind::Material.tag()
    )
}

/// Key of one placement.
///
/// Plain placements use the object alone. Instances add the instancer,
/// the particle system and the host's persistent ids, so the same copy
/// keeps its key from frame to frame.
pub fn group_db_name(scene: &Scene, inst: &ObjectInstance) -> String {
    let object = scene
        .object(inst.object)
        .map_or_else(|| inst.object.to_string(), |ob| entity_tag(&ob.name, ob.id));
    if !inst.is_instance {
        return object;
    }

    let parent = inst
        .parent
        .and_then(|p| scene.object(p))
        .map_or_else(String::new, |p| entity_tag(&p.name, p.id));
    let [pid0, pid1] = inst.persistent_id;
    let psys = inst.particle_system.and_then(|index| {
        inst.parent
            .and_then(|p| scene.object(p))
            .and_then(|p| p.particle_systems.get(index))
    });
    match psys {
        Some(psys) => format!("{}|{}|{}|{}|{}", parent, object, sanitize(&psys.name), pid1, pid0),
        None => format!("{}|{}|{}|{}", parent, object, pid1, pid0),
    }
}

/// Handle of a light filter shader.
pub fn light_filter_handle(filter_db_name: &str, shader: &str) -> String {
    format!("{}-{}", filter_db_name, shader)
}

/// 32-bit FNV-1a, reduced the way renderer ids expect (positive, < 10^8).
pub fn name_hash(name: &str) -> i32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in name.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    (hash % 100_000_000) as i32
}

/// Append-only id to name table, used for picking.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjHash {
    ids: BTreeMap<i32, String>,
}

impl ObjHash {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for a placement: the host's persistent id when set, otherwise a
    /// hash of the name. The first name stamped with an id keeps it.
    pub fn stamp(&mut self, name: &str, persistent_id: i32) -> i32 {
        let id = if persistent_id == 0 {
            name_hash(name)
        } else {
            persistent_id
        };
        match self.ids.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(name.to_string());
            }
            Entry::Occupied(slot) if slot.get() != name => {
                log::debug!("Id {} for '{}' already belongs to '{}'", id, name, slot.get());
            }
            Entry::Occupied(_) => {}
        }
        id
    }

    pub fn name(&self, id: i32) -> Option<&str> {
        self.ids.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
