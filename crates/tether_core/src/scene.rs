//! The host scene as the sync engine sees it.
//!
//! A `Scene` is a snapshot of an evaluated host scene: objects with their
//! data, materials, collections, world and render settings. The engine
//! never owns host entities; it reads a `Scene` through the `HostScene`
//! trait and asks the host to re-evaluate at other frames for motion blur.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tether_math::{Mat4, Vec3};

use crate::data::{LightRole, ObjectData};
use crate::material::{Material, World};
use crate::object::{Object, ObjectType, ParticleRender};
use crate::settings::RenderSettings;

/// Stable identity of a host entity.
///
/// Names are not unique across linked or duplicated data, so the engine
/// keys everything by this id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named set of objects and child collections.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Collection {
    pub id: EntityId,
    pub name: String,
    pub objects: Vec<EntityId>,
    pub children: Vec<EntityId>,
}

/// Interactive viewport state, used for viewport renders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewport {
    /// World-to-view matrix
    pub view_matrix: Mat4,
    pub lens: f32,
    pub resolution: [u32; 2],
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            view_matrix: Mat4::IDENTITY,
            lens: 50.0,
            resolution: [960, 540],
        }
    }
}

/// One evaluated placement of an object.
///
/// Plain objects produce one of these each. Empties that instance a
/// collection and particle systems that render as objects produce one per
/// placed copy, with `is_instance` set and `parent` naming the instancer.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectInstance {
    /// The placed object (the instanced object for instances)
    pub object: EntityId,
    pub is_instance: bool,
    /// Instancer owning this placement
    pub parent: Option<EntityId>,
    /// Index into the parent's particle systems
    pub particle_system: Option<usize>,
    /// Host-provided ids, stable for the same placement across frames
    pub persistent_id: [i32; 2],
    pub matrix_world: Mat4,
    pub show_self: bool,
}

impl ObjectInstance {
    fn plain(ob: &Object) -> Self {
        Self {
            object: ob.id,
            is_instance: false,
            parent: None,
            particle_system: None,
            persistent_id: [0, 0],
            matrix_world: ob.matrix_world,
            show_self: ob.particle_systems.iter().all(|p| p.render_emitter),
        }
    }
}

/// A complete evaluated host scene.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    /// Scene name (usually from filename)
    pub name: String,
    pub view_layer: String,
    pub frame_current: i32,
    pub subframe: f32,
    pub objects: Vec<Object>,
    pub materials: Vec<Material>,
    pub collections: Vec<Collection>,
    pub world: World,
    /// Active camera
    pub camera: Option<EntityId>,
    pub settings: RenderSettings,
    pub viewport: Option<Viewport>,
}

impl Scene {
    /// Create an empty scene.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            view_layer: "ViewLayer".to_string(),
            frame_current: 1,
            ..Default::default()
        }
    }

    /// Smallest id not used by any entity in the scene.
    pub fn next_id(&self) -> EntityId {
        let objects = self.objects.iter().map(|o| o.id.0);
        let materials = self.materials.iter().map(|m| m.id.0);
        let collections = self.collections.iter().map(|c| c.id.0);
        let psys = self
            .objects
            .iter()
            .flat_map(|o| o.particle_systems.iter().map(|p| p.settings.0));
        let max = objects.chain(materials).chain(collections).chain(psys).max();
        EntityId(max.map_or(1, |m| m + 1))
    }

    pub fn add_object(&mut self, object: Object) -> EntityId {
        let id = object.id;
        self.objects.push(object);
        id
    }

    pub fn add_material(&mut self, material: Material) -> EntityId {
        let id = material.id;
        self.materials.push(material);
        id
    }

    pub fn add_collection(&mut self, collection: Collection) -> EntityId {
        let id = collection.id;
        self.collections.push(collection);
        id
    }

    /// Remove an object and drop it from every collection.
    pub fn remove_object(&mut self, id: EntityId) -> Option<Object> {
        let index = self.objects.iter().position(|o| o.id == id)?;
        for collection in &mut self.collections {
            collection.objects.retain(|o| *o != id);
        }
        Some(self.objects.remove(index))
    }

    pub fn object(&self, id: EntityId) -> Option<&Object> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn object_mut(&mut self, id: EntityId) -> Option<&mut Object> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    pub fn object_by_name(&self, name: &str) -> Option<&Object> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn material(&self, id: EntityId) -> Option<&Material> {
        self.materials.iter().find(|m| m.id == id)
    }

    pub fn material_mut(&mut self, id: EntityId) -> Option<&mut Material> {
        self.materials.iter_mut().find(|m| m.id == id)
    }

    pub fn collection(&self, id: EntityId) -> Option<&Collection> {
        self.collections.iter().find(|c| c.id == id)
    }

    pub fn collection_mut(&mut self, id: EntityId) -> Option<&mut Collection> {
        self.collections.iter_mut().find(|c| c.id == id)
    }

    /// Every object in a collection and its children, depth first, once each.
    pub fn collection_all_objects(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut seen_objects = HashSet::new();
        let mut seen_collections = HashSet::new();
        self.collect_objects(id, &mut out, &mut seen_objects, &mut seen_collections);
        out
    }

    fn collect_objects(
        &self,
        id: EntityId,
        out: &mut Vec<EntityId>,
        seen_objects: &mut HashSet<EntityId>,
        seen_collections: &mut HashSet<EntityId>,
    ) {
        if !seen_collections.insert(id) {
            return;
        }
        let Some(collection) = self.collection(id) else {
            return;
        };
        for ob in &collection.objects {
            if seen_objects.insert(*ob) {
                out.push(*ob);
            }
        }
        for child in &collection.children {
            self.collect_objects(*child, out, seen_objects, seen_collections);
        }
    }

    /// Collections that directly or indirectly contain an object.
    pub fn collections_containing(&self, id: EntityId) -> Vec<EntityId> {
        self.collections
            .iter()
            .filter(|c| self.collection_all_objects(c.id).contains(&id))
            .map(|c| c.id)
            .collect()
    }

    /// Material override if set, otherwise the first filled slot.
    pub fn active_material(&self, ob: &Object) -> Option<&Material> {
        if let Some(id) = ob.material_override {
            return self.material(id);
        }
        ob.material_slots
            .iter()
            .flatten()
            .next()
            .and_then(|id| self.material(*id))
    }

    /// Material in a 0-based slot.
    pub fn slot_material(&self, ob: &Object, slot: usize) -> Option<&Material> {
        ob.material_slots
            .get(slot)
            .copied()
            .flatten()
            .and_then(|id| self.material(id))
    }

    /// All light objects, optionally including light filters.
    pub fn lights(&self, include_filters: bool) -> impl Iterator<Item = &Object> + '_ {
        self.objects.iter().filter(move |o| match &o.data {
            ObjectData::Light(light) if o.object_type == ObjectType::Light => {
                include_filters || light.role != LightRole::LightFilter
            }
            _ => false,
        })
    }

    /// Does this object (or an ancestor) move over time?
    pub fn is_transforming(&self, ob: &Object) -> bool {
        let mut current = ob;
        let mut visited = HashSet::new();
        loop {
            if current.animated {
                return true;
            }
            if !visited.insert(current.id) {
                return false;
            }
            let Some(parent) = current.parent.and_then(|p| self.object(p)) else {
                return false;
            };
            if parent.object_type == ObjectType::Curve
                && parent.data.as_curve().is_some_and(|c| c.use_path)
            {
                return true;
            }
            current = parent;
        }
    }

    /// Evaluated placements of every visible object.
    pub fn object_instances(&self) -> Vec<ObjectInstance> {
        let mut instances = Vec::new();

        for ob in &self.objects {
            if ob.hidden {
                continue;
            }

            if !ob.instanced_only {
                instances.push(ObjectInstance::plain(ob));
            }

            if ob.is_instancer() {
                let members = ob
                    .instance_collection
                    .map(|c| self.collection_all_objects(c))
                    .unwrap_or_default();
                for (i, member_id) in members.iter().enumerate() {
                    let Some(member) = self.object(*member_id) else {
                        continue;
                    };
                    if member.id == ob.id || member.hidden {
                        continue;
                    }
                    instances.push(ObjectInstance {
                        object: member.id,
                        is_instance: true,
                        parent: Some(ob.id),
                        particle_system: None,
                        persistent_id: [i as i32, 0],
                        matrix_world: ob.matrix_world * member.matrix_world,
                        show_self: true,
                    });
                }
            }

            for (psys_index, psys) in ob.particle_systems.iter().enumerate() {
                let targets = match psys.render_as {
                    ParticleRender::Object(target) => vec![target],
                    ParticleRender::Collection(c) => self.collection_all_objects(c),
                    ParticleRender::Points | ParticleRender::Hair => continue,
                };
                if targets.is_empty() {
                    continue;
                }
                for (pi, particle) in psys.alive_particles() {
                    let target = targets[pi % targets.len()];
                    if self.object(target).is_none() {
                        continue;
                    }
                    instances.push(ObjectInstance {
                        object: target,
                        is_instance: true,
                        parent: Some(ob.id),
                        particle_system: Some(psys_index),
                        persistent_id: [pi as i32, psys_index as i32],
                        matrix_world: particle.matrix(),
                        show_self: true,
                    });
                }
            }
        }

        instances
    }

    /// Location of the active camera, if any.
    pub fn camera_location(&self) -> Option<Vec3> {
        self.camera.and_then(|c| self.object(c)).map(|c| c.location())
    }
}

/// Access to the host scene for the sync engine.
///
/// `frame_set` re-evaluates the host at another time. The engine always
/// calls it again with the original frame and sub-frame 0 when it is done
/// sampling motion.
pub trait HostScene {
    fn scene(&self) -> &Scene;

    fn frame_set(&mut self, frame: i32, subframe: f32);
}

impl HostScene for Scene {
    fn scene(&self) -> &Scene {
        self
    }

    fn frame_set(&mut self, frame: i32, subframe: f32) {
        self.frame_current = frame;
        self.subframe = subframe;
    }
}

/// Re-evaluates a scene at a given time.
pub type Animator = Box<dyn Fn(&mut Scene, f32) + Send + Sync>;

/// A scene with procedural animation.
///
/// Edits go to the base scene; every `frame_set` clones the base and runs
/// each animator with the absolute time (frame + sub-frame).
pub struct AnimatedScene {
    base: Scene,
    evaluated: Scene,
    animators: Vec<Animator>,
}

impl AnimatedScene {
    pub fn new(base: Scene) -> Self {
        Self {
            evaluated: base.clone(),
            base,
            animators: Vec::new(),
        }
    }

    pub fn animate(mut self, animator: impl Fn(&mut Scene, f32) + Send + Sync + 'static) -> Self {
        self.animators.push(Box::new(animator));
        self.reevaluate();
        self
    }

    /// Mutable access to the un-animated scene. Call `reevaluate` afterwards.
    pub fn base_mut(&mut self) -> &mut Scene {
        &mut self.base
    }

    pub fn reevaluate(&mut self) {
        let mut evaluated = self.base.clone();
        let time = evaluated.frame_current as f32 + evaluated.subframe;
        for animator in &self.animators {
            animator(&mut evaluated, time);
        }
        self.evaluated = evaluated;
    }
}

impl HostScene for AnimatedScene {
    fn scene(&self) -> &Scene {
        &self.evaluated
    }

    fn frame_set(&mut self, frame: i32, subframe: f32) {
        self.base.frame_current = frame;
        self.base.subframe = subframe;
        self.reevaluate();
    }
}

impl fmt::Debug for AnimatedScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimatedScene")
            .field("scene", &self.evaluated.name)
            .field("frame", &self.evaluated.frame_current)
            .field("subframe", &self.evaluated.subframe)
            .field("animators", &self.animators.len())
            .finish()
    }
}
