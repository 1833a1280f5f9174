//! Scene loading from JSON.
//!
//! Hosts that are not linked in-process (the CLI, tests, batch tools)
//! describe their scene as a JSON document that deserializes straight into
//! `Scene`. Loading validates identities so the sync engine can rely on
//! every `EntityId` being unique.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

use crate::scene::{EntityId, Scene};

/// Errors that can occur during scene loading.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate entity id {id}: '{first}' and '{second}'")]
    DuplicateId {
        id: EntityId,
        first: String,
        second: String,
    },
}

/// Result type for loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Load a scene from a JSON file.
///
/// The scene name defaults to the file stem when the document has none.
///
/// # Example
///
/// ```ignore
/// use tether_core::loader::load_scene_json;
///
/// let scene = load_scene_json("shot010.json")?;
/// println!("Loaded {} objects", scene.objects.len());
/// ```
pub fn load_scene_json<P: AsRef<Path>>(path: P) -> LoadResult<Scene> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed");
    load_scene_from_str(&content, name)
}

/// Load a scene from a JSON string (useful for testing).
pub fn load_scene_from_str(content: &str, name: &str) -> LoadResult<Scene> {
    let mut scene: Scene = serde_json::from_str(content)?;
    if scene.name.is_empty() {
        scene.name = name.to_string();
    }
    if scene.view_layer.is_empty() {
        scene.view_layer = "ViewLayer".to_string();
    }

    validate(&scene)?;

    log::info!(
        "Loaded scene '{}': {} objects, {} materials, {} collections",
        scene.name,
        scene.objects.len(),
        scene.materials.len(),
        scene.collections.len()
    );

    Ok(scene)
}

/// Check id uniqueness and warn about dangling references.
fn validate(scene: &Scene) -> LoadResult<()> {
    let mut names: HashMap<EntityId, &str> = HashMap::new();

    let entities = scene
        .objects
        .iter()
        .map(|o| (o.id, o.name.as_str()))
        .chain(scene.materials.iter().map(|m| (m.id, m.name.as_str())))
        .chain(scene.collections.iter().map(|c| (c.id, c.name.as_str())));

    for (id, name) in entities {
        if let Some(first) = names.insert(id, name) {
            return Err(LoadError::DuplicateId {
                id,
                first: first.to_string(),
                second: name.to_string(),
            });
        }
    }

    for ob in &scene.objects {
        for slot in ob.material_slots.iter().flatten() {
            if scene.material(*slot).is_none() {
                log::warn!("Object '{}' references missing material {}", ob.name, slot);
            }
        }
        if let Some(parent) = ob.parent {
            if scene.object(parent).is_none() {
                log::warn!("Object '{}' has missing parent {}", ob.name, parent);
            }
        }
        if let Some(collection) = ob.instance_collection {
            if scene.collection(collection).is_none() {
                log::warn!("Empty '{}' instances missing collection {}", ob.name, collection);
            }
        }
    }

    if let Some(camera) = scene.camera {
        if scene.object(camera).is_none() {
            log::warn!("Scene camera {} does not exist", camera);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectType;

    const SCENE: &str = r#"{
        "frame_current": 12,
        "objects": [
            {
                "id": 1,
                "name": "Cube",
                "object_type": "mesh",
                "data": {"kind": "mesh", "data": {
                    "positions": [[0,0,0],[1,0,0],[1,1,0],[0,1,0]],
                    "face_vertex_counts": [4],
                    "face_vertex_indices": [0,1,2,3]
                }},
                "material_slots": [2]
            },
            {
                "id": 3,
                "name": "Camera",
                "object_type": "camera",
                "data": {"kind": "camera", "data": {"lens": 35.0}}
            }
        ],
        "materials": [{"id": 2, "name": "Red", "diffuse_color": [1, 0, 0]}],
        "camera": 3,
        "settings": {"motion_blur": true}
    }"#;

    #[test]
    fn test_load_scene_from_str() {
        let scene = load_scene_from_str(SCENE, "shot").unwrap();
        assert_eq!(scene.name, "shot");
        assert_eq!(scene.frame_current, 12);
        assert_eq!(scene.objects.len(), 2);
        assert_eq!(scene.objects[0].object_type, ObjectType::Mesh);
        assert_eq!(scene.objects[0].data.as_mesh().unwrap().face_count(), 1);
        assert_eq!(scene.camera, Some(EntityId(3)));
        assert!(scene.settings.motion_blur);
        assert_eq!(scene.active_material(&scene.objects[0]).unwrap().name, "Red");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"{"objects": [
            {"id": 1, "name": "A", "object_type": "empty"},
            {"id": 1, "name": "B", "object_type": "empty"}
        ]}"#;
        match load_scene_from_str(json, "dup") {
            Err(LoadError::DuplicateId { id, .. }) => assert_eq!(id, EntityId(1)),
            other => panic!("expected duplicate id error, got {:?}", other.map(|s| s.name)),
        }
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(load_scene_from_str("{", "bad"), Err(LoadError::Json(_))));
    }
}
