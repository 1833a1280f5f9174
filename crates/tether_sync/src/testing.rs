//! Shared test fixtures.

use std::collections::BTreeMap;

use tether_core::{EntityId, MeshData, Object, ObjectData, ObjectType, Scene};
use tether_math::{Mat4, Vec3};
use tether_sg::SgGraph;

use crate::config::SessionConfig;
use crate::context::SessionContext;
use crate::handle::RmanSgNode;
use crate::naming::{self, ObjHash};
use crate::translators::{MaterialTranslator, Source, TranslateContext, Translator};

/// Owned state behind a [`TranslateContext`], for driving translators
/// one call at a time.
pub struct TranslateFixture {
    pub graph: SgGraph,
    pub scene: Scene,
    pub session: SessionContext,
    pub materials: BTreeMap<EntityId, RmanSgNode>,
    pub obj_hash: ObjHash,
}

impl TranslateFixture {
    pub fn new(scene: Scene) -> Self {
        Self {
            graph: SgGraph::new(),
            scene,
            session: SessionContext::new(SessionConfig::default()).unwrap(),
            materials: BTreeMap::new(),
            obj_hash: ObjHash::new(),
        }
    }

    pub fn ctx(&mut self) -> TranslateContext<'_> {
        TranslateContext {
            graph: &mut self.graph,
            scene: &self.scene,
            session: &mut self.session,
            materials: &self.materials,
            obj_hash: &mut self.obj_hash,
        }
    }

    /// Export a material of the scene and register it for bindings.
    pub fn add_material(&mut self, id: EntityId) {
        let mat = self.scene.material(id).unwrap().clone();
        let db_name = naming::material_db_name(&mat);
        let mut ctx = self.ctx();
        let mut node = MaterialTranslator
            .export(&mut ctx, Source::Material(&mat), &db_name)
            .unwrap()
            .unwrap();
        MaterialTranslator
            .update(&mut ctx, Source::Material(&mat), &mut node)
            .unwrap();
        self.materials.insert(id, node);
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A cube mesh object at `location`.
pub fn cube(id: u64, name: &str, location: Vec3) -> Object {
    Object::new(EntityId(id), name, ObjectType::Mesh, ObjectData::Mesh(MeshData::cube()))
        .with_matrix(Mat4::from_translation(location))
}
