//! Tether Core - host scene model for the scene synchronization engine.
//!
//! This crate provides:
//!
//! - **Host scene types**: `Scene`, `Object`, `Material`, `Collection`, `World`
//! - **Object data**: polygon meshes, curves, points, lights, cameras, volumes
//! - **Evaluation**: `HostScene` for frame changes, `object_instances()` for
//!   the evaluated placement list
//! - **Loading**: JSON scene descriptions
//!
//! # Example
//!
//! ```ignore
//! use tether_core::loader::load_scene_json;
//!
//! let scene = load_scene_json("shot010.json")?;
//! println!("{} objects, {} placements",
//!     scene.objects.len(),
//!     scene.object_instances().len());
//! ```

pub mod data;
pub mod loader;
pub mod material;
pub mod mesh;
pub mod object;
pub mod params;
pub mod scene;
pub mod settings;

// Re-export commonly used types
pub use data::{
    CameraData, CameraProjection, CurveData, FilterCombine, FilterLink, HostLightType, LightData,
    LightRole, MetaData, MetaElement, ObjectData, PointsData, Spline, Stroke, StrokeData,
    VolumeData,
};
pub use loader::{load_scene_from_str, load_scene_json, LoadError, LoadResult};
pub use material::{HoldoutMatte, Material, ShaderNode, TextureSlot, World};
pub use mesh::{EdgeCrease, MeshData};
pub use object::{
    Modifier, Object, ObjectType, Particle, ParticleRender, ParticleSystem, PrimitiveOverride,
    QuadricShape,
};
pub use params::{HostValue, Params};
pub use scene::{AnimatedScene, Collection, EntityId, HostScene, ObjectInstance, Scene, Viewport};
pub use settings::{BucketOrder, ObjectGroup, RenderSettings, ShutterTiming};
