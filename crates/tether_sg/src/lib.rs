//! Retained-mode renderer scene graph.
//!
//! An arena of DAG nodes (groups, geometry, lights, cameras, materials)
//! with scene-wide options and shaders, guarded by [`SgScene`] edit
//! sections.

pub mod error;
pub mod graph;
pub mod node;
pub mod params;
pub mod scene;

pub use error::{SgError, SgResult};
pub use graph::{DisplayChannel, SgGraph};
pub use node::{DagNode, Display, NodeKey, NodeKind, Renderable, Shader, ShaderClass, Topology, Transform};
pub use params::{Detail, ParamList, ParamValue, Primvar, PrimvarList};
pub use scene::{SceneEdit, SgScene};
