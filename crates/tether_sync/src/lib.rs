//! Tether Sync - keeps a renderer scene graph in step with a host scene.
//!
//! This crate provides:
//!
//! - **Translators**: one per primitive kind, turning host entities into
//!   renderer nodes (`translators`)
//! - **Scene mirror**: the full export, with instance fan-out and the
//!   motion-blur sampler (`SceneMirror`)
//! - **Incremental sync**: batches of change notifications applied to a
//!   live renderer scene (`SceneSync`)
//! - **Session services**: property schema, texture preparation, display
//!   configuration and string expansion, owned by a `SessionContext`
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_core::{load_scene_json, EntityId};
//! use tether_sg::SgScene;
//! use tether_sync::{Notification, SceneSync, SessionConfig, SessionContext};
//!
//! let mut scene = load_scene_json("shot010.json")?;
//! let session = SessionContext::new(SessionConfig::interactive())?;
//! let mut sync = SceneSync::new(session, Arc::new(SgScene::new()));
//! sync.export(&mut scene)?;
//!
//! scene.frame_current += 1;
//! let report = sync.update_scene(&scene, &[Notification::scene()])?;
//! println!("{}", report);
//! ```

/// Borrow the parts of a mirror a translator call needs.
macro_rules! translate_ctx {
    ($mirror:expr, $graph:expr, $scene:expr) => {
        $crate::translators::TranslateContext {
            graph: $graph,
            scene: $scene,
            session: &mut $mirror.session,
            materials: &$mirror.materials,
            obj_hash: &mut $mirror.obj_hash,
        }
    };
}

pub mod config;
pub mod context;
pub mod display;
pub mod error;
pub mod handle;
pub mod kind;
pub mod mirror;
pub mod motion;
pub mod naming;
pub mod options;
pub mod report;
pub mod schema;
pub mod string_expr;
pub mod sync;
pub mod texture;
pub mod translators;

mod fanout;
mod sampler;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{ConfigError, RenderMode, SessionConfig};
pub use context::SessionContext;
pub use display::{BeautyDisplays, DisplayConfig, DisplaySpec};
pub use error::{SyncError, SyncResult};
pub use handle::{NodeState, RmanSgGroup, RmanSgNode};
pub use kind::{detect_primitive, PrimitiveKind};
pub use mirror::SceneMirror;
pub use report::{EntityError, Operation, SyncReport};
pub use schema::{PropertySchema, SchemaError};
pub use sync::{ChangeKind, Notification, SceneSync};
pub use texture::{TextureError, TextureManager, TextureOwner, TexturePreparer};
