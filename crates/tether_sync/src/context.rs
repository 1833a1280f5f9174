//! Session-scoped collaborators handed to the engine at construction.

use tether_core::Scene;

use crate::config::SessionConfig;
use crate::display::{BeautyDisplays, DisplayConfig};
use crate::error::SyncResult;
use crate::schema::PropertySchema;
use crate::string_expr::StringExpr;
use crate::texture::TextureManager;

/// Everything the engine needs besides the host scene and the renderer
/// graph. Created at session start, dropped with the session.
pub struct SessionContext {
    pub config: SessionConfig,
    pub schema: PropertySchema,
    pub textures: TextureManager,
    pub strings: StringExpr,
    pub displays: Box<dyn DisplayConfig>,
}

impl SessionContext {
    /// Context with the builtin schema, default texture preparation and
    /// beauty-only displays.
    pub fn new(config: SessionConfig) -> SyncResult<Self> {
        let schema = PropertySchema::builtin()?;
        let mut textures = TextureManager::default();
        if let Some(dir) = &config.texture_search_path {
            textures.set_base_dir(dir);
        }
        Ok(Self {
            config,
            schema,
            textures,
            strings: StringExpr::new(),
            displays: Box::new(BeautyDisplays::new()),
        })
    }

    pub fn with_schema(mut self, schema: PropertySchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_textures(mut self, textures: TextureManager) -> Self {
        self.textures = textures;
        self
    }

    pub fn with_displays(mut self, displays: Box<dyn DisplayConfig>) -> Self {
        self.displays = displays;
        self
    }

    /// Refresh the scene, layer and frame tokens.
    pub fn set_scene_tokens(&mut self, scene: &Scene) {
        self.strings.set_var("scene", scene.name.as_str());
        self.strings.set_var("layer", scene.view_layer.as_str());
        self.strings.set_frame_context(scene.frame_current);
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("config", &self.config)
            .field("textures", &self.textures)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_tokens() {
        let mut ctx = SessionContext::new(SessionConfig::default()).unwrap();
        let mut scene = Scene::new("shot");
        scene.frame_current = 7;
        ctx.set_scene_tokens(&scene);
        assert_eq!(ctx.strings.expand("<scene>_<layer>.<f3>"), "shot_ViewLayer.007");
    }
}
