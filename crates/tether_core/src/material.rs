//! Materials and the world shading setup.

use serde::{Deserialize, Serialize};

use crate::params::Params;
use crate::scene::EntityId;

/// A shader node from the host's node graph, already resolved to a
/// renderer plugin name plus flat parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShaderNode {
    /// Renderer plugin, e.g. `PxrSurface`
    pub plugin: String,

    /// Handle name; empty means generate one
    #[serde(default)]
    pub name: String,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default)]
    pub params: Params,
}

fn default_true() -> bool {
    true
}

impl ShaderNode {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            name: String::new(),
            active: true,
            params: Params::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// A texture file referenced by a material parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextureSlot {
    /// Shader parameter receiving the prepared texture path
    pub param: String,
    /// Source image path, may contain frame tokens
    pub path: String,
}

/// A host material.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub id: EntityId,
    pub name: String,
    /// Surface shader; `None` means build a simple one from `diffuse_color`
    pub bxdf: Option<ShaderNode>,
    /// Present when the material turns geometry into a mesh light
    pub meshlight: Option<ShaderNode>,
    pub displacement: Option<ShaderNode>,
    pub diffuse_color: [f32; 3],
    pub textures: Vec<TextureSlot>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            id: EntityId(0),
            name: String::new(),
            bxdf: None,
            meshlight: None,
            displacement: None,
            diffuse_color: [0.5, 0.5, 0.5], // Grey default
            textures: Vec::new(),
        }
    }
}

impl Material {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_bxdf(mut self, bxdf: ShaderNode) -> Self {
        self.bxdf = Some(bxdf);
        self
    }

    /// Check if this material is emissive.
    pub fn is_meshlight(&self) -> bool {
        self.meshlight.is_some()
    }

    /// Every string parameter of every shader node in this material.
    pub fn string_params(&self) -> impl Iterator<Item = &str> + '_ {
        self.bxdf
            .iter()
            .chain(self.meshlight.iter())
            .chain(self.displacement.iter())
            .flat_map(|node| node.params.values())
            .filter_map(|v| v.as_str())
            .chain(self.textures.iter().map(|t| t.path.as_str()))
    }
}

/// Holdout matte mode for the shadow sample filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldoutMatte {
    #[default]
    Off,
    Alpha,
    Aov,
}

/// World settings: integrator, filters and background.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct World {
    pub color: [f32; 3],
    /// Whether the world has a renderer node tree; without one only the
    /// background color is exported
    pub use_renderman_node: bool,
    pub integrator: Option<ShaderNode>,
    pub display_filters: Vec<ShaderNode>,
    pub sample_filters: Vec<ShaderNode>,
}

impl Default for World {
    fn default() -> Self {
        Self {
            color: [0.05, 0.05, 0.05],
            use_renderman_node: false,
            integrator: None,
            display_filters: Vec::new(),
            sample_filters: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::HostValue;

    #[test]
    fn test_string_params_cover_textures() {
        let mut bxdf = ShaderNode::new("PxrSurface");
        bxdf.params.insert("label".into(), HostValue::from("skin"));
        bxdf.params.insert("gain".into(), HostValue::from(1.0f32));
        let mut mat = Material::new(EntityId(5), "Skin").with_bxdf(bxdf);
        mat.textures.push(TextureSlot {
            param: "diffuseColor".into(),
            path: "skin.<f4>.png".into(),
        });

        let strings: Vec<&str> = mat.string_params().collect();
        assert_eq!(strings, vec!["skin", "skin.<f4>.png"]);
    }

    #[test]
    fn test_meshlight() {
        let mut mat = Material::new(EntityId(1), "Glow");
        assert!(!mat.is_meshlight());
        mat.meshlight = Some(ShaderNode::new("PxrMeshLight"));
        assert!(mat.is_meshlight());
    }
}
