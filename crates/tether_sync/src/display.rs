//! Display and AOV configuration.
//!
//! The engine asks a [`DisplayConfig`] for the channels and displays of the
//! current render layer once per full export, and again when the world
//! changes. Pipelines plug in their own; [`BeautyDisplays`] is the default.

use tether_core::{EntityId, HoldoutMatte, Scene};
use tether_sg::DisplayChannel;

use crate::config::SessionConfig;
use crate::string_expr::StringExpr;

/// One output image.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplaySpec {
    pub name: String,
    /// Display driver, e.g. `openexr` or `it`
    pub driver: String,
    /// Output path, already expanded
    pub path: String,
    pub channels: Vec<String>,
    /// Camera rendering this display; `None` means the main camera
    pub camera: Option<EntityId>,
}

pub trait DisplayConfig: Send {
    fn channels(&self, scene: &Scene, session: &SessionConfig) -> Vec<DisplayChannel>;

    fn displays(&self, scene: &Scene, session: &SessionConfig, strings: &StringExpr) -> Vec<DisplaySpec>;
}

/// Beauty (`Ci`, `a`) plus optional extra AOVs, all written to one display.
#[derive(Clone, Debug, Default)]
pub struct BeautyDisplays {
    pub aovs: Vec<DisplayChannel>,
}

impl BeautyDisplays {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an AOV written alongside the beauty channels.
    pub fn with_aov(mut self, name: &str, declare_type: &str, source: &str) -> Self {
        self.aovs.push(channel(name, declare_type, source));
        self
    }
}

fn channel(name: &str, declare_type: &str, source: &str) -> DisplayChannel {
    DisplayChannel {
        name: name.to_string(),
        source: source.to_string(),
        declare_type: declare_type.to_string(),
        filter: None,
        statistics: None,
    }
}

impl DisplayConfig for BeautyDisplays {
    fn channels(&self, scene: &Scene, _session: &SessionConfig) -> Vec<DisplayChannel> {
        let mut channels = vec![channel("Ci", "color", "Ci"), channel("a", "float", "a")];
        if scene.settings.holdout_matte != HoldoutMatte::Off {
            channels.push(channel("occluded", "color", "lpe:holdouts;C[DS]+<L.>"));
            channels.push(channel("holdoutMatte", "color", "lpe:holdouts;unoccluded;C[DS]+<L.>"));
        }
        channels.extend(self.aovs.iter().cloned());
        channels
    }

    fn displays(&self, scene: &Scene, session: &SessionConfig, strings: &StringExpr) -> Vec<DisplaySpec> {
        let mut channels: Vec<String> = self
            .channels(scene, session)
            .into_iter()
            .map(|c| c.name)
            .collect();
        if session.is_interactive() {
            // The framebuffer only shows the beauty
            channels.truncate(2);
            return vec![DisplaySpec {
                name: "beauty".to_string(),
                driver: "it".to_string(),
                path: scene.name.clone(),
                channels,
                camera: None,
            }];
        }

        let template = format!(
            "{}/<scene>.<layer>.<f4>.exr",
            session.output_dir.to_string_lossy()
        );
        vec![DisplaySpec {
            name: "beauty".to_string(),
            driver: "openexr".to_string(),
            path: strings.expand(&template),
            channels,
            camera: None,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(scene: &Scene) -> StringExpr {
        let mut strings = StringExpr::new();
        strings.set_var("scene", scene.name.as_str());
        strings.set_var("layer", scene.view_layer.as_str());
        strings.set_frame_context(scene.frame_current);
        strings
    }

    #[test]
    fn test_final_display_path() {
        let mut scene = Scene::new("shot010");
        scene.frame_current = 12;
        let config = SessionConfig::default();
        let displays = BeautyDisplays::new().displays(&scene, &config, &strings(&scene));
        assert_eq!(displays.len(), 1);
        assert_eq!(displays[0].driver, "openexr");
        assert_eq!(displays[0].path, "renders/shot010.ViewLayer.0012.exr");
        assert_eq!(displays[0].channels, vec!["Ci", "a"]);
    }

    #[test]
    fn test_interactive_uses_framebuffer() {
        let scene = Scene::new("shot010");
        let displays = BeautyDisplays::new()
            .with_aov("albedo", "color", "lpe:nothruput;noinfinitecheck;noclamp;unoccluded;overwrite;C(U2L)|O")
            .displays(&scene, &SessionConfig::interactive(), &strings(&scene));
        assert_eq!(displays[0].driver, "it");
        assert_eq!(displays[0].channels.len(), 2);
    }

    #[test]
    fn test_holdout_channels() {
        let mut scene = Scene::new("s");
        scene.settings.holdout_matte = HoldoutMatte::Aov;
        let names: Vec<String> = BeautyDisplays::new()
            .channels(&scene, &SessionConfig::default())
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert!(names.contains(&"holdoutMatte".to_string()));
    }
}
