//! Scene-level render settings.
//!
//! These mirror the options a user edits on the host scene. They are
//! loaded with the scene (see `loader`) and read by the sync engine when
//! it exports global options, the hider and motion blur.

use serde::{Deserialize, Serialize};

use crate::material::HoldoutMatte;
use crate::params::Params;
use crate::scene::EntityId;

/// Where the shutter interval sits relative to the frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutterTiming {
    /// Open at the frame, close one interval later
    FrameOpen,
    /// Centered on the frame
    #[default]
    FrameCenter,
    /// Close at the frame
    FrameClose,
}

/// Bucket traversal order for the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketOrder {
    #[default]
    Circle,
    Horizontal,
    Vertical,
    ZigZagX,
    ZigZagY,
    Spacefill,
    Random,
    Spiral,
}

impl BucketOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            BucketOrder::Circle => "circle",
            BucketOrder::Horizontal => "horizontal",
            BucketOrder::Vertical => "vertical",
            BucketOrder::ZigZagX => "zigzag-x",
            BucketOrder::ZigZagY => "zigzag-y",
            BucketOrder::Spacefill => "spacefill",
            BucketOrder::Random => "random",
            BucketOrder::Spiral => "spiral",
        }
    }
}

/// Named set of objects exported as a grouping membership.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectGroup {
    pub name: String,
    pub members: Vec<EntityId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub resolution: [u32; 2],

    // Motion blur
    pub motion_blur: bool,
    pub motion_segments: u32,
    pub shutter_angle: f32,
    pub shutter_timing: ShutterTiming,
    pub sample_motion_blur: bool,

    // Lighting
    pub solo_light: bool,
    pub render_default_light: bool,

    // Options
    pub threads: i32,
    pub limits_geocachememory: i32,
    pub limits_opacitycachememory: i32,
    pub limits_texturememory: i32,
    pub pixel_filter: String,
    pub pixel_filter_size: [f32; 2],
    pub bucket_order: BucketOrder,
    /// Spiral origin, `-1` centers that axis
    pub bucket_spiral: [i32; 2],
    pub enable_checkpoint: bool,
    pub checkpoint_interval: String,
    pub checkpoint_exitat: String,
    pub checkpoint_asfinal: bool,

    // Hider
    pub min_samples: i32,
    pub max_samples: i32,
    pub ipr_min_samples: i32,
    pub ipr_max_samples: i32,
    pub incremental: bool,
    pub pixel_variance: f32,
    pub ipr_pixel_variance: f32,
    pub decidither: i32,

    pub holdout_matte: HoldoutMatte,
    pub object_groups: Vec<ObjectGroup>,

    /// Scene-level user properties: render options, root attributes and
    /// values inherited by objects
    pub params: Params,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution: [1920, 1080],
            motion_blur: false,
            motion_segments: 2,
            shutter_angle: 180.0,
            shutter_timing: ShutterTiming::FrameCenter,
            sample_motion_blur: true,
            solo_light: false,
            render_default_light: false,
            threads: -2,
            limits_geocachememory: 4_096_000,
            limits_opacitycachememory: 2_048_000,
            limits_texturememory: 2_048_000,
            pixel_filter: "gaussian".to_string(),
            pixel_filter_size: [2.0, 2.0],
            bucket_order: BucketOrder::Circle,
            bucket_spiral: [-1, -1],
            enable_checkpoint: false,
            checkpoint_interval: String::new(),
            checkpoint_exitat: String::new(),
            checkpoint_asfinal: false,
            min_samples: 0,
            max_samples: 64,
            ipr_min_samples: 1,
            ipr_max_samples: 64,
            incremental: true,
            pixel_variance: 0.015,
            ipr_pixel_variance: 0.05,
            decidither: 0,
            holdout_matte: HoldoutMatte::Off,
            object_groups: Vec::new(),
            params: Params::new(),
        }
    }
}

impl RenderSettings {
    /// Shutter interval as a fraction of a frame.
    pub fn shutter_interval(&self) -> f32 {
        self.shutter_angle / 360.0
    }

    pub fn aspect_ratio(&self) -> f32 {
        let [x, y] = self.resolution;
        if y == 0 {
            1.0
        } else {
            x as f32 / y as f32
        }
    }
}
