//! Motion-blur time offsets and host frame handling.

use tether_core::{HostScene, Scene, ShutterTiming};
use tether_math::{FrameTime, Subframe};

/// Sub-frame offsets for `segments` motion samples.
///
/// The shutter interval is `angle / 360` frames. It starts half an interval
/// early for [`ShutterTiming::FrameCenter`], a full interval early for
/// [`ShutterTiming::FrameClose`] and at the frame for
/// [`ShutterTiming::FrameOpen`]. Samples are spread evenly across it, both
/// ends included.
pub fn motion_subframes(segments: u32, shutter_angle: f32, timing: ShutterTiming) -> Vec<Subframe> {
    match segments {
        0 => Vec::new(),
        1 => vec![Subframe::new(0.0)],
        n => {
            let interval = shutter_angle / 360.0;
            let start = match timing {
                ShutterTiming::FrameCenter => -0.5 * interval,
                ShutterTiming::FrameClose => -interval,
                ShutterTiming::FrameOpen => 0.0,
            };
            let step = interval / (n - 1) as f32;
            (0..n).map(|i| Subframe::new(start + i as f32 * step)).collect()
        }
    }
}

/// Primvar sample times: the sorted steps shifted so the first is zero.
pub fn primvar_times(steps: &[Subframe]) -> Vec<f32> {
    let mut sorted: Vec<f32> = steps.iter().map(|s| s.offset()).collect();
    sorted.sort_by(f32::total_cmp);
    let delta = sorted.first().map_or(0.0, |first| -first);
    sorted.into_iter().map(|t| t + delta).collect()
}

/// Shutter open/close in frames, for the `Ri:Shutter` option.
pub fn shutter_window(shutter_angle: f32, timing: ShutterTiming) -> [f32; 2] {
    let interval = shutter_angle / 360.0;
    match timing {
        ShutterTiming::FrameCenter => [-0.5 * interval, 0.5 * interval],
        ShutterTiming::FrameClose => [-interval, 0.0],
        ShutterTiming::FrameOpen => [0.0, interval],
    }
}

/// Moves the host to sub-frame offsets and puts it back on the original
/// frame, sub-frame 0, when dropped.
pub struct FrameRestore<'a> {
    host: &'a mut dyn HostScene,
    original: i32,
}

impl<'a> FrameRestore<'a> {
    pub fn new(host: &'a mut dyn HostScene) -> Self {
        let original = host.scene().frame_current;
        Self { host, original }
    }

    pub fn original_frame(&self) -> i32 {
        self.original
    }

    /// Evaluate the host at `original + offset`.
    pub fn set_offset(&mut self, offset: Subframe) {
        let time = FrameTime::from_offset(self.original, offset);
        log::trace!(
            "motion step {}: frame {} subframe {:.4}",
            offset,
            time.frame,
            time.subframe
        );
        self.host.frame_set(time.frame, time.subframe);
    }

    pub fn scene(&self) -> &Scene {
        self.host.scene()
    }
}

impl Drop for FrameRestore<'_> {
    fn drop(&mut self) {
        self.host.frame_set(self.original, 0.0);
    }
}
