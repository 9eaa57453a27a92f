use glam::{Mat4, Quat, Vec3};

/// Observable inputs the renderer consumes each frame. Anything in here that
/// changes makes the accumulated image stale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    pub camera_to_world: Mat4,
    pub inverse_projection: Mat4,
    pub field_of_view: f32,
    pub shade_enabled: bool,
    pub bounce_count: u32,
    pub light_direction: Vec3,
    pub light_intensity: f32,
}

/// Last-observed values of the watched inputs. The camera transform is kept
/// as position plus orientation so a pure scale/shear wobble in the matrix
/// cannot alias a real move.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Snapshot {
    camera_position: Vec3,
    camera_orientation: Quat,
    light_direction: Vec3,
    light_intensity: f32,
    field_of_view: f32,
    shade_enabled: bool,
    bounce_count: u32,
}

impl Snapshot {
    fn capture(inputs: &FrameInputs) -> Self {
        let (_, orientation, position) = inputs.camera_to_world.to_scale_rotation_translation();
        Self {
            camera_position: position,
            camera_orientation: orientation,
            light_direction: inputs.light_direction,
            light_intensity: inputs.light_intensity,
            field_of_view: inputs.field_of_view,
            shade_enabled: inputs.shade_enabled,
            bounce_count: inputs.bounce_count,
        }
    }
}

/// Signals exactly when a watched input differs from its value at the last
/// check. Every comparison refreshes the whole stored snapshot, so a frame
/// is always measured against the most recently checked state.
///
/// Scene regeneration is invalidated at generation time and deliberately not
/// watched here.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: Option<Snapshot>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when any watched input differs from the previous observation.
    /// The first observation seeds the snapshot without signalling.
    pub fn should_reset(&mut self, inputs: &FrameInputs) -> bool {
        let current = Snapshot::capture(inputs);
        let changed = match &self.last {
            Some(last) => *last != current,
            None => false,
        };
        self.last = Some(current);
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> FrameInputs {
        FrameInputs {
            camera_to_world: Mat4::IDENTITY,
            inverse_projection: Mat4::IDENTITY,
            field_of_view: 60.0,
            shade_enabled: true,
            bounce_count: 2,
            light_direction: Vec3::new(0.0, -1.0, 0.0),
            light_intensity: 1.0,
        }
    }

    #[test]
    fn first_observation_does_not_reset() {
        let mut detector = ChangeDetector::new();
        assert!(!detector.should_reset(&inputs()));
        assert!(!detector.should_reset(&inputs()));
    }

    #[test]
    fn field_of_view_change_resets_exactly_once() {
        let mut detector = ChangeDetector::new();
        let mut frame = inputs();
        detector.should_reset(&frame);

        frame.field_of_view = 45.0;
        assert!(detector.should_reset(&frame));
        assert!(!detector.should_reset(&frame));
    }

    #[test]
    fn camera_translation_resets() {
        let mut detector = ChangeDetector::new();
        let mut frame = inputs();
        detector.should_reset(&frame);

        frame.camera_to_world = Mat4::from_translation(Vec3::new(0.0, 0.0, 1.0));
        assert!(detector.should_reset(&frame));
        assert!(!detector.should_reset(&frame));
    }

    #[test]
    fn camera_rotation_resets() {
        let mut detector = ChangeDetector::new();
        let mut frame = inputs();
        detector.should_reset(&frame);

        frame.camera_to_world = Mat4::from_rotation_y(0.3);
        assert!(detector.should_reset(&frame));
        assert!(!detector.should_reset(&frame));
    }

    #[test]
    fn every_scalar_input_is_watched() {
        let mut detector = ChangeDetector::new();
        let mut frame = inputs();
        detector.should_reset(&frame);

        frame.shade_enabled = false;
        assert!(detector.should_reset(&frame));

        frame.bounce_count = 5;
        assert!(detector.should_reset(&frame));

        frame.light_direction = Vec3::new(0.5, -0.5, 0.0);
        assert!(detector.should_reset(&frame));

        frame.light_intensity = 2.0;
        assert!(detector.should_reset(&frame));

        assert!(!detector.should_reset(&frame));
    }

    #[test]
    fn simultaneous_changes_reset_once_then_go_quiet() {
        let mut detector = ChangeDetector::new();
        let mut frame = inputs();
        detector.should_reset(&frame);

        // Two inputs change in the same frame; the unchanged entries must be
        // refreshed too, so the following frame compares clean.
        frame.field_of_view = 45.0;
        frame.light_intensity = 3.0;
        assert!(detector.should_reset(&frame));
        assert!(!detector.should_reset(&frame));
    }

    #[test]
    fn projection_matrix_itself_is_not_watched() {
        // The inverse projection is derived state pushed to the kernel; the
        // watched scalar is the field of view it was built from.
        let mut detector = ChangeDetector::new();
        let mut frame = inputs();
        detector.should_reset(&frame);

        frame.inverse_projection = Mat4::from_scale(Vec3::new(2.0, 2.0, 1.0));
        assert!(!detector.should_reset(&frame));
    }
}
