use thiserror::Error;

/// Upper bound on the reflection bounce count accepted by the kernel.
pub const MAX_REFLECTION_BOUNCE: u32 = 5;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("sphere radius range is inverted: min {min} > max {max}")]
    InvertedRadiusRange { min: f32, max: f32 },
    #[error("sphere radius must be positive, got {0}")]
    NonPositiveRadius(f32),
    #[error("placement radius must be positive, got {0}")]
    NonPositivePlacementRadius(f32),
}

/// Renderer options, fixed before the first scene generation.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub shade_enabled: bool,
    pub reflection_bounce: u32,
    pub use_random_seed: bool,
    pub random_seed: u64,
    pub sphere_radius: (f32, f32),
    pub max_sphere_count: u32,
    pub placement_radius: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            shade_enabled: true,
            reflection_bounce: 3,
            use_random_seed: false,
            random_seed: 123,
            sphere_radius: (3.0, 8.0),
            max_sphere_count: 100,
            placement_radius: 100.0,
        }
    }
}

impl RendererConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_sphere_options(self.sphere_radius, self.placement_radius)
    }

    /// Bounce count clamped to the supported range.
    pub fn bounce(&self) -> u32 {
        self.reflection_bounce.min(MAX_REFLECTION_BOUNCE)
    }

    /// Seed for the scene generation stream: drawn once from entropy when
    /// random-seed mode is selected, the explicit value otherwise.
    pub fn resolve_seed(&self) -> u64 {
        if self.use_random_seed {
            rand::random()
        } else {
            self.random_seed
        }
    }
}

pub(crate) fn validate_sphere_options(
    radius_range: (f32, f32),
    placement_radius: f32,
) -> Result<(), ConfigError> {
    let (min, max) = radius_range;
    // The negated comparisons also reject NaN.
    if !(min > 0.0) {
        return Err(ConfigError::NonPositiveRadius(min));
    }
    if !(max > 0.0) {
        return Err(ConfigError::NonPositiveRadius(max));
    }
    if min > max {
        return Err(ConfigError::InvertedRadiusRange { min, max });
    }
    if !(placement_radius > 0.0) {
        return Err(ConfigError::NonPositivePlacementRadius(placement_radius));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(RendererConfig::default().validate(), Ok(()));
    }

    #[test]
    fn bounce_is_clamped_at_the_boundary() {
        let mut config = RendererConfig::default();
        config.reflection_bounce = 9;
        assert_eq!(config.bounce(), MAX_REFLECTION_BOUNCE);
        config.reflection_bounce = 0;
        assert_eq!(config.bounce(), 0);
        config.reflection_bounce = 5;
        assert_eq!(config.bounce(), 5);
    }

    #[test]
    fn explicit_seed_is_used_when_random_mode_is_off() {
        let config = RendererConfig {
            use_random_seed: false,
            random_seed: 42,
            ..RendererConfig::default()
        };
        assert_eq!(config.resolve_seed(), 42);
    }

    #[test]
    fn inverted_radius_range_is_rejected() {
        let config = RendererConfig {
            sphere_radius: (8.0, 3.0),
            ..RendererConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvertedRadiusRange { min: 8.0, max: 3.0 })
        );
    }

    #[test]
    fn non_positive_options_are_rejected() {
        let config = RendererConfig {
            sphere_radius: (0.0, 3.0),
            ..RendererConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveRadius(0.0)));

        let config = RendererConfig {
            placement_radius: -1.0,
            ..RendererConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositivePlacementRadius(-1.0))
        );
    }
}
