use glam::Vec3;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::config::{self, ConfigError};

/// Reflectance assigned to non-metallic spheres.
pub const DIELECTRIC_SPECULAR: Vec3 = Vec3::new(0.04, 0.04, 0.04);

#[derive(Debug, Clone, PartialEq)]
pub struct Sphere {
    pub position: Vec3,
    pub radius: f32,
    pub albedo: Vec3,
    pub specular: Vec3,
}

/// Parameters for one generation run. Built fresh per run and read-only
/// afterward.
#[derive(Debug, Clone)]
pub struct SceneConfig {
    pub radius_range: (f32, f32),
    pub max_sphere_count: u32,
    pub placement_radius: f32,
    pub seed: u64,
}

impl SceneConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        config::validate_sphere_options(self.radius_range, self.placement_radius)
    }
}

/// Generate a set of non-overlapping spheres resting on the ground plane,
/// scattered over a disk of `placement_radius`. Deterministic for a fixed
/// seed.
pub fn generate(config: &SceneConfig) -> Result<Vec<Sphere>, ConfigError> {
    config.validate()?;

    let (min_radius, max_radius) = config.radius_range;
    let mut rng = SmallRng::seed_from_u64(config.seed);
    let mut spheres: Vec<Sphere> = Vec::with_capacity(config.max_sphere_count as usize);

    for _ in 0..config.max_sphere_count {
        let radius = rng.gen_range(min_radius..=max_radius);

        // Uniform point in the placement disk via polar sampling; the sphere
        // rests on the ground plane, tangent to it.
        let distance = config.placement_radius * rng.gen::<f32>().sqrt();
        let angle = std::f32::consts::TAU * rng.gen::<f32>();
        let position = Vec3::new(distance * angle.cos(), radius, distance * angle.sin());

        // Acceptance filter: a candidate overlapping an already accepted
        // sphere is dropped, not retried.
        let overlapping = spheres.iter().any(|other| {
            let min_dist = radius + other.radius;
            position.distance_squared(other.position) < min_dist * min_dist
        });
        if overlapping {
            continue;
        }

        let color = Vec3::new(rng.gen(), rng.gen(), rng.gen());
        let metallic = rng.gen_bool(0.5);
        let (albedo, specular) = if metallic {
            (Vec3::ZERO, color)
        } else {
            (color, DIELECTRIC_SPECULAR)
        };

        spheres.push(Sphere {
            position,
            radius,
            albedo,
            specular,
        });
    }

    Ok(spheres)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(seed: u64) -> SceneConfig {
        SceneConfig {
            radius_range: (3.0, 8.0),
            max_sphere_count: 100,
            placement_radius: 100.0,
            seed,
        }
    }

    #[test]
    fn accepted_spheres_never_overlap() {
        for seed in [1u64, 7, 123, 0xdead_beef] {
            let spheres = generate(&test_config(seed)).unwrap();
            for (i, a) in spheres.iter().enumerate() {
                for b in &spheres[i + 1..] {
                    let min_dist = a.radius + b.radius;
                    assert!(
                        a.position.distance_squared(b.position) >= min_dist * min_dist,
                        "overlapping spheres for seed {seed}"
                    );
                }
            }
        }
    }

    #[test]
    fn generation_is_deterministic_for_a_fixed_seed() {
        let config = test_config(123);
        assert_eq!(generate(&config).unwrap(), generate(&config).unwrap());
    }

    #[test]
    fn distinct_seeds_give_distinct_scenes() {
        assert_ne!(
            generate(&test_config(1)).unwrap(),
            generate(&test_config(2)).unwrap()
        );
    }

    #[test]
    fn zero_max_count_yields_an_empty_scene() {
        let config = SceneConfig {
            max_sphere_count: 0,
            ..test_config(123)
        };
        assert!(generate(&config).unwrap().is_empty());
    }

    #[test]
    fn count_never_exceeds_the_requested_maximum() {
        let spheres = generate(&test_config(99)).unwrap();
        assert!(spheres.len() <= 100);
    }

    #[test]
    fn spheres_rest_on_the_ground_inside_the_placement_disk() {
        let config = test_config(7);
        for sphere in generate(&config).unwrap() {
            assert_eq!(sphere.position.y, sphere.radius);
            let horizontal = sphere.position.x.hypot(sphere.position.z);
            assert!(horizontal <= config.placement_radius);
            assert!(sphere.radius >= 3.0 && sphere.radius <= 8.0);
        }
    }

    #[test]
    fn spheres_are_either_metallic_or_dielectric() {
        let spheres = generate(&test_config(123)).unwrap();
        for sphere in &spheres {
            let metallic = sphere.albedo == Vec3::ZERO;
            if metallic {
                assert_ne!(sphere.specular, Vec3::ZERO);
            } else {
                assert_eq!(sphere.specular, DIELECTRIC_SPECULAR);
            }
        }
        // With a hundred candidates the 50/50 split makes both kinds all but
        // certain to appear.
        assert!(spheres.iter().any(|s| s.albedo == Vec3::ZERO));
        assert!(spheres.iter().any(|s| s.specular == DIELECTRIC_SPECULAR));
    }

    #[test]
    fn invalid_configurations_fail_before_producing_spheres() {
        let inverted = SceneConfig {
            radius_range: (8.0, 3.0),
            ..test_config(1)
        };
        assert!(matches!(
            generate(&inverted),
            Err(ConfigError::InvertedRadiusRange { .. })
        ));

        let degenerate = SceneConfig {
            placement_radius: 0.0,
            ..test_config(1)
        };
        assert!(matches!(
            generate(&degenerate),
            Err(ConfigError::NonPositivePlacementRadius(_))
        ));
    }
}
