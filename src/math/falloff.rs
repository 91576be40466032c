use glamx::Vec3;

/// Quadratic attenuation coefficients: `k0 + k1·d + k2·d²`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Falloff {
    /// Constant term.
    pub constant: f32,
    /// Linear term.
    pub linear: f32,
    /// Quadratic term.
    pub quadratic: f32,
}

impl Default for Falloff {
    fn default() -> Self {
        Falloff {
            constant: 1.0,
            linear: 0.0,
            quadratic: 0.0,
        }
    }
}

impl Falloff {
    /// Creates a new set of attenuation coefficients.
    pub fn new(constant: f32, linear: f32, quadratic: f32) -> Self {
        Falloff {
            constant,
            linear,
            quadratic,
        }
    }

    /// Coefficients imported from a scene file, where the constant term defaults to one and
    /// the linear and quadratic terms are given per unit of diameter.
    pub fn from_imported(constant: f32, linear: f32, quadratic: f32) -> Self {
        Falloff {
            constant: if constant == 0.0 { 1.0 } else { constant },
            linear: linear * 0.5,
            quadratic: quadratic * 0.5,
        }
    }

    /// The attenuation divisor at distance `d`.
    pub fn attenuation(&self, d: f32) -> f32 {
        self.constant + self.linear * d + self.quadratic * d * d
    }

    pub(crate) fn to_array(self) -> [f32; 3] {
        [self.constant, self.linear, self.quadratic]
    }
}

impl From<Vec3> for Falloff {
    fn from(v: Vec3) -> Self {
        Falloff::new(v.x, v.y, v.z)
    }
}

/// Distance at which the attenuation divisor reaches `threshold`.
///
/// Returns `None` when the light never fades out (`k1 = k2 = 0`) or when the quadratic has no
/// real root; callers substitute their own far plane. A light already below the threshold at
/// its origin yields `Some(0.0)`.
pub fn falloff_distance(falloff: &Falloff, threshold: f32) -> Option<f32> {
    let Falloff {
        constant: k0,
        linear: k1,
        quadratic: k2,
    } = *falloff;

    let distance = if k2 != 0.0 {
        let discriminant = k1 * k1 - 4.0 * k2 * (k0 - threshold);
        if discriminant < 0.0 {
            return None;
        }
        (-k1 + discriminant.sqrt()) / (2.0 * k2)
    } else if k1 != 0.0 {
        (threshold - k0) / k1
    } else {
        return None;
    };

    if distance.is_finite() {
        Some(distance.max(0.0))
    } else {
        None
    }
}

/// [`falloff_distance`] clamped to `limit`, with unbounded lights mapped to `limit`.
pub fn clamped_falloff_distance(falloff: &Falloff, threshold: f32, limit: f32) -> f32 {
    falloff_distance(falloff, threshold).map_or(limit, |d| d.min(limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn constant_light_is_unbounded() {
        let falloff = Falloff::new(1.0, 0.0, 0.0);
        assert_eq!(falloff_distance(&falloff, 256.0), None);
        assert_eq!(clamped_falloff_distance(&falloff, 256.0, 100.0), 100.0);
    }

    #[test]
    fn quadratic_light_uses_positive_root() {
        let falloff = Falloff::new(1.0, 0.5, 0.25);
        let d = falloff_distance(&falloff, 256.0).unwrap();
        assert!(d > 0.0);
        assert_relative_eq!(falloff.attenuation(d), 256.0, max_relative = 1.0e-4);

        let expected = (-0.5 + (0.25f32 - 4.0 * 0.25 * (1.0 - 256.0)).sqrt()) / 0.5;
        assert_relative_eq!(d, expected, max_relative = 1.0e-6);
    }

    #[test]
    fn linear_light_is_solved_linearly() {
        let falloff = Falloff::new(16.0, 2.0, 0.0);
        assert_relative_eq!(falloff_distance(&falloff, 256.0).unwrap(), 120.0);
    }

    #[test]
    fn clamped_distance_never_exceeds_the_limit() {
        let far = 100.0;
        let dim = Falloff::new(1.0, 0.0, 0.0001);
        assert!(falloff_distance(&dim, 256.0).unwrap() > far * 1.5);
        assert_eq!(clamped_falloff_distance(&dim, 256.0, far), far);
        assert_eq!(clamped_falloff_distance(&dim, 256.0, far * 1.5), far * 1.5);

        let bright = Falloff::new(1.0, 0.0, 1.0);
        assert!(clamped_falloff_distance(&bright, 256.0, far) < far);
    }

    #[test]
    fn light_below_threshold_at_origin_has_zero_reach() {
        let falloff = Falloff::new(300.0, 1.0, 0.0);
        assert_eq!(falloff_distance(&falloff, 256.0), Some(0.0));
    }

    #[test]
    fn imported_coefficients_are_halved() {
        let falloff = Falloff::from_imported(0.0, 0.2, 0.04);
        assert_eq!(falloff, Falloff::new(1.0, 0.1, 0.02));
    }
}
