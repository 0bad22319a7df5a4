/// Normalized supercurrent `(1 - f) sin(phi) + f sin(phi / 2)`.
///
/// `fraction_4pi = 0` is the ordinary 2pi-periodic relation, `fraction_4pi = 1`
/// the 4pi-periodic one. Stateless; evaluated twice per integration step.
#[inline(always)]
pub fn junction_current(phase: f64, fraction_4pi: f64) -> f64 {
    (1.0 - fraction_4pi) * phase.sin() + fraction_4pi * (0.5 * phase).sin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    #[test]
    fn pure_2pi_is_sine() {
        for &phi in &[-3.0, -0.4, 0.0, 0.7, 2.5, 11.0] {
            assert_eq!(junction_current(phi, 0.0), phi.sin());
        }
    }

    #[test]
    fn pure_4pi_is_half_angle_sine() {
        for &phi in &[-3.0, -0.4, 0.0, 0.7, 2.5, 11.0] {
            assert_eq!(junction_current(phi, 1.0), (0.5 * phi).sin());
        }
    }

    #[test]
    fn regimes_differ_at_pi() {
        assert_abs_diff_eq!(junction_current(PI, 0.0), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(junction_current(PI, 1.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(junction_current(2.0 * PI, 0.0), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(junction_current(2.0 * PI, 1.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn period_doubles_at_full_4pi_fraction() {
        let phi = 0.9;
        assert_abs_diff_eq!(junction_current(phi + 4.0 * PI, 1.0), junction_current(phi, 1.0), epsilon = 1e-12);
        assert_abs_diff_eq!(junction_current(phi + 2.0 * PI, 1.0), -junction_current(phi, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn blend_is_linear_in_fraction() {
        let phi = 1.3;
        let mixed = junction_current(phi, 0.25);
        assert_abs_diff_eq!(mixed, 0.75 * phi.sin() + 0.25 * (0.5 * phi).sin(), epsilon = 1e-15);
    }
}
