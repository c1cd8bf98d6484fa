use crate::{
    floating_type_mod::{FT, PI},
    V3, VF, VI,
};

/**
 * Cubic spline on q = r / (2h), normalized so that the support radius is 2h.
 */
pub fn cubic_kernel_unnormalized(q: FT) -> FT {
    if q < 0.5 {
        return 6. * (q * q * q - q * q) + 1.;
    } else if q < 1. {
        let v = 1. - q;
        return 2. * (v * v * v);
    } else {
        return 0.;
    }
}

pub fn cubic_kernel_unnormalized_deriv(q: FT) -> FT {
    if q < 0.5 {
        return 18. * q * q - 12. * q;
    } else if q < 1. {
        let v = 1. - q;
        return -6. * v * v;
    } else {
        return 0.;
    };
}

/**
 * r is the distance to the center.
 * h is the smoothing length (support radius is 2h).
 */
pub fn cubic_kernel_2d(r: FT, h: FT) -> FT {
    let norm_factor = 10. / (7. * PI * (h * h));
    return norm_factor * cubic_kernel_unnormalized(r / (2. * h));
}
pub fn cubic_kernel_3d(r: FT, h: FT) -> FT {
    let norm_factor = 1. / (PI * (h * h * h));
    return norm_factor * cubic_kernel_unnormalized(r / (2. * h));
}

/**
 * Radial derivative dW/dr. It is never positive.
 */
pub fn cubic_kernel_2d_dr(r: FT, h: FT) -> FT {
    let norm_factor = 10. / (7. * PI * (h * h));
    return norm_factor * cubic_kernel_unnormalized_deriv(r / (2. * h)) / (2. * h);
}

pub fn cubic_kernel_3d_dr(r: FT, h: FT) -> FT {
    let norm_factor = 1. / (PI * (h * h * h));
    return norm_factor * cubic_kernel_unnormalized_deriv(r / (2. * h)) / (2. * h);
}

#[test]
fn cubic_kernel_2d_integration_test() {
    use crate::vec2f;

    let h = 5.;
    let support_radius = 2.0 * h;
    let grid_size = 200;
    let square_len = 2. * support_radius / grid_size as FT;
    let square_area = square_len * square_len;

    let mut integral = 0.;

    for y in 0..grid_size {
        for x in 0..grid_size {
            let integration_point = vec2f(
                (x as FT + 0.5) * square_len - support_radius,
                (y as FT + 0.5) * square_len - support_radius,
            );
            integral += cubic_kernel_2d(integration_point.norm(), h) * square_area;
        }
    }

    let allow_deviation = 1.00001;
    println!("Integration of 2D cubic kernel with h={:.2}: {}", h, integral);
    assert!(1.0 / allow_deviation <= integral);
    assert!(integral <= allow_deviation / 1.0);
}

#[test]
fn cubic_kernel_radial_derivative_test() {
    let h = 5.;
    let support_radius = 2. * h;
    let test_grid_size = 200;
    let diff = support_radius * 1e-4;

    for k in 1..test_grid_size {
        let r = k as FT * support_radius / test_grid_size as FT;
        let kernels: [(fn(FT, FT) -> FT, fn(FT, FT) -> FT); 2] = [
            (cubic_kernel_2d, cubic_kernel_2d_dr),
            (cubic_kernel_3d, cubic_kernel_3d_dr),
        ];
        for (w, dwdr) in kernels {
            let analytical_deriv = dwdr(r, h);
            let approx_deriv = (w(r + 0.5 * diff, h) - w(r - 0.5 * diff, h)) / diff;
            assert!(analytical_deriv <= 0.);
            assert!(
                (analytical_deriv - approx_deriv).abs() < 1e-4,
                "r={} analytical={} approx={}",
                r,
                analytical_deriv,
                approx_deriv
            );
        }
    }
}

// Sync is needed since we use this trait inside parallel iterators
pub trait DimensionUtils<const D: usize>: Sync {
    fn iterate_grid_neighbors(dist: i32, f: impl FnMut(VI<D>));

    fn kernelh(diff: VF<D>, h: FT) -> FT;

    /// Radial kernel derivative dW/dr at distance r.
    fn kernel_drh(r: FT, h: FT) -> FT;

    fn support_radius_by_smoothing_length() -> FT;

    /// Cross product of two vectors. 2D results only carry a z component.
    fn angular(a: VF<D>, b: VF<D>) -> V3;

    /** Kernel value at zero separation */
    fn w0(h: FT) -> FT {
        Self::kernelh(VF::<D>::zeros(), h)
    }
}

pub enum DimensionUtils2d {}
impl DimensionUtils<2> for DimensionUtils2d {
    fn iterate_grid_neighbors(dist: i32, mut f: impl FnMut(VI<2>)) {
        for y in -dist..=dist {
            for x in -dist..=dist {
                f([x, y].into());
            }
        }
    }

    fn kernelh(diff: VF<2>, h: FT) -> FT {
        cubic_kernel_2d(diff.norm(), h)
    }

    fn kernel_drh(r: FT, h: FT) -> FT {
        cubic_kernel_2d_dr(r, h)
    }

    fn support_radius_by_smoothing_length() -> FT {
        2.
    }

    fn angular(a: VF<2>, b: VF<2>) -> V3 {
        V3::new(0., 0., a.x * b.y - a.y * b.x)
    }
}

pub enum DimensionUtils3d {}
impl DimensionUtils<3> for DimensionUtils3d {
    fn iterate_grid_neighbors(dist: i32, mut f: impl FnMut(VI<3>)) {
        for z in -dist..=dist {
            for y in -dist..=dist {
                for x in -dist..=dist {
                    f([x, y, z].into());
                }
            }
        }
    }

    fn kernelh(diff: VF<3>, h: FT) -> FT {
        cubic_kernel_3d(diff.norm(), h)
    }

    fn kernel_drh(r: FT, h: FT) -> FT {
        cubic_kernel_3d_dr(r, h)
    }

    fn support_radius_by_smoothing_length() -> FT {
        2.
    }

    fn angular(a: VF<3>, b: VF<3>) -> V3 {
        a.cross(&b)
    }
}

/**
 * Kernel sum over an infinite regular lattice with the given spacing,
 * including the self contribution at the origin.
 */
pub fn lattice_number_density<DU: DimensionUtils<D>, const D: usize>(spacing: FT, h: FT) -> FT {
    let support_radius = h * DU::support_radius_by_smoothing_length();
    let dist = FT::ceil(support_radius / spacing) as i32;
    let mut sigma = 0.;
    DU::iterate_grid_neighbors(dist, |v| {
        sigma += DU::kernelh(v.map(|x| x as FT) * spacing, h);
    });
    sigma
}

/** Symmetrized smoothing length of a particle pair */
pub fn smoothing_length(h: &[FT], i: usize, j: usize) -> FT {
    (h[i] + h[j]) * 0.5
}

#[test]
fn test_w0_matches_kernel_at_origin() {
    assert_eq!(<DimensionUtils2d as DimensionUtils<2>>::w0(1.3), cubic_kernel_2d(0., 1.3));
    assert_eq!(<DimensionUtils3d as DimensionUtils<3>>::w0(1.3), cubic_kernel_3d(0., 1.3));
}

#[test]
fn test_lattice_number_density_scales_with_resolution() {
    // refining spacing and smoothing length by the same ratio scales sigma by ratio^D
    let sigma = lattice_number_density::<DimensionUtils2d, 2>(1., 1.3);
    let sigma_fine = lattice_number_density::<DimensionUtils2d, 2>(0.5, 0.65);
    crate::assert_ft_approx_eq(sigma * 4., sigma_fine, 1e-6 * sigma_fine, || {
        "2d lattice sum at half spacing".to_string()
    });

    let sigma = lattice_number_density::<DimensionUtils3d, 3>(1., 1.3);
    let sigma_fine = lattice_number_density::<DimensionUtils3d, 3>(0.5, 0.65);
    crate::assert_ft_approx_eq(sigma * 8., sigma_fine, 1e-6 * sigma_fine, || {
        "3d lattice sum at half spacing".to_string()
    });
}

#[test]
fn test_angular_is_antisymmetric() {
    use crate::{vec2f, vec3f};
    let a = vec2f(1., 2.);
    let b = vec2f(-3., 0.5);
    assert_eq!(DimensionUtils2d::angular(a, b), -DimensionUtils2d::angular(b, a));
    assert_eq!(DimensionUtils2d::angular(a, a), V3::zeros());

    let a = vec3f(1., 0., 0.);
    let b = vec3f(0., 1., 0.);
    assert_eq!(DimensionUtils3d::angular(a, b), vec3f(0., 0., 1.));
}
