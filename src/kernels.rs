//! Green's function kernel evaluators.
//!
//! The three dimensional Laplace and Helmholtz kernels delegate to the
//! `green_kernels` crate. Their two dimensional counterparts, the
//! logarithmic kernel and the Hankel function kernel, are evaluated
//! here directly. All evaluators additionally provide the target
//! gradient of the source-normal derivative, which the gradient of a
//! double layer potential needs and the kernel crate does not tabulate.

use crate::traits::KernelEvaluator;
use crate::types::{BridgeError, BridgeResult, RealScalar};
use green_kernels::{
    helmholtz_3d::Helmholtz3dKernel, laplace_3d::Laplace3dKernel, traits::Kernel,
    types::GreenKernelEvalType,
};
use num::One;
use rlst::{MatrixInverse, RlstScalar};
use spec_math::Bessel;

fn cast<R: RealScalar>(x: f64) -> R {
    num::cast::<f64, R>(x).unwrap()
}

/// Distance vector, distance and normal projection for one point pair.
fn pair_geometry<R: RealScalar>(
    dim: usize,
    source: &[R],
    target: &[R],
    normal: Option<&[R]>,
) -> ([R; 3], R, R) {
    let mut d = [R::zero(); 3];
    let mut r2 = R::zero();
    let mut dn = R::zero();
    for j in 0..dim {
        d[j] = target[j] - source[j];
        r2 = r2 + d[j] * d[j];
        if let Some(n) = normal {
            dn = dn + d[j] * n[j];
        }
    }
    (d, num::Float::sqrt(r2), dn)
}

/// Assemble the target gradient of `dG/dn_source` from the first and
/// second radial derivatives of the kernel.
fn normal_gradient_from_radial<T: RlstScalar>(
    dim: usize,
    gp: T,
    gpp: T,
    d: &[T::Real],
    r: T::Real,
    dn: T::Real,
    normal: &[T::Real],
    result: &mut [T],
) where
    T::Real: RealScalar,
{
    let r2 = r * r;
    let r3 = r2 * r;
    for j in 0..dim {
        let first = d[j] * dn / r2;
        let second = normal[j] / r - dn * d[j] / r3;
        result[j] = -(gpp * T::from_real(first) + gp * T::from_real(second));
    }
}

/// Three dimensional Laplace kernel `1 / (4 pi r)`.
pub struct Laplace3dEvaluator<T: RlstScalar> {
    kernel: Laplace3dKernel<T>,
}

impl<T: RlstScalar> Laplace3dEvaluator<T> {
    /// Create a new evaluator.
    pub fn new() -> Self {
        Self {
            kernel: Laplace3dKernel::<T>::new(),
        }
    }
}

impl<T: RlstScalar> Default for Laplace3dEvaluator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: RlstScalar> KernelEvaluator for Laplace3dEvaluator<T>
where
    T::Real: RealScalar,
{
    type T = T;

    fn space_dimension(&self) -> usize {
        3
    }

    fn assemble_st(&self, sources: &[T::Real], targets: &[T::Real], result: &mut [T]) {
        self.kernel
            .assemble_st(GreenKernelEvalType::ValueDeriv, sources, targets, result);
    }

    fn normal_target_gradient(
        &self,
        source: &[T::Real],
        normal: &[T::Real],
        target: &[T::Real],
        result: &mut [T],
    ) {
        let (d, r, dn) = pair_geometry(3, source, target, Some(normal));
        let four_pi = cast::<T::Real>(4.0 * std::f64::consts::PI);
        // G' = -1 / (4 pi r^2), G'' = 1 / (2 pi r^3)
        let gp = T::from_real(-T::Real::one() / (four_pi * r * r));
        let gpp = T::from_real(cast::<T::Real>(2.0) / (four_pi * r * r * r));
        normal_gradient_from_radial(3, gp, gpp, &d, r, dn, normal, result);
    }
}

/// Three dimensional Helmholtz kernel `exp(ikr) / (4 pi r)`.
pub struct Helmholtz3dEvaluator<T: RlstScalar<Complex = T>> {
    kernel: Helmholtz3dKernel<T>,
    wavenumber: T::Real,
}

impl<T: RlstScalar<Complex = T>> Helmholtz3dEvaluator<T> {
    /// Create a new evaluator for a wavenumber.
    pub fn new(wavenumber: T::Real) -> Self {
        Self {
            kernel: Helmholtz3dKernel::<T>::new(wavenumber),
            wavenumber,
        }
    }
}

impl<T: RlstScalar<Complex = T>> KernelEvaluator for Helmholtz3dEvaluator<T>
where
    T::Real: RealScalar,
{
    type T = T;

    fn space_dimension(&self) -> usize {
        3
    }

    fn assemble_st(&self, sources: &[T::Real], targets: &[T::Real], result: &mut [T]) {
        self.kernel
            .assemble_st(GreenKernelEvalType::ValueDeriv, sources, targets, result);
    }

    fn normal_target_gradient(
        &self,
        source: &[T::Real],
        normal: &[T::Real],
        target: &[T::Real],
        result: &mut [T],
    ) {
        let (d, r, dn) = pair_geometry(3, source, target, Some(normal));
        let kr = self.wavenumber * r;
        let four_pi_r = cast::<T::Real>(4.0 * std::f64::consts::PI) * r;
        let g = T::complex(kr.cos() / four_pi_r, kr.sin() / four_pi_r);
        // ik - 1/r
        let factor = T::complex(-T::Real::one() / r, self.wavenumber);
        let gp = factor * g;
        let gpp = (factor * factor + T::from_real(T::Real::one() / (r * r))) * g;
        normal_gradient_from_radial(3, gp, gpp, &d, r, dn, normal, result);
    }
}

/// Two dimensional Laplace kernel `-ln(r) / (2 pi)`.
pub struct Laplace2dEvaluator<T: RlstScalar> {
    _t: std::marker::PhantomData<T>,
}

impl<T: RlstScalar> Laplace2dEvaluator<T> {
    /// Create a new evaluator.
    pub fn new() -> Self {
        Self {
            _t: std::marker::PhantomData,
        }
    }
}

impl<T: RlstScalar> Default for Laplace2dEvaluator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: RlstScalar> KernelEvaluator for Laplace2dEvaluator<T>
where
    T::Real: RealScalar,
{
    type T = T;

    fn space_dimension(&self) -> usize {
        2
    }

    fn assemble_st(&self, sources: &[T::Real], targets: &[T::Real], result: &mut [T]) {
        let nsources = sources.len() / 2;
        let ntargets = targets.len() / 2;
        let two_pi = cast::<T::Real>(2.0 * std::f64::consts::PI);
        for j in 0..ntargets {
            let target = &targets[2 * j..2 * j + 2];
            for s in 0..nsources {
                let (d, r, _) = pair_geometry(2, &sources[2 * s..2 * s + 2], target, None);
                let offset = (j * nsources + s) * 3;
                result[offset] = T::from_real(-r.ln() / two_pi);
                // G' d / r with G' = -1 / (2 pi r)
                let scale = -T::Real::one() / (two_pi * r * r);
                result[offset + 1] = T::from_real(d[0] * scale);
                result[offset + 2] = T::from_real(d[1] * scale);
            }
        }
    }

    fn normal_target_gradient(
        &self,
        source: &[T::Real],
        normal: &[T::Real],
        target: &[T::Real],
        result: &mut [T],
    ) {
        let (d, r, dn) = pair_geometry(2, source, target, Some(normal));
        let two_pi = cast::<T::Real>(2.0 * std::f64::consts::PI);
        let gp = T::from_real(-T::Real::one() / (two_pi * r));
        let gpp = T::from_real(T::Real::one() / (two_pi * r * r));
        normal_gradient_from_radial(2, gp, gpp, &d, r, dn, normal, result);
    }
}

/// Two dimensional Helmholtz kernel `(i/4) H0(kr)` with the Hankel
/// function of the first kind.
pub struct Helmholtz2dEvaluator<T: RlstScalar<Complex = T>> {
    wavenumber: T::Real,
}

impl<T: RlstScalar<Complex = T>> Helmholtz2dEvaluator<T> {
    /// Create a new evaluator for a wavenumber.
    pub fn new(wavenumber: T::Real) -> Self {
        Self { wavenumber }
    }

    /// Hankel functions H0 and H1 of the first kind at a real argument,
    /// as (re, im) pairs.
    fn hankel(z: T::Real) -> ((T::Real, T::Real), (T::Real, T::Real))
    where
        T::Real: RealScalar,
    {
        let z_machine = num::cast::<T::Real, f64>(z).unwrap();
        let h0 = (z_machine.bessel_jv(0.0), z_machine.bessel_yv(0.0));
        let h1 = (z_machine.bessel_jv(1.0), z_machine.bessel_yv(1.0));
        (
            (cast(h0.0), cast(h0.1)),
            (cast(h1.0), cast(h1.1)),
        )
    }

    /// First and second radial derivatives of the kernel at distance r.
    fn radial_derivatives(&self, r: T::Real) -> (T, T, T)
    where
        T::Real: RealScalar,
    {
        let k = self.wavenumber;
        let kr = k * r;
        let ((h0re, h0im), (h1re, h1im)) = Self::hankel(kr);
        let quarter = cast::<T::Real>(0.25);
        // G = (i/4) H0(kr)
        let g = T::complex(-quarter * h0im, quarter * h0re);
        // G' = -(ik/4) H1(kr)
        let gp = T::complex(quarter * k * h1im, -quarter * k * h1re);
        // G'' = -(i k^2 / 4) (H0(kr) - H1(kr) / (kr))
        let dre = h0re - h1re / kr;
        let dim = h0im - h1im / kr;
        let k2q = quarter * k * k;
        let gpp = T::complex(k2q * dim, -(k2q * dre));
        (g, gp, gpp)
    }
}

impl<T: RlstScalar<Complex = T>> KernelEvaluator for Helmholtz2dEvaluator<T>
where
    T::Real: RealScalar,
{
    type T = T;

    fn space_dimension(&self) -> usize {
        2
    }

    fn assemble_st(&self, sources: &[T::Real], targets: &[T::Real], result: &mut [T]) {
        let nsources = sources.len() / 2;
        let ntargets = targets.len() / 2;
        for j in 0..ntargets {
            let target = &targets[2 * j..2 * j + 2];
            for s in 0..nsources {
                let (d, r, _) = pair_geometry(2, &sources[2 * s..2 * s + 2], target, None);
                let (g, gp, _) = self.radial_derivatives(r);
                let offset = (j * nsources + s) * 3;
                result[offset] = g;
                result[offset + 1] = gp * T::from_real(d[0] / r);
                result[offset + 2] = gp * T::from_real(d[1] / r);
            }
        }
    }

    fn normal_target_gradient(
        &self,
        source: &[T::Real],
        normal: &[T::Real],
        target: &[T::Real],
        result: &mut [T],
    ) {
        let (d, r, dn) = pair_geometry(2, source, target, Some(normal));
        let (_, gp, gpp) = self.radial_derivatives(r);
        normal_gradient_from_radial(2, gp, gpp, &d, r, dn, normal, result);
    }
}

/// Scalar types that kernel evaluators can be instantiated for.
///
/// The Helmholtz kernels are complex valued, so requesting one for a
/// real scalar type fails at binding time rather than at compile time.
pub trait KernelScalar: RlstScalar + MatrixInverse
where
    Self::Real: RealScalar,
{
    /// A Laplace kernel evaluator in the given ambient dimension.
    fn laplace_kernel(dim: usize) -> BridgeResult<Box<dyn KernelEvaluator<T = Self>>>;

    /// A Helmholtz kernel evaluator in the given ambient dimension.
    fn helmholtz_kernel(
        dim: usize,
        wavenumber: Self::Real,
    ) -> BridgeResult<Box<dyn KernelEvaluator<T = Self>>>;
}

fn laplace_kernel_impl<T: RlstScalar + 'static>(
    dim: usize,
) -> BridgeResult<Box<dyn KernelEvaluator<T = T>>>
where
    T::Real: RealScalar,
{
    match dim {
        2 => Ok(Box::new(Laplace2dEvaluator::<T>::new())),
        3 => Ok(Box::new(Laplace3dEvaluator::<T>::new())),
        _ => Err(BridgeError::Validation(format!(
            "No Laplace kernel in dimension {dim}"
        ))),
    }
}

impl KernelScalar for f64 {
    fn laplace_kernel(dim: usize) -> BridgeResult<Box<dyn KernelEvaluator<T = Self>>> {
        laplace_kernel_impl::<f64>(dim)
    }

    fn helmholtz_kernel(
        _dim: usize,
        _wavenumber: f64,
    ) -> BridgeResult<Box<dyn KernelEvaluator<T = Self>>> {
        Err(BridgeError::Binding(
            "The Helmholtz kernel requires a complex scalar type".to_string(),
        ))
    }
}

impl KernelScalar for rlst::c64 {
    fn laplace_kernel(dim: usize) -> BridgeResult<Box<dyn KernelEvaluator<T = Self>>> {
        laplace_kernel_impl::<rlst::c64>(dim)
    }

    fn helmholtz_kernel(
        dim: usize,
        wavenumber: f64,
    ) -> BridgeResult<Box<dyn KernelEvaluator<T = Self>>> {
        match dim {
            2 => Ok(Box::new(Helmholtz2dEvaluator::<rlst::c64>::new(wavenumber))),
            3 => Ok(Box::new(Helmholtz3dEvaluator::<rlst::c64>::new(wavenumber))),
            _ => Err(BridgeError::Validation(format!(
                "No Helmholtz kernel in dimension {dim}"
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use rlst::c64;

    #[test]
    fn test_laplace3d_value() {
        let kernel = Laplace3dEvaluator::<f64>::new();
        let sources = [0.0, 0.0, 0.0];
        let targets = [2.0, 0.0, 0.0];
        let mut result = [0.0; 4];
        kernel.assemble_st(&sources, &targets, &mut result);
        assert_relative_eq!(
            result[0],
            1.0 / (8.0 * std::f64::consts::PI),
            epsilon = 1e-13
        );
        // d/dx of 1/(4 pi r) at distance 2 along x
        assert_relative_eq!(
            result[1],
            -1.0 / (16.0 * std::f64::consts::PI),
            epsilon = 1e-13
        );
    }

    #[test]
    fn test_laplace2d_value() {
        let kernel = Laplace2dEvaluator::<f64>::new();
        let sources = [0.0, 0.0];
        let targets = [std::f64::consts::E, 0.0];
        let mut result = [0.0; 3];
        kernel.assemble_st(&sources, &targets, &mut result);
        assert_relative_eq!(
            result[0],
            -1.0 / (2.0 * std::f64::consts::PI),
            epsilon = 1e-13
        );
    }

    #[test]
    fn test_helmholtz3d_value() {
        let kernel = Helmholtz3dEvaluator::<c64>::new(1.5);
        let sources = [0.0, 0.0, 0.0];
        let targets = [0.0, 2.0, 0.0];
        let mut result = [c64::new(0.0, 0.0); 4];
        kernel.assemble_st(&sources, &targets, &mut result);
        let scale = 1.0 / (8.0 * std::f64::consts::PI);
        assert_relative_eq!(result[0].re, 3.0_f64.cos() * scale, epsilon = 1e-12);
        assert_relative_eq!(result[0].im, 3.0_f64.sin() * scale, epsilon = 1e-12);
    }

    #[test]
    fn test_helmholtz2d_value() {
        // At kr = 1: J0 = 0.76519768655796655, Y0 = 0.08825696421567700
        let kernel = Helmholtz2dEvaluator::<c64>::new(1.0);
        let sources = [0.0, 0.0];
        let targets = [1.0, 0.0];
        let mut result = [c64::new(0.0, 0.0); 3];
        kernel.assemble_st(&sources, &targets, &mut result);
        assert_relative_eq!(result[0].re, -0.25 * 0.088256964215677, epsilon = 1e-10);
        assert_relative_eq!(result[0].im, 0.25 * 0.765197686557967, epsilon = 1e-10);
    }

    // Finite difference reference for the target gradient of dG/dn_src
    fn fd_normal_gradient<K: KernelEvaluator>(
        kernel: &K,
        source: &[<K::T as RlstScalar>::Real],
        normal: &[<K::T as RlstScalar>::Real],
        target: &[f64],
        h: f64,
    ) -> Vec<K::T>
    where
        K::T: RlstScalar<Real = f64>,
    {
        let dim = kernel.space_dimension();
        let dsize = dim + 1;
        let dn_at = |t: &[f64]| {
            let mut table = vec![K::T::zero(); dsize];
            kernel.assemble_st(source, t, &mut table);
            let mut dn = K::T::zero();
            for d in 0..dim {
                dn -= table[1 + d] * <K::T as RlstScalar>::from_real(normal[d]);
            }
            dn
        };
        (0..dim)
            .map(|j| {
                let mut plus = target.to_vec();
                plus[j] += h;
                let mut minus = target.to_vec();
                minus[j] -= h;
                (dn_at(&plus) - dn_at(&minus))
                    / <K::T as RlstScalar>::from_real(2.0 * h)
            })
            .collect()
    }

    fn check_normal_gradient<K: KernelEvaluator>(kernel: &K, source: &[f64], target: &[f64])
    where
        K::T: RlstScalar<Real = f64>,
    {
        let dim = kernel.space_dimension();
        let raw = [0.3, -0.5, 0.8];
        let norm: f64 = raw[..dim].iter().map(|x| x * x).sum::<f64>().sqrt();
        let normal: Vec<f64> = raw[..dim].iter().map(|x| x / norm).collect();
        let mut exact = vec![K::T::zero(); dim];
        kernel.normal_target_gradient(source, &normal, target, &mut exact);
        let approximate = fd_normal_gradient(kernel, source, &normal, target, 1e-5);
        for (a, b) in exact.iter().zip(&approximate) {
            assert!((*a - *b).abs() < 1e-6, "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn test_normal_gradients_match_finite_differences() {
        let source3 = [0.1, 0.2, -0.3];
        let target3 = [1.1, -0.7, 0.9];
        check_normal_gradient(&Laplace3dEvaluator::<f64>::new(), &source3, &target3);
        check_normal_gradient(&Helmholtz3dEvaluator::<c64>::new(1.7), &source3, &target3);
        let source2 = [0.1, 0.2];
        let target2 = [1.3, -0.8];
        check_normal_gradient(&Laplace2dEvaluator::<f64>::new(), &source2, &target2);
        check_normal_gradient(&Helmholtz2dEvaluator::<c64>::new(1.7), &source2, &target2);
    }

    #[test]
    fn test_helmholtz_needs_complex_scalar() {
        assert!(<f64 as KernelScalar>::helmholtz_kernel(2, 1.0).is_err());
        assert!(<c64 as KernelScalar>::helmholtz_kernel(2, 1.0).is_ok());
        assert!(<f64 as KernelScalar>::laplace_kernel(3).is_ok());
    }
}
