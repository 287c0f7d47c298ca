//! A module for stationary correlation models giving the correlated error
//! term of the GP model.
//!
//! The following correlation models are implemented:
//! * squared exponential,
//! * absolute exponential,
//! * matern 3/2,
//! * matern 5/2,
//! * matern with half-integer smoothness nu = p + 1/2 (radial form).
//!
//! All models are evaluated over componentwise distances scaled by `theta`,
//! the vector of inverse correlation length scales, and return correlation
//! values in [0, 1] with r(0) = 1.

use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, Zip};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

/// A trait for using a correlation model in GP prediction
pub trait CorrelationModel<F: Float>: Clone + Copy + Default + fmt::Display + Sync {
    /// Compute correlation values r(x, x') given componentwise distances `d`
    /// between x and x', and inverse length scales `theta`, where:
    /// `d`     : distances (n, nx)
    /// `theta` : inverse length scales (nx,)
    ///
    /// Returns an (n, 1) column of correlation values.
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F>;
}

/// Squared exponential correlation model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct SquaredExponentialCorr();

impl From<SquaredExponentialCorr> for String {
    fn from(_item: SquaredExponentialCorr) -> String {
        "SquaredExponential".to_string()
    }
}

impl TryFrom<String> for SquaredExponentialCorr {
    type Error = &'static str;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s == "SquaredExponential" {
            Ok(Self::default())
        } else {
            Err("Bad string value for SquaredExponentialCorr, should be \'SquaredExponential\'")
        }
    }
}

impl<F: Float> CorrelationModel<F> for SquaredExponentialCorr {
    ///   d
    /// prod exp( - |theta_j * d_j|^2 / 2 )
    ///  j=1
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F> {
        let theta2 = theta.mapv(|v| v * v);
        let r = d.mapv(|v| v * v).dot(&theta2);
        r.mapv(|v| F::exp(F::cast(-0.5) * v))
            .into_shape((d.nrows(), 1))
            .unwrap()
    }
}

impl fmt::Display for SquaredExponentialCorr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SquaredExponential")
    }
}

/// Absolute exponential correlation model
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct AbsoluteExponentialCorr();

impl From<AbsoluteExponentialCorr> for String {
    fn from(_item: AbsoluteExponentialCorr) -> String {
        "AbsoluteExponential".to_string()
    }
}

impl TryFrom<String> for AbsoluteExponentialCorr {
    type Error = &'static str;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s == "AbsoluteExponential" {
            Ok(Self::default())
        } else {
            Err("Bad string value for AbsoluteExponentialCorr, should be \'AbsoluteExponential\'")
        }
    }
}

impl<F: Float> CorrelationModel<F> for AbsoluteExponentialCorr {
    ///   d
    /// prod exp( - theta_j * |d_j| )
    ///  j=1
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F> {
        let r = d.mapv(|v| v.abs()).dot(theta);
        r.mapv(|v| F::exp(-v))
            .into_shape((d.nrows(), 1))
            .unwrap()
    }
}

impl fmt::Display for AbsoluteExponentialCorr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AbsoluteExponential")
    }
}

/// Matern 3/2 correlation model (product form)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct Matern32Corr();

impl From<Matern32Corr> for String {
    fn from(_item: Matern32Corr) -> String {
        "Matern32".to_string()
    }
}

impl TryFrom<String> for Matern32Corr {
    type Error = &'static str;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s == "Matern32" {
            Ok(Self::default())
        } else {
            Err("Bad string value for Matern32Corr, should be \'Matern32\'")
        }
    }
}

impl<F: Float> CorrelationModel<F> for Matern32Corr {
    ///   d
    /// prod (1 + sqrt(3) * theta_j * |d_j|) exp( - sqrt(3) * theta_j * |d_j| )
    ///  j=1
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F> {
        let sqrt3 = F::cast(3.).sqrt();
        let abs_d = d.mapv(|v| v.abs());

        let mut a = Array1::<F>::ones(abs_d.nrows());
        Zip::from(&mut a).and(abs_d.rows()).for_each(|a_i, d_i| {
            *a_i = d_i
                .iter()
                .zip(theta.iter())
                .map(|(d_ij, theta_j)| F::one() + sqrt3 * *theta_j * *d_ij)
                .fold(F::one(), |acc, v| acc * v);
        });

        let b = abs_d.dot(theta).mapv(|v| F::exp(-sqrt3 * v));
        let r = a * b;
        r.into_shape((d.nrows(), 1)).unwrap()
    }
}

impl fmt::Display for Matern32Corr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Matern32")
    }
}

/// Matern 5/2 correlation model (product form)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct Matern52Corr();

impl From<Matern52Corr> for String {
    fn from(_item: Matern52Corr) -> String {
        "Matern52".to_string()
    }
}

impl TryFrom<String> for Matern52Corr {
    type Error = &'static str;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s == "Matern52" {
            Ok(Self::default())
        } else {
            Err("Bad string value for Matern52Corr, should be \'Matern52\'")
        }
    }
}

impl<F: Float> CorrelationModel<F> for Matern52Corr {
    ///   d
    /// prod (1 + sqrt(5) * theta_j * |d_j| + (5/3) * theta_j^2 * d_j^2) exp( - sqrt(5) * theta_j * |d_j| )
    ///  j=1
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F> {
        let sqrt5 = F::cast(5.).sqrt();
        let div5_3 = F::cast(5. / 3.);
        let abs_d = d.mapv(|v| v.abs());

        let mut a = Array1::<F>::ones(abs_d.nrows());
        Zip::from(&mut a).and(abs_d.rows()).for_each(|a_i, d_i| {
            *a_i = d_i
                .iter()
                .zip(theta.iter())
                .map(|(d_ij, theta_j)| {
                    let v = *theta_j * *d_ij;
                    F::one() + sqrt5 * v + div5_3 * v * v
                })
                .fold(F::one(), |acc, v| acc * v);
        });

        let b = abs_d.dot(theta).mapv(|v| F::exp(-sqrt5 * v));
        let r = a * b;
        r.into_shape((d.nrows(), 1)).unwrap()
    }
}

impl fmt::Display for Matern52Corr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Matern52")
    }
}

/// Matern correlation model with half-integer smoothness nu = p + 1/2,
/// evaluated radially over the scaled Euclidean distance.
///
/// For p = 0, 1, 2 this gives the absolute exponential, Matern 3/2 and
/// Matern 5/2 kernels respectively (identical to the product-form models
/// above in one dimension, but isotropic in the scaled space beyond).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct MaternPCorr {
    p: usize,
}

impl MaternPCorr {
    /// Matern correlation with smoothness nu = p + 1/2
    pub fn new(p: usize) -> Self {
        MaternPCorr { p }
    }

    /// Smoothness parameter p
    pub fn p(&self) -> usize {
        self.p
    }
}

impl Default for MaternPCorr {
    fn default() -> Self {
        MaternPCorr { p: 2 }
    }
}

impl From<MaternPCorr> for String {
    fn from(item: MaternPCorr) -> String {
        format!("MaternP({})", item.p)
    }
}

impl TryFrom<String> for MaternPCorr {
    type Error = &'static str;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.strip_prefix("MaternP(")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|digits| digits.parse::<usize>().ok())
            .map(MaternPCorr::new)
            .ok_or("Bad string value for MaternPCorr, should be \'MaternP(<p>)\'")
    }
}

fn factorial(k: usize) -> f64 {
    (1..=k).map(|v| v as f64).product()
}

/// Half-integer Matern correlation at scaled distance `h`:
/// exp(-sqrt(2 nu) h) * p!/(2p)! * sum_{i=0}^{p} (p+i)!/(i!(p-i)!) * (2 sqrt(2 nu) h)^(p-i)
/// with nu = p + 1/2, hence sqrt(2 nu) = sqrt(2p + 1).
fn maternp_value<F: Float>(p: usize, h: F) -> F {
    let c = F::cast(((2 * p + 1) as f64).sqrt());
    let scale = F::cast(factorial(p) / factorial(2 * p));
    let mut poly = F::zero();
    for i in 0..=p {
        let coeff = F::cast(factorial(p + i) / (factorial(i) * factorial(p - i)));
        poly += coeff * (F::cast(2.) * c * h).powi((p - i) as i32);
    }
    F::exp(-c * h) * scale * poly
}

impl<F: Float> CorrelationModel<F> for MaternPCorr {
    /// r(d) = maternp( sqrt( sum_j (theta_j * d_j)^2 ) )
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F> {
        let h = (d.to_owned() * theta)
            .mapv(|v| v * v)
            .sum_axis(Axis(1))
            .mapv(|v| v.sqrt());
        let r = h.mapv(|v| maternp_value(self.p, v));
        r.into_shape((d.nrows(), 1)).unwrap()
    }
}

impl fmt::Display for MaternPCorr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MaternP({})", self.p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::DiffMatrix;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, array};
    use paste::paste;

    #[test]
    fn test_squared_exponential() {
        let xt = array![[4.5], [1.2], [2.0], [3.0], [4.0]];
        let dm = DiffMatrix::new(&xt);
        let res = SquaredExponentialCorr::default().value(&dm.d, &arr1(&[f64::sqrt(0.2)]));
        let expected = array![
            [0.336552878364737],
            [0.5352614285189903],
            [0.7985162187593771],
            [0.9753099120283326],
            [0.9380049995307295],
            [0.7232502423798424],
            [0.4565760496233148],
            [0.9048374180359595],
            [0.6703200460356393],
            [0.9048374180359595]
        ];
        assert_abs_diff_eq!(res, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_squared_exponential_2d() {
        let xt = array![[0., 1.], [2., 3.], [4., 5.]];
        let dm = DiffMatrix::new(&xt);
        let res = SquaredExponentialCorr::default().value(&dm.d, &arr1(&[f64::sqrt(2.), 2.]));
        let expected = array![[6.14421235e-06], [1.42516408e-21], [6.14421235e-06]];
        assert_abs_diff_eq!(res, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_matern32_2d() {
        let xt = array![[0., 1.], [2., 3.], [4., 5.]];
        let dm = DiffMatrix::new(&xt);
        let res = Matern32Corr::default().value(&dm.d, &arr1(&[1., 2.]));
        let expected = array![[1.08539595e-03], [1.10776401e-07], [1.08539595e-03]];
        assert_abs_diff_eq!(res, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_matern52_2d() {
        let xt = array![[0., 1.], [2., 3.], [4., 5.]];
        let dm = DiffMatrix::new(&xt);
        let res = Matern52Corr::default().value(&dm.d, &arr1(&[1., 2.]));
        let expected = array![[6.62391590e-04], [1.02117882e-08], [6.62391590e-04]];
        assert_abs_diff_eq!(res, expected, epsilon = 1e-6);
    }

    macro_rules! test_correlation_at_zero {
        ($corr:ident) => {
            paste! {
                #[test]
                fn [<test_corr_ $corr:lower _at_zero>]() {
                    let d = array![[0., 0.]];
                    let r = [<$corr Corr>]::default().value(&d, &arr1(&[0.7, 1.3]));
                    assert_abs_diff_eq!(r[[0, 0]], 1., epsilon = 1e-12);
                }
            }
        };
    }

    test_correlation_at_zero!(SquaredExponential);
    test_correlation_at_zero!(AbsoluteExponential);
    test_correlation_at_zero!(Matern32);
    test_correlation_at_zero!(Matern52);
    test_correlation_at_zero!(MaternP);

    #[test]
    fn test_maternp_matches_named_kernels_1d() {
        let d = array![[0.1], [0.5], [1.3], [2.7]];
        let theta = arr1(&[1. / 0.7]);

        let p0 = MaternPCorr::new(0).value(&d, &theta);
        let absexp = AbsoluteExponentialCorr::default().value(&d, &theta);
        assert_abs_diff_eq!(p0, absexp, epsilon = 1e-12);

        let p1 = MaternPCorr::new(1).value(&d, &theta);
        let m32 = Matern32Corr::default().value(&d, &theta);
        assert_abs_diff_eq!(p1, m32, epsilon = 1e-12);

        let p2 = MaternPCorr::new(2).value(&d, &theta);
        let m52 = Matern52Corr::default().value(&d, &theta);
        assert_abs_diff_eq!(p2, m52, epsilon = 1e-12);
    }

    #[test]
    fn test_maternp_decreasing_with_distance() {
        let d = array![[0.], [0.5], [1.], [2.], [4.]];
        let r = MaternPCorr::default().value(&d, &arr1(&[1.]));
        for i in 1..r.nrows() {
            assert!(r[[i, 0]] < r[[i - 1, 0]]);
        }
    }

    #[test]
    fn test_maternp_string_roundtrip() {
        let corr = MaternPCorr::new(3);
        let s = String::from(corr);
        assert_eq!("MaternP(3)", s);
        assert_eq!(corr, MaternPCorr::try_from(s).unwrap());
    }
}
