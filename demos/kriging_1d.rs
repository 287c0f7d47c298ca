//! GP interpolation in 1D with noiseless data.
//!
//! Ordinary kriging of the two-bumps test function: a Matern covariance
//! with known, fixed parameters and an unknown constant mean estimated
//! jointly with the prediction. The kriging predictor interpolates the data.

use gpkrig::Kriging;
use linfa::prelude::*;
use ndarray::{Array, Array1, Array2, Axis, arr1};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand::seq::index::sample;
use rand_xoshiro::Xoshiro256Plus;

/// Two-bumps test function over [-1, 1]
fn two_bumps(x: &Array2<f64>) -> Array1<f64> {
    x.mapv(|v| -(0.8 * v + (5. * v + 1.).sin() + 0.1 * (10. * v).sin()))
        .remove_axis(Axis(1))
}

fn main() {
    // dense target grid and test function values
    let nt = 200;
    let xt = Array::linspace(-1., 1., nt).insert_axis(Axis(1));
    let zt = two_bumps(&xt);

    // observation dataset: a handful of points picked from the grid
    let ni = 5;
    let mut rng = Xoshiro256Plus::seed_from_u64(0);
    let ind = sample(&mut rng, nt, ni).into_vec();
    let xi = xt.select(Axis(0), &ind);
    let zi = zt.select(Axis(0), &ind);

    // Matern p=2 covariance with fixed variance and length scale,
    // unknown constant mean
    let gp = Kriging::params()
        .sigma2(0.5 * 0.5)
        .theta(arr1(&[1. / 0.7]))
        .fit(&Dataset::new(xi.to_owned(), zi.to_owned()))
        .expect("Kriging fitting");

    let (zpm, zpv) = gp.predict_valvar(&xt).expect("Kriging prediction");

    println!("{gp}");
    println!("estimated mean = {:.4}", gp.trend_coefficients().unwrap()[0]);
    println!();
    println!("observations:");
    for (x, z) in xi.column(0).iter().zip(zi.iter()) {
        println!("{x:8.3} {z:10.4}");
    }
    println!();
    println!("{:>8} {:>10} {:>10} {:>10}", "x", "z", "zpm", "zpv");
    for i in (0..nt).step_by(20) {
        println!(
            "{:8.3} {:10.4} {:10.4} {:10.4}",
            xt[[i, 0]],
            zt[i],
            zpm[i],
            zpv[i]
        );
    }
}
