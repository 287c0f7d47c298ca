use criterion::{Criterion, criterion_group, criterion_main};
use gpkrig::Kriging;
use linfa::prelude::{Dataset, Fit};
use ndarray::{Array, Array1, Array2, Axis, array};
use ndarray_rand::RandomExt;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use rand_xoshiro::Xoshiro256Plus;

fn two_bumps(x: &Array2<f64>) -> Array1<f64> {
    x.mapv(|v| -(0.8 * v + (5. * v + 1.).sin() + 0.1 * (10. * v).sin()))
        .remove_axis(Axis(1))
}

fn criterion_gp(c: &mut Criterion) {
    let mut group = c.benchmark_group("gp");
    group.sample_size(20);

    for nt in [50, 200] {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let xt = Array::random_using((nt, 1), Uniform::new(-1., 1.), &mut rng);
        let yt = two_bumps(&xt);

        group.bench_function(format!("gp-fit {nt}x1"), |b| {
            b.iter(|| {
                std::hint::black_box(
                    Kriging::params()
                        .sigma2(0.25)
                        .theta(array![1. / 0.7])
                        .fit(&Dataset::new(xt.to_owned(), yt.to_owned()))
                        .expect("GP fit error"),
                )
            });
        });
    }

    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let xt = Array::random_using((200, 1), Uniform::new(-1., 1.), &mut rng);
    let yt = two_bumps(&xt);
    let gp = Kriging::params()
        .sigma2(0.25)
        .theta(array![1. / 0.7])
        .fit(&Dataset::new(xt, yt))
        .expect("GP fit error");
    let xplot = Array::linspace(-1., 1., 1000).insert_axis(Axis(1));

    group.bench_function("gp-predict 200x1000", |b| {
        b.iter(|| std::hint::black_box(gp.predict_valvar(&xplot).expect("GP prediction")));
    });

    group.finish();
}

criterion_group!(benches, criterion_gp);
criterion_main!(benches);
