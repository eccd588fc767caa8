//! # RPS Solver Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mel_lib::rps::{RpsParams, RpsSolver};
use nalgebra::Vector3;

fn rps_solver_benchmark(c: &mut Criterion) {
    let solver = RpsSolver::new(RpsParams::default()).unwrap();

    let q_par = Vector3::new(0.11, 0.12, 0.13);

    // Converged configuration to warm start from
    let mut qp_warm = solver.qp0();
    let q_ser = solver.forward_kinematics(&q_par, &mut qp_warm).unwrap();

    // Nearby leg lengths, as between two ticks of the control loop
    let q_par_next = q_par + Vector3::new(1e-5, -1e-5, 2e-5);

    c.bench_function("RpsSolver::forward_kinematics::cold", |b| {
        b.iter(|| {
            let mut qp = solver.qp0();
            solver.forward_kinematics(black_box(&q_par), &mut qp).unwrap()
        })
    });

    c.bench_function("RpsSolver::forward_kinematics::warm", |b| {
        b.iter(|| {
            let mut qp = qp_warm;
            solver.forward_kinematics(black_box(&q_par_next), &mut qp).unwrap()
        })
    });

    c.bench_function("RpsSolver::inverse_kinematics::warm", |b| {
        b.iter(|| {
            let mut qp = qp_warm;
            solver.inverse_kinematics(black_box(&q_ser), &mut qp).unwrap()
        })
    });

    c.bench_function("RpsSolver::forward_kinematics_velocity", |b| {
        b.iter(|| {
            let mut qp = qp_warm;
            solver.forward_kinematics_velocity(
                black_box(&q_par),
                &Vector3::new(0.01, -0.01, 0.0),
                &mut qp
            ).unwrap()
        })
    });
}

criterion_group!(benches, rps_solver_benchmark);
criterion_main!(benches);
