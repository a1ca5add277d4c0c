//! Fit a batch of noisy 2D Gaussian spots in parallel and report how well
//! the spots were recovered.
//!
//! Run with `cargo run --example batch_gaussian --release`.

use lmdif_batch::models::{synthetic_batch, Gaussian2d, Gaussian2dProblem};
use lmdif_batch::uncertainty::standard_errors_from_covariance;
use lmdif_batch::{BatchStorage, LevenbergMarquardt, LmConfig, ParallelLevenbergMarquardt, Result};
use log::{info, LevelFilter};
use ndarray::Array1;
use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

const WIDTH: usize = 13;
const HEIGHT: usize = 13;
const COUNT: usize = 2000;

fn main() -> Result<()> {
    let _ = CombinedLogger::init(vec![TermLogger::new(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);

    let images = synthetic_batch(COUNT, WIDTH, HEIGHT, 2.0, 2024)?;
    let problems = images
        .iter()
        .map(|image| Gaussian2dProblem::new(&image.pixels, WIDTH, HEIGHT))
        .collect::<Result<Vec<_>>>()?;
    let starts: Vec<Array1<f64>> = problems
        .iter()
        .map(|problem| problem.estimate().to_internal())
        .collect();

    let m = WIDTH * HEIGHT;
    let mut storage = BatchStorage::from_initial(m, &starts)?;
    let solver = ParallelLevenbergMarquardt::new();

    let start = std::time::Instant::now();
    let summary = solver.solve_batch(&problems, &mut storage)?;
    let elapsed = start.elapsed();
    info!(
        "{} fits in {:.1} ms ({:.1} us per fit)",
        COUNT,
        elapsed.as_secs_f64() * 1e3,
        elapsed.as_secs_f64() * 1e6 / COUNT as f64
    );

    let mut center_error = 0.0;
    let mut sigma_error = 0.0;
    for (k, image) in images.iter().enumerate() {
        if let Some(worker) = storage.worker(k) {
            let fit = Gaussian2d::from_internal(worker.params);
            center_error += ((fit.x0 - image.truth.x0).powi(2) + (fit.y0 - image.truth.y0).powi(2)).sqrt();
            sigma_error += (fit.sigma - image.truth.sigma).abs() / image.truth.sigma;
        }
    }
    info!(
        "converged {}/{}, mean centre error {:.3} px, mean relative sigma error {:.2}%",
        summary.converged,
        COUNT,
        center_error / COUNT as f64,
        100.0 * sigma_error / COUNT as f64
    );

    // uncertainties for the first spot from a single-problem solve
    let single = LevenbergMarquardt::new(LmConfig::default().with_calc_covariance(true))
        .minimize(&problems[0], starts[0].clone());
    if let Some(covar) = &single.covariance {
        let errors = standard_errors_from_covariance(covar);
        info!("first spot: {}", single);
        info!("internal parameter standard errors: {:?}", errors);
    }

    Ok(())
}
