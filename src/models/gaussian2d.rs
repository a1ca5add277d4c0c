//! Symmetric 2D Gaussian spot on a constant background.
//!
//! The model is
//!
//! ```text
//! f(x, y) = amplitude * exp(-((x - x0)² + (y - y0)²) / (2 * sigma²)) + background
//! ```
//!
//! evaluated at the integer pixel coordinates of a `width x height` image
//! stored row by row. The solver works on internal parameters in which
//! amplitude, sigma and background are square roots of their physical values,
//! so every point it visits maps to a positive amplitude, width and background.

use ndarray::{Array1, ArrayView1, ArrayViewMut1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::f64::consts::{LN_2, PI};

use crate::error::{LmError, Result};
use crate::problem::Problem;

/// Physical parameters of a 2D Gaussian spot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gaussian2d {
    /// Peak height above the background
    pub amplitude: f64,
    /// Column coordinate of the centre, in pixels
    pub x0: f64,
    /// Row coordinate of the centre, in pixels
    pub y0: f64,
    /// Standard deviation of the spot, in pixels
    pub sigma: f64,
    /// Constant offset added to every pixel
    pub background: f64,
}

impl Gaussian2d {
    /// Number of fitted parameters
    pub const PARAMETER_COUNT: usize = 5;

    /// Model value at pixel `(x, y)`.
    pub fn value(&self, x: f64, y: f64) -> f64 {
        let dx = x - self.x0;
        let dy = y - self.y0;
        self.amplitude * (-(dx * dx + dy * dy) / (2.0 * self.sigma * self.sigma)).exp()
            + self.background
    }

    /// Internal parameter vector `[√amplitude, x0, y0, √sigma, √background]`.
    pub fn to_internal(&self) -> Array1<f64> {
        Array1::from(vec![
            self.amplitude.max(0.0).sqrt(),
            self.x0,
            self.y0,
            self.sigma.max(0.0).sqrt(),
            self.background.max(0.0).sqrt(),
        ])
    }

    /// Physical parameters from an internal vector.
    pub fn from_internal(params: ArrayView1<'_, f64>) -> Self {
        Self {
            amplitude: params[0] * params[0],
            x0: params[1],
            y0: params[2],
            sigma: params[3] * params[3],
            background: params[4] * params[4],
        }
    }

    /// Render the model on a `width x height` grid, row by row.
    pub fn render(&self, width: usize, height: usize) -> Vec<f64> {
        let mut pixels = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                pixels.push(self.value(col as f64, row as f64));
            }
        }
        pixels
    }
}

/// Residuals of one image against a [`Gaussian2d`].
#[derive(Debug, Clone, Copy)]
pub struct Gaussian2dProblem<'a> {
    image: &'a [f64],
    width: usize,
    height: usize,
}

impl<'a> Gaussian2dProblem<'a> {
    /// Wrap an image of `width x height` pixels stored row by row.
    pub fn new(image: &'a [f64], width: usize, height: usize) -> Result<Self> {
        if image.len() != width * height {
            return Err(LmError::DimensionMismatch(format!(
                "image has {} pixels, expected {}x{}",
                image.len(),
                width,
                height
            )));
        }
        if image.len() < Gaussian2d::PARAMETER_COUNT {
            return Err(LmError::InvalidInput(format!(
                "{}x{} image is too small for a 2D Gaussian",
                width, height
            )));
        }
        Ok(Self {
            image,
            width,
            height,
        })
    }

    /// Image width in pixels
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height in pixels
    pub fn height(&self) -> usize {
        self.height
    }

    /// Starting guess from the image itself.
    ///
    /// The background is the mean of the border pixels and the amplitude the
    /// peak above it. The centre is the intensity-weighted centroid of the
    /// pixels above half maximum, and sigma follows from their count, which
    /// covers a disc of radius `sigma * sqrt(2 ln 2)`.
    pub fn estimate(&self) -> Gaussian2d {
        let (w, h) = (self.width, self.height);
        let mut border_sum = 0.0;
        let mut border_count = 0usize;
        let mut peak = f64::NEG_INFINITY;
        for row in 0..h {
            for col in 0..w {
                let value = self.image[row * w + col];
                peak = peak.max(value);
                if row == 0 || col == 0 || row + 1 == h || col + 1 == w {
                    border_sum += value;
                    border_count += 1;
                }
            }
        }

        let background = (border_sum / border_count.max(1) as f64).max(f64::EPSILON);
        let amplitude = (peak - background).max(f64::EPSILON);
        let half = background + 0.5 * amplitude;

        let (mut total, mut sx, mut sy, mut count) = (0.0, 0.0, 0.0, 0usize);
        for row in 0..h {
            for col in 0..w {
                let value = self.image[row * w + col];
                if value >= half {
                    let excess = value - background;
                    total += excess;
                    sx += excess * col as f64;
                    sy += excess * row as f64;
                    count += 1;
                }
            }
        }

        let (x0, y0) = if total > 0.0 {
            (sx / total, sy / total)
        } else {
            ((w as f64 - 1.0) / 2.0, (h as f64 - 1.0) / 2.0)
        };
        let sigma = (count as f64 / (2.0 * PI * LN_2)).sqrt().max(0.5);

        Gaussian2d {
            amplitude,
            x0,
            y0,
            sigma,
            background,
        }
    }
}

impl Problem for Gaussian2dProblem<'_> {
    fn eval(&self, params: ArrayView1<'_, f64>, mut residuals: ArrayViewMut1<'_, f64>) -> Result<()> {
        let model = Gaussian2d::from_internal(params);
        if !(model.sigma > 0.0) {
            return Err(LmError::InvalidParameter(format!(
                "sigma collapsed to {}",
                model.sigma
            )));
        }
        for row in 0..self.height {
            for col in 0..self.width {
                let k = row * self.width + col;
                residuals[k] = self.image[k] - model.value(col as f64, row as f64);
            }
        }
        Ok(())
    }

    fn parameter_count(&self) -> usize {
        Gaussian2d::PARAMETER_COUNT
    }

    fn residual_count(&self) -> usize {
        self.image.len()
    }
}

/// One synthetic image and the spot it was drawn from.
#[derive(Debug, Clone)]
pub struct SyntheticImage {
    /// The spot the image was rendered from
    pub truth: Gaussian2d,
    /// Noisy pixel values, row by row
    pub pixels: Vec<f64>,
}

/// Draw `count` noisy `width x height` images of random spots.
///
/// Spots are kept away from the border; `noise` is the standard deviation
/// of the additive Gaussian pixel noise. The same `seed` always gives the
/// same batch.
pub fn synthetic_batch(
    count: usize,
    width: usize,
    height: usize,
    noise: f64,
    seed: u64,
) -> Result<Vec<SyntheticImage>> {
    if width < 5 || height < 5 {
        return Err(LmError::InvalidInput(format!(
            "{}x{} is too small for a synthetic spot",
            width, height
        )));
    }
    if !(noise >= 0.0) || !noise.is_finite() {
        return Err(LmError::InvalidParameter(format!(
            "noise level must be finite and nonnegative, got {}",
            noise
        )));
    }
    let noise = Normal::new(0.0, noise)
        .map_err(|e| LmError::InvalidParameter(format!("noise level: {}", e)))?;
    let mut rng = StdRng::seed_from_u64(seed);

    let (w, h) = (width as f64, height as f64);
    let images = (0..count)
        .map(|_| {
            let truth = Gaussian2d {
                amplitude: rng.gen_range(50.0..150.0),
                x0: rng.gen_range(0.35 * w..0.65 * w),
                y0: rng.gen_range(0.35 * h..0.65 * h),
                sigma: rng.gen_range(1.2..(w.min(h) / 6.0).max(1.5)),
                background: rng.gen_range(5.0..15.0),
            };
            let pixels = truth
                .render(width, height)
                .into_iter()
                .map(|value| value + noise.sample(&mut rng))
                .collect();
            SyntheticImage { truth, pixels }
        })
        .collect();
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lm::LevenbergMarquardt;
    use approx::assert_relative_eq;

    fn spot() -> Gaussian2d {
        Gaussian2d {
            amplitude: 80.0,
            x0: 7.3,
            y0: 8.6,
            sigma: 2.1,
            background: 10.0,
        }
    }

    #[test]
    fn test_internal_round_trip() {
        let truth = spot();
        let back = Gaussian2d::from_internal(truth.to_internal().view());
        assert_relative_eq!(back.amplitude, truth.amplitude, epsilon = 1e-12);
        assert_relative_eq!(back.sigma, truth.sigma, epsilon = 1e-12);
        assert_relative_eq!(back.background, truth.background, epsilon = 1e-12);
        assert_eq!(back.x0, truth.x0);
    }

    #[test]
    fn test_negative_internal_maps_positive() {
        let model = Gaussian2d::from_internal(ndarray::aview1(&[-3.0, 1.0, 2.0, -1.5, -0.5]));
        assert_eq!(model.amplitude, 9.0);
        assert_eq!(model.sigma, 2.25);
        assert_eq!(model.background, 0.25);
    }

    #[test]
    fn test_problem_rejects_bad_image() {
        let pixels = vec![0.0; 10];
        assert!(Gaussian2dProblem::new(&pixels, 4, 3).is_err());
        assert!(Gaussian2dProblem::new(&pixels[..4], 2, 2).is_err());
    }

    #[test]
    fn test_estimate_close_to_truth() {
        let truth = spot();
        let pixels = truth.render(16, 16);
        let guess = Gaussian2dProblem::new(&pixels, 16, 16).unwrap().estimate();
        assert!((guess.x0 - truth.x0).abs() < 1.0);
        assert!((guess.y0 - truth.y0).abs() < 1.0);
        assert!(guess.sigma > 1.0 && guess.sigma < 4.0);
        assert!(guess.amplitude > 40.0);
        assert!(guess.background > 0.0);
    }

    #[test]
    fn test_exact_fit() {
        let truth = spot();
        let pixels = truth.render(16, 16);
        let problem = Gaussian2dProblem::new(&pixels, 16, 16).unwrap();

        let result = LevenbergMarquardt::default().minimize(&problem, problem.estimate().to_internal());
        assert!(result.success(), "{}", result);

        let fit = Gaussian2d::from_internal(result.params.view());
        assert_relative_eq!(fit.amplitude, truth.amplitude, epsilon = 1e-5);
        assert_relative_eq!(fit.x0, truth.x0, epsilon = 1e-6);
        assert_relative_eq!(fit.y0, truth.y0, epsilon = 1e-6);
        assert_relative_eq!(fit.sigma, truth.sigma, epsilon = 1e-6);
        assert_relative_eq!(fit.background, truth.background, epsilon = 1e-5);
    }

    #[test]
    fn test_synthetic_batch_is_seeded() {
        let a = synthetic_batch(3, 12, 12, 0.5, 7).unwrap();
        let b = synthetic_batch(3, 12, 12, 0.5, 7).unwrap();
        assert_eq!(a.len(), 3);
        assert_eq!(a[2].pixels, b[2].pixels);
        assert_eq!(a[0].truth, b[0].truth);
        assert!(synthetic_batch(1, 3, 3, 0.5, 7).is_err());
        assert!(synthetic_batch(1, 12, 12, -1.0, 7).is_err());
        assert!(synthetic_batch(1, 12, 12, f64::NAN, 7).is_err());
        assert!(synthetic_batch(1, 12, 12, f64::INFINITY, 7).is_err());
        assert!(synthetic_batch(1, 12, 12, 0.0, 7).is_ok());
    }
}
