//! Mean-shift clustering with automatic cluster count discovery

use crate::{nearest_centroid, Clusters, MeanShiftOptions, OklabPixels};
use palette::Oklab;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;

/// Squared Euclidean distance between two double-precision Oklab colors
fn squared_distance(x: Oklab<f64>, y: Oklab<f64>) -> f64 {
	let dl = x.l - y.l;
	let da = x.a - y.a;
	let db = x.b - y.b;
	dl * dl + da * da + db * db
}

/// Widen an Oklab color to double precision
fn widen(color: Oklab) -> Oklab<f64> {
	Oklab::new(f64::from(color.l), f64::from(color.a), f64::from(color.b))
}

/// Narrow a double-precision Oklab color back to single precision
#[allow(clippy::cast_possible_truncation)]
fn narrow(color: Oklab<f64>) -> Oklab {
	Oklab::new(color.l as f32, color.a as f32, color.b as f32)
}

/// The total pulling weight of each unique color: pixel count times chroma weight
fn effective_weights(oklab: &OklabPixels) -> Vec<f64> {
	oklab
		.counts
		.iter()
		.zip(&oklab.weights)
		.map(|(&n, &w)| f64::from(n) * f64::from(w))
		.collect()
}

/// Sample up to `max_seeds` starting points without replacement,
/// weighted so that vivid colors are preferentially explored
fn sample_seeds(
	oklab: &OklabPixels,
	weights: &[f64],
	max_seeds: u32,
	rng: &mut Xoshiro256StarStar,
) -> Vec<Oklab> {
	let amount = usize::min(max_seeds as usize, oklab.colors.len());

	match rand::seq::index::sample_weighted(rng, oklab.colors.len(), |i| weights[i], amount) {
		Ok(indices) => indices.into_iter().map(|i| oklab.colors[i]).collect(),
		Err(_) => unreachable!("weights are positive and amount <= colors.len()"),
	}
}

/// Climb from a seed toward a local density mode under a Gaussian kernel.
///
/// The climb stops when the step length falls below the convergence
/// threshold, the kernel weight sum is zero, or the iteration cap is hit;
/// the last position is the seed's mode in every case.
fn climb(seed: Oklab, oklab: &OklabPixels, weights: &[f64], options: &MeanShiftOptions) -> Oklab<f64> {
	let bandwidth = f64::from(options.bandwidth);
	let threshold = f64::from(options.convergence_threshold);
	let mut point = widen(seed);

	for _ in 0..options.max_iter {
		let mut sum = Oklab::<f64>::new(0.0, 0.0, 0.0);
		let mut total = 0.0;

		for (&color, &weight) in oklab.colors.iter().zip(weights) {
			let color = widen(color);
			let kernel = (-0.5 * squared_distance(color, point) / (bandwidth * bandwidth)).exp() * weight;
			sum.l += kernel * color.l;
			sum.a += kernel * color.a;
			sum.b += kernel * color.b;
			total += kernel;
		}

		#[allow(clippy::float_cmp)]
		if total == 0.0 {
			break;
		}

		let next = Oklab::new(sum.l / total, sum.a / total, sum.b / total);
		let shift = squared_distance(next, point).sqrt();
		point = next;

		if shift < threshold {
			break;
		}
	}

	point
}

/// Climb every seed to its mode
#[cfg(not(feature = "threads"))]
fn climb_seeds(
	seeds: &[Oklab],
	oklab: &OklabPixels,
	weights: &[f64],
	options: &MeanShiftOptions,
) -> Vec<Oklab<f64>> {
	seeds
		.iter()
		.map(|&seed| climb(seed, oklab, weights, options))
		.collect()
}

/// Climb every seed to its mode, in parallel since the climbs are independent
#[cfg(feature = "threads")]
fn climb_seeds(
	seeds: &[Oklab],
	oklab: &OklabPixels,
	weights: &[f64],
	options: &MeanShiftOptions,
) -> Vec<Oklab<f64>> {
	use rayon::prelude::*;

	seeds
		.par_iter()
		.map(|&seed| climb(seed, oklab, weights, options))
		.collect()
}

/// Merge converged modes in seed order: each unmerged mode absorbs every mode
/// strictly within the bandwidth and the group becomes its unweighted mean
fn merge_modes(modes: &[Oklab<f64>], bandwidth: f64) -> Vec<Oklab> {
	let mut merged = Vec::new();
	let mut used = vec![false; modes.len()];

	for i in 0..modes.len() {
		if used[i] {
			continue;
		}

		let mut sum = Oklab::<f64>::new(0.0, 0.0, 0.0);
		let mut group = 0.0;
		for (j, &mode) in modes.iter().enumerate() {
			if squared_distance(mode, modes[i]).sqrt() < bandwidth {
				sum.l += mode.l;
				sum.a += mode.a;
				sum.b += mode.b;
				group += 1.0;
				used[j] = true;
			}
		}

		// the group always contains mode i itself
		merged.push(narrow(Oklab::new(sum.l / group, sum.a / group, sum.b / group)));
	}

	merged
}

/// Number of pixels whose nearest center is each of the given centers
fn assigned_counts(oklab: &OklabPixels, centers: &[Oklab]) -> Vec<u32> {
	let mut counts = vec![0; centers.len()];
	for (&color, &n) in oklab.colors.iter().zip(&oklab.counts) {
		counts[nearest_centroid(color, centers)] += n;
	}
	counts
}

/// Cluster the pixels by mean shift, discovering the cluster count automatically.
///
/// At most [`MeanShiftOptions::max_clusters`] clusters are returned; when more
/// candidate modes survive merging, only the most populous are kept.
pub(crate) fn cluster(oklab: &OklabPixels, options: &MeanShiftOptions, seed: u64) -> Clusters {
	let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
	let weights = effective_weights(oklab);

	let seeds = sample_seeds(oklab, &weights, options.max_seeds, &mut rng);
	let modes = climb_seeds(&seeds, oklab, &weights, options);
	let mut centers = merge_modes(&modes, f64::from(options.bandwidth));

	let max_clusters = usize::from(options.max_clusters);
	if centers.len() > max_clusters {
		let counts = assigned_counts(oklab, &centers);
		let mut indices = (0..centers.len()).collect::<Vec<_>>();
		indices.sort_by_key(|&i| std::cmp::Reverse(counts[i]));
		indices.truncate(max_clusters);
		centers = indices.into_iter().map(|i| centers[i]).collect();
	}

	let counts = assigned_counts(oklab, &centers);
	Clusters {
		centroids: centers,
		counts,
	}
}
