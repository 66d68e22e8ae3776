//! Chroma-weighted k-means clustering with k-means++ seeding

use crate::{nearest_centroid, squared_distance, Clusters, OklabPixels};
use palette::Oklab;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

/// Relative tolerance for the center convergence check
const CONVERGENCE_RTOL: f32 = 1e-5;

/// Absolute tolerance for the center convergence check
const CONVERGENCE_ATOL: f32 = 1e-8;

/// Holds all the state used by k-means, reused across iterations
struct KmeansState {
	/// The current centroid points
	centroid: Vec<Oklab>,
	/// Scratch buffer the updated centroids are written into
	next: Vec<Oklab>,
	/// Weighted vector sum for all data points in each center
	sum: Vec<Oklab<f64>>,
	/// Total weight of the data points in each center
	weight: Vec<f64>,
	/// Number of pixels in each center
	count: Vec<u32>,
	/// Center assignment for each data point
	assignment: Vec<u16>,
	/// Squared distance from each data point to its nearest chosen centroid,
	/// used to randomly select starting centroids in k-means++
	seed_weight: Vec<f32>,
}

impl KmeansState {
	/// Initialize a new [`KmeansState`] with `k` centers and `n` data points
	fn new(k: u16, n: usize) -> Self {
		let k = usize::from(k);
		Self {
			centroid: Vec::new(),
			next: vec![Oklab::new(0.0, 0.0, 0.0); k],
			sum: vec![Oklab::new(0.0, 0.0, 0.0); k],
			weight: vec![0.0; k],
			count: vec![0; k],
			assignment: vec![0; n],
			seed_weight: vec![f32::INFINITY; n],
		}
	}
}

/// Pick a random data point, each unique color weighted by its pixel count
fn uniform_pixel_pick(rng: &mut impl Rng, oklab: &OklabPixels) -> Oklab {
	use rand::{distributions::WeightedIndex, prelude::Distribution};

	match WeightedIndex::new(&oklab.counts) {
		Ok(sampler) => oklab.colors[sampler.sample(rng)],
		Err(_) => unreachable!("counts are positive and non-empty"),
	}
}

/// Choose the starting centroids using the k-means++ algorithm
fn kmeans_plus_plus(
	k: u16,
	rng: &mut impl Rng,
	oklab: &OklabPixels,
	centroids: &mut Vec<Oklab>,
	seed_weights: &mut [f32],
) {
	use rand::{
		distributions::{WeightedError::*, WeightedIndex},
		prelude::Distribution,
	};

	// Pick any random first centroid
	centroids.push(uniform_pixel_pick(rng, oklab));

	// Pick each next centroid with a weighted probability based off the squared distance to its closest centroid
	for i in 1..usize::from(k) {
		let centroid = centroids[i - 1];
		for (weight, &color) in seed_weights.iter_mut().zip(&oklab.colors) {
			*weight = f32::min(*weight, squared_distance(color, centroid));
		}

		let sampler = WeightedIndex::new(
			seed_weights
				.iter()
				.zip(&oklab.counts)
				.map(|(&dist, &n)| f64::from(dist) * f64::from(n)),
		);

		match sampler {
			Ok(sampler) => centroids.push(oklab.colors[sampler.sample(rng)]),
			// all points exactly match a centroid, so fall back to a uniform pick
			Err(AllWeightsZero) => centroids.push(uniform_pixel_pick(rng, oklab)),
			Err(InvalidWeight | NoItem | TooMany) => {
				unreachable!("distances are >= 0 and colors.len() is in 1..=2.pow(24)")
			},
		}
	}
}

/// For each data point, update its assigned center
#[cfg(not(feature = "threads"))]
fn update_assignments(oklab: &OklabPixels, centroid: &[Oklab], assignment: &mut [u16]) {
	for (center, &color) in assignment.iter_mut().zip(&oklab.colors) {
		// k <= 3 * 255 < u16::MAX
		#[allow(clippy::cast_possible_truncation)]
		{
			*center = nearest_centroid(color, centroid) as u16;
		}
	}
}

/// For each data point, update its assigned center
#[cfg(feature = "threads")]
fn update_assignments(oklab: &OklabPixels, centroid: &[Oklab], assignment: &mut [u16]) {
	use rayon::prelude::*;

	assignment
		.par_iter_mut()
		.zip(&oklab.colors)
		.for_each(|(center, &color)| {
			// k <= 3 * 255 < u16::MAX
			#[allow(clippy::cast_possible_truncation)]
			{
				*center = nearest_centroid(color, centroid) as u16;
			}
		});
}

/// Recompute each center's weighted sum, total weight, and pixel count from the assignments
///
/// Sums are accumulated sequentially in data order so that results do not
/// depend on the `threads` feature.
fn accumulate_centers(oklab: &OklabPixels, state: &mut KmeansState) {
	state.sum.fill(Oklab::new(0.0, 0.0, 0.0));
	state.weight.fill(0.0);
	state.count.fill(0);

	for ((color, n, w), &center) in oklab.entries().zip(&state.assignment) {
		let i = usize::from(center);
		let weight = f64::from(n) * f64::from(w);
		let sum = &mut state.sum[i];
		sum.l += weight * f64::from(color.l);
		sum.a += weight * f64::from(color.a);
		sum.b += weight * f64::from(color.b);
		state.weight[i] += weight;
		state.count[i] += n;
	}
}

/// Compute the next centroids as the weight-normalized mean of each center's points,
/// leaving centers with no points unchanged
fn update_centroids(state: &mut KmeansState) {
	for i in 0..state.centroid.len() {
		state.next[i] = if state.count[i] == 0 {
			state.centroid[i]
		} else {
			let weight = state.weight[i];
			let sum = state.sum[i];
			// Sums need greater precision, but the average can fall back down to a reduced precision
			#[allow(clippy::cast_possible_truncation)]
			Oklab::new(
				(sum.l / weight) as f32,
				(sum.a / weight) as f32,
				(sum.b / weight) as f32,
			)
		};
	}
}

/// Whether every component of every center moved by less than the numerical tolerance
fn converged(old: &[Oklab], new: &[Oklab]) -> bool {
	/// Component-wise closeness: `|new - old| <= atol + rtol * |old|`
	fn close(old: f32, new: f32) -> bool {
		(new - old).abs() <= CONVERGENCE_ATOL + CONVERGENCE_RTOL * old.abs()
	}

	old.iter()
		.zip(new)
		.all(|(x, y)| close(x.l, y.l) && close(x.a, y.a) && close(x.b, y.b))
}

/// Run Lloyd's algorithm from k-means++ starting centroids,
/// returning the clusters and the number of elapsed iterations
fn kmeans(oklab: &OklabPixels, state: &mut KmeansState, k: u16, max_iter: u32, seed: u64) -> (Clusters, u32) {
	let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
	kmeans_plus_plus(k, &mut rng, oklab, &mut state.centroid, &mut state.seed_weight);

	let mut iterations = 0;
	while iterations < max_iter {
		update_assignments(oklab, &state.centroid, &mut state.assignment);
		accumulate_centers(oklab, state);
		update_centroids(state);
		iterations += 1;

		if converged(&state.centroid, &state.next) {
			// keep the pre-update centroids, which match the current assignments
			break;
		}

		std::mem::swap(&mut state.centroid, &mut state.next);
	}

	if iterations == 0 {
		// degenerate iteration cap; label once so counts reflect the seeded centroids
		update_assignments(oklab, &state.centroid, &mut state.assignment);
		accumulate_centers(oklab, state);
	}

	(
		Clusters {
			centroids: state.centroid.clone(),
			counts: state.count.clone(),
		},
		iterations,
	)
}

/// Cluster the pixels into `k` groups by chroma-weighted k-means.
///
/// The returned clusters always number exactly `k`; centers that end up with
/// no points keep their seeded position and report a count of zero.
pub(crate) fn cluster(oklab: &OklabPixels, k: u16, max_iter: u32, seed: u64) -> Clusters {
	let mut state = KmeansState::new(k, oklab.colors.len());
	kmeans(oklab, &mut state, k, max_iter, seed).0
}
