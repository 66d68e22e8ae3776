//! Extract a small palette of perceptually distinct dominant colors from an image
//! by clustering its pixels in the Oklab color space.
//!
//! # Examples
//!
//! ## Get the dominant colors of a pixel buffer.
//!
//! ```
//! use okpalette::PaletteOptions;
//! use palette::Srgb;
//!
//! let pixels = vec![Srgb::new(230u8, 25, 25); 400];
//! let palette = okpalette::palette_from_srgb(&pixels, 10.0, &PaletteOptions::default());
//!
//! assert_eq!(palette.len(), 1);
//! assert_eq!(palette[0].percentage, 100.0);
//! ```
//!
//! ## Run both clustering modes on the same converted pixels.
//!
//! ```
//! use okpalette::{ClusteringMode, PaletteOptions};
//! use palette::Srgb;
//!
//! let pixels = vec![Srgb::new(230u8, 25, 25), Srgb::new(25, 25, 230)];
//! let oklab = okpalette::srgb_to_oklab_pixels(&pixels, 10.0);
//!
//! let kmeans = okpalette::palette_from_oklab(&oklab, &PaletteOptions::default());
//!
//! let mean_shift = PaletteOptions {
//!     mode: ClusteringMode::MeanShift,
//!     ..PaletteOptions::default()
//! };
//! let discovered = okpalette::palette_from_oklab(&oklab, &mean_shift);
//! ```
//!
//! # Arguments
//!
//! ## Chroma Weight
//!
//! Each pixel carries a weight of `1 + chroma * chroma_weight` where
//! `chroma = sqrt(a² + b²)` in Oklab. Saturated pixels therefore pull cluster
//! centers and mean-shift seeds harder than near-gray ones, so vivid accent
//! colors survive into the palette instead of washing out. A value of `10.0`
//! is a good default; `0.0` disables the weighting entirely.
//!
//! ## Number of Colors
//!
//! The maximum number of palette entries to return. 2 to 10 is the sensible
//! range. The k-means mode internally requests `oversampling_factor` times
//! this many clusters so that the selection step has enough headroom to drop
//! near-duplicate colors.
//!
//! ## Similarity Threshold
//!
//! The minimum Euclidean distance in Oklab space between any two returned
//! colors. Clusters closer than this to an already accepted color are skipped
//! during selection. `0.15` works well in practice.
//!
//! ## Mode
//!
//! [`ClusteringMode::Kmeans`] runs chroma-weighted k-means with k-means++
//! seeding and a fixed cluster count. [`ClusteringMode::MeanShift`] instead
//! climbs toward density modes under a Gaussian kernel and discovers the
//! cluster count on its own, bounded by [`MeanShiftOptions::max_clusters`].
//! The two modes may return different palettes for the same image.
//!
//! ## Seed
//!
//! Seeds the random number generator used for k-means++ picks and mean-shift
//! seed sampling. Identical pixels, options, and seed always produce
//! identical output; no global random state is involved.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::cargo)]
#![warn(clippy::use_debug, clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![warn(clippy::unwrap_used, clippy::unwrap_in_result)]
#![warn(clippy::unneeded_field_pattern, clippy::rest_pat_in_fully_bound_structs)]
#![warn(clippy::unnecessary_self_imports)]
#![warn(clippy::str_to_string, clippy::string_to_string, clippy::string_slice)]
#![warn(missing_docs, clippy::missing_docs_in_private_items, rustdoc::all)]
#![warn(clippy::float_cmp_const, clippy::lossy_float_literal)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unreadable_literal)]

use palette::{Clamp, FromColor, Oklab, Srgb};
use std::collections::HashMap;

mod kmeans;
mod meanshift;
mod select;

pub use select::PaletteColor;

/// How the pixels are grouped into clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusteringMode {
	/// Chroma-weighted k-means with k-means++ seeding and an oversampled,
	/// fixed cluster count
	Kmeans,
	/// Gaussian-kernel mean shift with automatic cluster count discovery
	MeanShift,
}

/// Tunables for the mean-shift clustering mode
#[derive(Debug, Clone)]
pub struct MeanShiftOptions {
	/// Kernel radius; larger bandwidths merge more colors into fewer clusters
	pub bandwidth: f32,
	/// Maximum hill-climbing iterations per seed
	pub max_iter: u32,
	/// A seed's climb stops once its step length falls below this
	pub convergence_threshold: f32,
	/// Hard cap on the number of discovered clusters; the most populous are kept
	pub max_clusters: u16,
	/// Number of seed points to sample, weighted by chroma
	pub max_seeds: u32,
}

impl Default for MeanShiftOptions {
	fn default() -> Self {
		Self {
			bandwidth: 0.04,
			max_iter: 50,
			convergence_threshold: 1e-4,
			max_clusters: 10,
			max_seeds: 200,
		}
	}
}

/// Tunables for palette extraction
#[derive(Debug, Clone)]
pub struct PaletteOptions {
	/// Maximum number of colors to return
	pub num_colors: u8,
	/// The k-means mode requests `oversampling_factor * num_colors` clusters
	/// to leave the selection step headroom for dropping near-duplicates;
	/// values below 1 are treated as 1
	pub oversampling_factor: u8,
	/// Minimum Oklab distance between any two returned colors
	pub similarity_threshold: f32,
	/// Maximum number of k-means iterations; reaching the cap is not an error
	pub max_iter: u32,
	/// Seed for all randomized steps
	pub seed: u64,
	/// Which clustering strategy to run
	pub mode: ClusteringMode,
	/// Settings for [`ClusteringMode::MeanShift`]
	pub mean_shift: MeanShiftOptions,
}

impl Default for PaletteOptions {
	fn default() -> Self {
		Self {
			num_colors: 4,
			oversampling_factor: 3,
			similarity_threshold: 0.15,
			max_iter: 100,
			seed: 42,
			mode: ClusteringMode::Kmeans,
			mean_shift: MeanShiftOptions::default(),
		}
	}
}

/// Deduplicated Oklab colors converted from Srgb pixels, with the number of
/// duplicate pixels and the chroma weight for each unique color
#[derive(Debug, Clone)]
pub struct OklabPixels {
	/// Unique Oklab colors
	pub(crate) colors: Vec<Oklab>,
	/// The number of duplicate Srgb pixels for each Oklab color
	pub(crate) counts: Vec<u32>,
	/// The chroma weight `1 + chroma * chroma_weight` for each Oklab color
	pub(crate) weights: Vec<f32>,
}

impl OklabPixels {
	/// Create an `OklabPixels` with empty Vecs
	const fn new() -> Self {
		Self {
			colors: Vec::new(),
			counts: Vec::new(),
			weights: Vec::new(),
		}
	}

	/// The number of unique colors
	#[must_use]
	pub fn num_colors(&self) -> u32 {
		// there are only (2^8)^3 < u32::MAX possible sRGB colors
		#[allow(clippy::cast_possible_truncation)]
		{
			self.colors.len() as u32
		}
	}

	/// The total number of pixels across all unique colors
	#[must_use]
	pub fn total_count(&self) -> u64 {
		self.counts.iter().map(|&n| u64::from(n)).sum()
	}

	/// Iterate over each unique color with its pixel count and chroma weight
	pub(crate) fn entries(&self) -> impl Iterator<Item = (Oklab, u32, f32)> + '_ {
		self.colors
			.iter()
			.zip(&self.counts)
			.zip(&self.weights)
			.map(|((&color, &count), &weight)| (color, count, weight))
	}
}

/// Cluster centers together with the number of pixels assigned to each center
#[derive(Debug, Clone)]
pub(crate) struct Clusters {
	/// The center of each cluster
	pub centroids: Vec<Oklab>,
	/// Number of pixels in each cluster's region
	pub counts: Vec<u32>,
}

/// Squared Euclidean distance between two Oklab colors
pub(crate) fn squared_distance(x: Oklab, y: Oklab) -> f32 {
	let dl = x.l - y.l;
	let da = x.a - y.a;
	let db = x.b - y.b;
	dl * dl + da * da + db * db
}

/// Index of the closest centroid, ties broken by the lowest index
pub(crate) fn nearest_centroid(color: Oklab, centroids: &[Oklab]) -> usize {
	let mut min_index = 0;
	let mut min_dist = f32::INFINITY;
	for (i, &centroid) in centroids.iter().enumerate() {
		let dist = squared_distance(color, centroid);
		if dist < min_dist {
			min_dist = dist;
			min_index = i;
		}
	}
	min_index
}

/// Convert an [`Srgb`] pixel to its [`Oklab`] representation
#[must_use]
pub fn srgb_to_oklab(srgb: Srgb<u8>) -> Oklab {
	Oklab::from_color(srgb.into_linear())
}

/// Convert an [`Oklab`] color back to an [`Srgb`] pixel, clamping out-of-gamut
/// components to the legal channel range
#[must_use]
pub fn oklab_to_srgb(color: Oklab) -> Srgb<u8> {
	let srgb: Srgb = Srgb::from_color(color);
	srgb.clamp().into_format()
}

/// The chroma weight for an Oklab color: `1 + sqrt(a² + b²) * chroma_weight`
fn pixel_weight(color: Oklab, chroma_weight: f32) -> f32 {
	1.0 + color.a.hypot(color.b) * chroma_weight
}

/// Converts a slice of Srgb pixels to weighted Oklab colors,
/// merging duplicate Srgb pixels in the process.
///
/// `chroma_weight` scales the influence of saturated colors and should be `>= 0.0`.
///
/// Converting from Srgb to Oklab is expensive, so use this function together
/// with [`palette_from_oklab`] if you need to cluster the same pixels more
/// than once (e.g. with both [`ClusteringMode`]s); [`palette_from_srgb`]
/// recomputes the conversion every time.
#[must_use]
pub fn srgb_to_oklab_pixels(pixels: &[Srgb<u8>], chroma_weight: f32) -> OklabPixels {
	let mut data = OklabPixels::new();

	// Memoizing the conversion also groups identical pixels,
	// which speeds up every pass the clusterers make over the data.

	// Packed Srgb -> data index
	let mut memo: HashMap<u32, u32> = HashMap::new();

	for srgb in pixels {
		let key = srgb.into_u32::<palette::rgb::channels::Rgba>();
		let index = *memo.entry(key).or_insert_with(|| {
			let color = srgb_to_oklab(*srgb);

			// data.len() < u32::MAX because there are only (2^8)^3 < u32::MAX possible sRGB colors
			#[allow(clippy::cast_possible_truncation)]
			let index = data.colors.len() as u32;

			data.colors.push(color);
			data.counts.push(0);
			data.weights.push(pixel_weight(color, chroma_weight));
			index
		});

		data.counts[index as usize] += 1;
	}

	data
}

/// Extracts the dominant colors from the provided slice of Srgb pixels.
///
/// Transparent pixels should be filtered out by the caller beforehand.
/// An empty slice produces an empty palette; the extraction itself cannot fail.
///
/// See the crate documentation for examples and information on each argument.
#[must_use]
pub fn palette_from_srgb(
	pixels: &[Srgb<u8>],
	chroma_weight: f32,
	options: &PaletteOptions,
) -> Vec<PaletteColor> {
	palette_from_oklab(&srgb_to_oklab_pixels(pixels, chroma_weight), options)
}

/// Extracts the dominant colors from an [`OklabPixels`] built by [`srgb_to_oklab_pixels`].
///
/// See the crate documentation for examples and information on each argument.
#[must_use]
pub fn palette_from_oklab(pixels: &OklabPixels, options: &PaletteOptions) -> Vec<PaletteColor> {
	if pixels.colors.is_empty() || options.num_colors == 0 {
		return Vec::new();
	}

	let clusters = match options.mode {
		ClusteringMode::Kmeans => {
			let k = u16::from(options.num_colors)
				.saturating_mul(u16::from(options.oversampling_factor))
				.max(u16::from(options.num_colors));
			kmeans::cluster(pixels, k, options.max_iter, options.seed)
		},
		ClusteringMode::MeanShift => meanshift::cluster(pixels, &options.mean_shift, options.seed),
	};

	select::select_palette(
		&clusters,
		pixels.total_count(),
		options.num_colors,
		options.similarity_threshold,
	)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;

	fn test_colors() -> Vec<Srgb<u8>> {
		// step 17 lands exactly on 255, covering both channel extremes
		let range = (0..=u8::MAX).step_by(17);
		let mut colors = Vec::new();

		for r in range.clone() {
			for g in range.clone() {
				for b in range.clone() {
					colors.push(Srgb::new(r, g, b));
				}
			}
		}

		colors
	}

	/// Absolute difference between two channel values
	fn channel_delta(x: u8, y: u8) -> u8 {
		u8::max(x, y) - u8::min(x, y)
	}

	#[test]
	fn oklab_round_trips_within_one_channel_unit() {
		for srgb in test_colors() {
			let back = oklab_to_srgb(srgb_to_oklab(srgb));
			assert!(
				channel_delta(srgb.red, back.red) <= 1
					&& channel_delta(srgb.green, back.green) <= 1
					&& channel_delta(srgb.blue, back.blue) <= 1,
				"{srgb:?} round-tripped to {back:?}"
			);
		}
	}

	#[test]
	fn oklab_to_srgb_clamps_out_of_gamut() {
		let over = Oklab::new(1.5, 0.8, -0.9);
		let srgb = oklab_to_srgb(over);
		// inverse transform would exceed the channel range without clamping
		assert_eq!(srgb.red, 255);
	}

	#[test]
	fn srgb_to_oklab_pixels_merges_duplicates() {
		let pixels = vec![
			Srgb::new(10u8, 20, 30),
			Srgb::new(200, 100, 50),
			Srgb::new(10, 20, 30),
			Srgb::new(10, 20, 30),
		];

		let oklab = srgb_to_oklab_pixels(&pixels, 10.0);

		assert_eq!(oklab.num_colors(), 2);
		assert_eq!(oklab.counts, vec![3, 1]);
		assert_eq!(oklab.total_count(), 4);
	}

	#[test]
	fn weights_are_one_plus_scaled_chroma() {
		let pixels = vec![Srgb::new(128u8, 128, 128), Srgb::new(255, 0, 0)];
		let oklab = srgb_to_oklab_pixels(&pixels, 10.0);

		for ((&color, &weight), _) in oklab.colors.iter().zip(&oklab.weights).zip(&oklab.counts) {
			let chroma = color.a.hypot(color.b);
			assert_relative_eq!(weight, 1.0 + chroma * 10.0, epsilon = 1e-6);
			assert!(weight > 0.0);
		}

		// gray has nearly zero chroma, red does not
		assert!(oklab.weights[0] < 1.01);
		assert!(oklab.weights[1] > 2.0);
	}

	#[test]
	fn zero_chroma_weight_gives_unit_weights() {
		let oklab = srgb_to_oklab_pixels(&[Srgb::new(255u8, 0, 0)], 0.0);
		assert_relative_eq!(oklab.weights[0], 1.0, epsilon = 1e-6);
	}

	#[test]
	fn nearest_centroid_breaks_ties_by_lowest_index() {
		let color = Oklab::new(0.5, 0.1, 0.1);
		let centroids = vec![color, color, Oklab::new(0.5, 0.1, 0.2)];
		assert_eq!(nearest_centroid(color, &centroids), 0);
	}

	#[test]
	fn empty_input_gives_empty_palette() {
		let options = PaletteOptions::default();
		assert!(palette_from_srgb(&[], 10.0, &options).is_empty());

		let mean_shift = PaletteOptions {
			mode: ClusteringMode::MeanShift,
			..PaletteOptions::default()
		};
		assert!(palette_from_srgb(&[], 10.0, &mean_shift).is_empty());
	}

	#[test]
	fn zero_num_colors_gives_empty_palette() {
		let options = PaletteOptions {
			num_colors: 0,
			..PaletteOptions::default()
		};
		let pixels = vec![Srgb::new(255u8, 0, 0)];
		assert!(palette_from_srgb(&pixels, 10.0, &options).is_empty());
	}

	/// Parse a `#rrggbb` string back into channel values
	fn parse_hex(hex: &str) -> (u8, u8, u8) {
		assert_eq!(hex.len(), 7);
		assert!(hex.starts_with('#'));
		let channel = |i| u8::from_str_radix(hex.get(i..i + 2).unwrap(), 16).unwrap();
		(channel(1), channel(3), channel(5))
	}

	/// Assert that a hex color is within `eps` of the expected channels
	fn assert_hex_near(hex: &str, r: u8, g: u8, b: u8, eps: u8) {
		let (hr, hg, hb) = parse_hex(hex);
		assert!(
			channel_delta(hr, r) <= eps && channel_delta(hg, g) <= eps && channel_delta(hb, b) <= eps,
			"{hex} is not near #{r:02x}{g:02x}{b:02x}"
		);
	}

	#[test]
	fn uniform_red_image_gives_single_color() {
		let pixels = vec![Srgb::new(255u8, 0, 0); 500];
		let palette = palette_from_srgb(&pixels, 10.0, &PaletteOptions::default());

		assert_eq!(palette.len(), 1);
		assert_eq!(palette[0].percentage, 100.0);
		assert_hex_near(&palette[0].hex, 255, 0, 0, 1);
	}

	#[test]
	fn half_red_half_blue_gives_two_even_colors() {
		let mut pixels = vec![Srgb::new(255u8, 0, 0); 250];
		pixels.extend(vec![Srgb::new(0u8, 0, 255); 250]);

		let palette = palette_from_srgb(&pixels, 10.0, &PaletteOptions::default());

		assert_eq!(palette.len(), 2);
		for color in &palette {
			assert_relative_eq!(color.percentage, 50.0, epsilon = 0.1);
		}

		let mut reds = palette
			.iter()
			.map(|color| parse_hex(&color.hex).0)
			.collect::<Vec<_>>();
		reds.sort_unstable();
		assert!(reds[0] <= 1 && reds[1] >= 254);
	}

	#[test]
	fn uniform_gray_triggers_seeding_fallback() {
		// every point coincides with the first centroid, so k-means++
		// falls back to uniform picks rather than failing
		let pixels = vec![Srgb::new(128u8, 128, 128); 300];
		let palette = palette_from_srgb(&pixels, 10.0, &PaletteOptions::default());

		assert_eq!(palette.len(), 1);
		assert_eq!(palette[0].percentage, 100.0);
		assert_hex_near(&palette[0].hex, 128, 128, 128, 1);
	}

	#[test]
	fn saturated_hues_are_kept_over_blends() {
		let mut pixels = vec![Srgb::new(255u8, 0, 0); 300];
		pixels.extend(vec![Srgb::new(0u8, 0, 255); 200]);
		pixels.extend(vec![Srgb::new(0u8, 255, 0); 100]);

		let options = PaletteOptions {
			num_colors: 2,
			..PaletteOptions::default()
		};
		let palette = palette_from_srgb(&pixels, 50.0, &options);

		assert_eq!(palette.len(), 2);
		assert_hex_near(&palette[0].hex, 255, 0, 0, 1);
		assert_hex_near(&palette[1].hex, 0, 0, 255, 1);
		assert_relative_eq!(palette[0].percentage, 60.0, epsilon = 0.1);
		assert_relative_eq!(palette[1].percentage, 40.0, epsilon = 0.1);
	}

	#[test]
	fn identical_runs_are_deterministic() {
		let pixels = test_colors();

		for mode in [ClusteringMode::Kmeans, ClusteringMode::MeanShift] {
			let options = PaletteOptions {
				num_colors: 5,
				mode,
				..PaletteOptions::default()
			};

			let first = palette_from_srgb(&pixels, 10.0, &options);
			let second = palette_from_srgb(&pixels, 10.0, &options);
			assert_eq!(first, second);
			assert!(!first.is_empty());
		}
	}

	#[test]
	fn output_respects_num_colors_and_similarity() {
		let pixels = test_colors();
		let options = PaletteOptions {
			num_colors: 6,
			..PaletteOptions::default()
		};

		let palette = palette_from_srgb(&pixels, 10.0, &options);
		assert!(!palette.is_empty() && palette.len() <= 6);

		// pairwise distance of accepted colors stays >= the threshold
		let oklab = palette
			.iter()
			.map(|color| {
				let (r, g, b) = parse_hex(&color.hex);
				srgb_to_oklab(Srgb::new(r, g, b))
			})
			.collect::<Vec<_>>();
		for i in 0..oklab.len() {
			for j in (i + 1)..oklab.len() {
				// hex quantization can nudge each channel by one unit
				assert!(squared_distance(oklab[i], oklab[j]).sqrt() >= 0.15 - 0.02);
			}
		}
	}

	#[test]
	fn mean_shift_splits_well_separated_colors() {
		let mut pixels = vec![Srgb::new(255u8, 0, 0); 100];
		pixels.extend(vec![Srgb::new(0u8, 0, 255); 100]);

		let options = PaletteOptions {
			mode: ClusteringMode::MeanShift,
			..PaletteOptions::default()
		};
		let palette = palette_from_srgb(&pixels, 10.0, &options);

		assert_eq!(palette.len(), 2);
		for color in &palette {
			assert_relative_eq!(color.percentage, 50.0, epsilon = 0.1);
		}
	}

	#[test]
	fn mean_shift_uniform_image_gives_single_color() {
		let pixels = vec![Srgb::new(40u8, 180, 90); 250];
		let options = PaletteOptions {
			mode: ClusteringMode::MeanShift,
			..PaletteOptions::default()
		};
		let palette = palette_from_srgb(&pixels, 10.0, &options);

		assert_eq!(palette.len(), 1);
		assert_eq!(palette[0].percentage, 100.0);
		assert_hex_near(&palette[0].hex, 40, 180, 90, 1);
	}
}
