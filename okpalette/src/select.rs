//! Greedy palette selection: ranking, near-duplicate removal, renormalization

use crate::{oklab_to_srgb, squared_distance, Clusters};
use palette::{Oklab, Srgb};

/// A single palette entry
#[derive(Debug, Clone, PartialEq)]
pub struct PaletteColor {
	/// Lowercase `#rrggbb` hex code
	pub hex: String,
	/// The color as an sRGB triple
	pub srgb: Srgb<u8>,
	/// Share of the image's pixels, in percent with one decimal place
	pub percentage: f32,
}

/// A cluster candidate awaiting selection
struct Candidate {
	/// The cluster center in Oklab space
	oklab: Oklab,
	/// The center converted back to an sRGB triple
	srgb: Srgb<u8>,
	/// Number of pixels in the cluster
	count: u32,
}

/// Format an sRGB triple as a lowercase `#rrggbb` hex code
fn hex_code(srgb: Srgb<u8>) -> String {
	format!("#{:02x}{:02x}{:02x}", srgb.red, srgb.green, srgb.blue)
}

/// Round a percentage to one decimal place
fn round_percentage(percentage: f64) -> f32 {
	#[allow(clippy::cast_possible_truncation)]
	{
		((percentage * 10.0).round() / 10.0) as f32
	}
}

/// Rank the clusters by pixel mass, greedily drop colors within
/// `similarity_threshold` (Oklab distance) of an already accepted color, and
/// rescale the accepted percentages to sum to 100.
///
/// Returns at most `num_colors` entries, largest cluster first; empty iff
/// `total_pixels` is zero.
pub(crate) fn select_palette(
	clusters: &Clusters,
	total_pixels: u64,
	num_colors: u8,
	similarity_threshold: f32,
) -> Vec<PaletteColor> {
	if total_pixels == 0 {
		return Vec::new();
	}

	let mut candidates = clusters
		.centroids
		.iter()
		.zip(&clusters.counts)
		.map(|(&oklab, &count)| Candidate {
			oklab,
			srgb: oklab_to_srgb(oklab),
			count,
		})
		.collect::<Vec<_>>();

	// stable sort keeps the original cluster order on ties
	candidates.sort_by_key(|candidate| std::cmp::Reverse(candidate.count));

	let mut selected: Vec<&Candidate> = Vec::new();
	for candidate in &candidates {
		if selected.len() >= usize::from(num_colors) {
			break;
		}

		let distinct = selected.iter().all(|accepted| {
			squared_distance(candidate.oklab, accepted.oklab).sqrt() >= similarity_threshold
		});

		if distinct {
			selected.push(candidate);
		}
	}

	// cast is lossless: total_pixels is the sum of u32 counts
	#[allow(clippy::cast_precision_loss)]
	let total = total_pixels as f64;
	let percentages = selected
		.iter()
		.map(|candidate| f64::from(candidate.count) / total * 100.0)
		.collect::<Vec<_>>();

	// rescale so the accepted subset sums to 100; an all-zero subset
	// (possible only for pathological inputs) is reported as-is
	let accepted_total: f64 = percentages.iter().sum();
	#[allow(clippy::float_cmp)]
	let scale = if accepted_total == 0.0 {
		1.0
	} else {
		100.0 / accepted_total
	};

	selected
		.iter()
		.zip(percentages)
		.map(|(candidate, percentage)| PaletteColor {
			hex: hex_code(candidate.srgb),
			srgb: candidate.srgb,
			percentage: round_percentage(percentage * scale),
		})
		.collect()
}
