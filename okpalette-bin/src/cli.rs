//! Specifies the CLI and handles arg parsing

use clap::{Parser, ValueEnum};
use std::{
	fmt::{Debug, Display},
	num::ParseFloatError,
	ops::RangeBounds,
	path::PathBuf,
	str::FromStr,
};

/// Supported output formats for the final colors
#[derive(Copy, Clone, ValueEnum)]
pub enum FormatOutput {
	/// sRGB hexcode with percentage
	Hex,
	/// sRGB (r,g,b) triple with percentage
	Rgb,
	/// Whitespace with true color background
	Swatch,
	/// A single {"colors": [{"hex", "percentage"}, ...]} JSON object
	Json,
}

/// The clustering strategy to run
#[derive(Copy, Clone, ValueEnum)]
pub enum Mode {
	/// Chroma-weighted k-means with k-means++ seeding
	Kmeans,
	/// Mean shift with automatic cluster count discovery
	MeanShift,
}

/// Ways to colorize the output text
#[derive(Copy, Clone, ValueEnum)]
pub enum ColorizeOutput {
	/// Foreground
	Fg,
	/// Background
	Bg,
}

/// Extract a palette of perceptually distinct dominant colors from an image
/// by chroma-weighted clustering in the Oklab color space.
///
/// Saturated colors are weighted more heavily than near-gray ones, and
/// near-duplicate clusters are dropped so each returned color is visually
/// distinct from the rest.
#[derive(Parser)]
#[command(version)]
pub struct Options {
	/// The path to the input image
	pub image: PathBuf,

	/// The maximum number of colors to extract
	#[arg(short, long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(2..=10))]
	pub num_colors: u8,

	/// The clustering strategy
	///
	/// kmeans extracts exactly up to --num-colors colors; mean-shift discovers
	/// the number of clusters on its own and then keeps at most --num-colors
	/// of them.
	#[arg(short, long, default_value = "kmeans")]
	pub mode: Mode,

	/// The format to print the colors in
	#[arg(short, long, default_value = "hex")]
	pub output: FormatOutput,

	/// Color the foreground or background for each printed color
	#[arg(short, long)]
	pub colorize: Option<ColorizeOutput>,

	/// How strongly saturated colors pull cluster centers
	///
	/// Each pixel is weighted by 1 + chroma * chroma-weight, so higher values
	/// emphasize vivid accent colors over large muted areas. Use 0 to weight
	/// all pixels equally.
	#[arg(short = 'w', long, default_value_t = 10.0, value_parser = parse_valid_chroma_weight)]
	pub chroma_weight: f32,

	/// The minimum Oklab distance between any two returned colors
	///
	/// Clusters closer than this to an already accepted color are skipped.
	#[arg(short = 't', long, default_value_t = 0.15, value_parser = parse_valid_similarity)]
	pub similarity_threshold: f32,

	/// The mean-shift kernel bandwidth
	///
	/// Larger bandwidths merge more colors into fewer clusters.
	/// Only used with --mode mean-shift.
	#[arg(short = 'b', long, default_value_t = 0.04, value_parser = parse_valid_bandwidth)]
	pub bandwidth: f32,

	/// The width, in pixels, the image is downsampled to before clustering
	///
	/// Clustering cost grows with the number of unique colors, and a small
	/// working image is enough to rank its dominant colors.
	#[arg(long, default_value_t = 150, value_parser = clap::value_parser!(u32).range(1..))]
	pub resize_width: u32,

	/// The seed value used for the random number generator
	#[arg(long, default_value_t = 42)]
	pub seed: u64,

	/// The number of threads to use, 0 for all
	#[cfg(feature = "threads")]
	#[arg(long, default_value_t = 0)]
	pub threads: u8,

	/// Print additional information, such as the running time of each step
	#[arg(long)]
	pub verbose: bool,
}

/// Parse a float value and ensure it in the provided, valid range
fn parse_float_in_range<T>(s: &str, range: impl RangeBounds<T> + Debug) -> Result<T, String>
where
	T: FromStr<Err = ParseFloatError> + Display + PartialOrd,
{
	let value: T = s.parse().map_err(|e| format!("{e}"))?;
	if range.contains(&value) {
		Ok(value)
	} else {
		Err(format!("{value} is not in {range:?}"))
	}
}

/// Parse the chroma weight and ensure it is >= `0.0`
fn parse_valid_chroma_weight(s: &str) -> Result<f32, String> {
	parse_float_in_range(s, 0.0..)
}

/// Parse the similarity threshold and ensure it is >= `0.0`
fn parse_valid_similarity(s: &str) -> Result<f32, String> {
	parse_float_in_range(s, 0.0..)
}

/// Parse the bandwidth and ensure it is > `0.0`
fn parse_valid_bandwidth(s: &str) -> Result<f32, String> {
	let value = parse_float_in_range(s, 0.0..)?;
	if value > 0.0 {
		Ok(value)
	} else {
		Err("bandwidth must be greater than 0".to_owned())
	}
}
