//! Extract a palette of perceptually distinct dominant colors from an image
//! by chroma-weighted clustering in the Oklab color space.

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
	clippy::pedantic,
	clippy::cargo,
	clippy::use_debug,
	clippy::dbg_macro,
	clippy::todo,
	clippy::unimplemented,
	clippy::unwrap_used,
	clippy::unwrap_in_result,
	clippy::unneeded_field_pattern,
	clippy::rest_pat_in_fully_bound_structs,
	clippy::unnecessary_self_imports,
	clippy::str_to_string,
	clippy::string_to_string,
	clippy::string_slice,
	missing_docs,
	clippy::missing_docs_in_private_items,
	rustdoc::all,
	clippy::float_cmp_const,
	clippy::lossy_float_literal
)]
#![allow(
	clippy::doc_markdown,
	clippy::module_name_repetitions,
	clippy::many_single_char_names,
	clippy::missing_panics_doc,
	clippy::unreadable_literal
)]

mod cli;

#[allow(clippy::wildcard_imports)]
use cli::*;

use std::{
	fmt::{self, Display},
	path::Path,
	process::ExitCode,
	time::Instant,
};

use clap::Parser;
use colored::Colorize;
use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbaImage};
use okpalette::{ClusteringMode, MeanShiftOptions, PaletteColor, PaletteOptions};
use palette::Srgb;

/// The widest or tallest image accepted, matching a 4096x4096 pixel budget
const MAX_DIMENSION: u32 = 4096;

/// Pixels with an alpha below this are treated as transparent and excluded
const MIN_OPAQUE_ALPHA: u8 = 128;

/// Record the running time of a function and print the elapsed time
macro_rules! time {
	($name: literal, $verbose: expr, $func_call: expr) => {{
		let start = Instant::now();
		let result = $func_call;
		if $verbose {
			println!("{} took {}ms", $name, start.elapsed().as_millis());
		}
		result
	}};
}

/// Error cases for loading and validating an image
#[derive(Debug)]
enum ImageLoadError {
	/// Failed to read or decode the image file
	ImageLoad(image::ImageError),
	/// The image dimensions exceed the supported pixel budget
	ImageTooLarge {
		/// Reported image width
		width: u32,
		/// Reported image height
		height: u32,
	},
}

impl Display for ImageLoadError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			ImageLoadError::ImageLoad(e) => write!(f, "Failed to load the image file: {e}"),
			ImageLoadError::ImageTooLarge { width, height } => write!(
				f,
				"The image is {width}x{height}, but at most {MAX_DIMENSION}x{MAX_DIMENSION} is supported"
			),
		}
	}
}

fn main() -> ExitCode {
	let options = Options::parse();

	let result = run_extract_and_print_palette(&options);

	// Returning Result<_> uses Debug printing instead of Display
	if let Err(e) = result {
		eprintln!("{e}");
		ExitCode::FAILURE
	} else {
		ExitCode::SUCCESS
	}
}

/// Builds a thread pool and then runs `extract_and_print_palette`
#[cfg(feature = "threads")]
fn run_extract_and_print_palette(options: &Options) -> Result<(), ImageLoadError> {
	let pool = rayon::ThreadPoolBuilder::new()
		.num_threads(usize::from(options.threads))
		.build()
		.expect("initialized thread pool");

	pool.install(|| extract_and_print_palette(options))
}

/// Runs `extract_and_print_palette` on a single thread
#[cfg(not(feature = "threads"))]
fn run_extract_and_print_palette(options: &Options) -> Result<(), ImageLoadError> {
	extract_and_print_palette(options)
}

/// Load an image, extract its dominant colors, and print the result using the given options
fn extract_and_print_palette(options: &Options) -> Result<(), ImageLoadError> {
	// Input
	let img = time!("Image loading", options.verbose, load_image(&options.image))?;
	let img = time!(
		"Downsampling",
		options.verbose,
		resize_working(img, options.resize_width)
	);
	let pixels = opaque_pixels(&img.to_rgba8());

	if options.verbose {
		println!(
			"Clustering {} opaque pixels from a {}x{} working image",
			pixels.len(),
			img.width(),
			img.height()
		);
	}

	// Processing
	let palette = time!(
		"Clustering",
		options.verbose,
		okpalette::palette_from_srgb(&pixels, options.chroma_weight, &palette_options(options))
	);

	// Output
	print_palette(&palette, options);

	Ok(())
}

/// Check the image header and load the image at the given path
fn load_image(path: &Path) -> Result<DynamicImage, ImageLoadError> {
	// Reject oversized images from the header alone, before decoding the pixel data
	let (width, height) = image::image_dimensions(path).map_err(ImageLoadError::ImageLoad)?;
	validate_dimensions(width, height)?;

	image::open(path).map_err(ImageLoadError::ImageLoad)
}

/// Ensure the image dimensions fit the supported pixel budget
fn validate_dimensions(width: u32, height: u32) -> Result<(), ImageLoadError> {
	if width > MAX_DIMENSION || height > MAX_DIMENSION {
		Err(ImageLoadError::ImageTooLarge { width, height })
	} else {
		Ok(())
	}
}

/// Downsample the image to the working width, preserving the aspect ratio
///
/// Clustering cost scales with the number of unique colors, and a small
/// working image keeps the dominant color ranking intact.
fn resize_working(image: DynamicImage, resize_width: u32) -> DynamicImage {
	let (width, height) = image.dimensions();
	if width == resize_width {
		return image;
	}

	// truncated aspect-ratio height, kept at a minimum of one row
	#[allow(clippy::cast_possible_truncation)]
	let new_height =
		u32::max(1, (u64::from(resize_width) * u64::from(height) / u64::from(width)) as u32);

	image.resize_exact(resize_width, new_height, FilterType::Lanczos3)
}

/// Collect the opaque pixels of the working image, dropping transparent ones
fn opaque_pixels(image: &RgbaImage) -> Vec<Srgb<u8>> {
	image
		.pixels()
		.filter(|pixel| pixel.0[3] >= MIN_OPAQUE_ALPHA)
		.map(|pixel| Srgb::new(pixel.0[0], pixel.0[1], pixel.0[2]))
		.collect()
}

/// Map the CLI options onto the library's palette options
fn palette_options(options: &Options) -> PaletteOptions {
	PaletteOptions {
		num_colors: options.num_colors,
		similarity_threshold: options.similarity_threshold,
		seed: options.seed,
		mode: match options.mode {
			Mode::Kmeans => ClusteringMode::Kmeans,
			Mode::MeanShift => ClusteringMode::MeanShift,
		},
		mean_shift: MeanShiftOptions {
			bandwidth: options.bandwidth,
			..MeanShiftOptions::default()
		},
		..PaletteOptions::default()
	}
}

/// Render a percentage with one decimal place for a JSON document
fn json_percentage(percentage: f32) -> f64 {
	(f64::from(percentage) * 10.0).round() / 10.0
}

/// Build the `{"colors": [...]}` JSON document for the palette
fn palette_json(palette: &[PaletteColor]) -> serde_json::Value {
	serde_json::json!({
		"colors": palette
			.iter()
			.map(|color| {
				serde_json::json!({
					"hex": color.hex,
					"percentage": json_percentage(color.percentage),
				})
			})
			.collect::<Vec<_>>(),
	})
}

/// Print the given palette based off the provided options
fn print_palette(palette: &[PaletteColor], options: &Options) {
	match options.output {
		FormatOutput::Hex => print_lines(palette, options, |color| color.hex.clone()),

		FormatOutput::Rgb => print_lines(palette, options, |color| {
			format!(
				"({},{},{})",
				color.srgb.red, color.srgb.green, color.srgb.blue
			)
		}),

		FormatOutput::Swatch => {
			for color in palette {
				let swatch = "   ".on_truecolor(color.srgb.red, color.srgb.green, color.srgb.blue);
				println!("{swatch} {:>5.1}%", color.percentage);
			}
		},

		FormatOutput::Json => println!("{}", palette_json(palette)),
	}
}

/// Print one line per color using the given format, colorized per the options
fn print_lines(palette: &[PaletteColor], options: &Options, format: impl Fn(&PaletteColor) -> String) {
	for color in palette {
		let text = format(color);
		let text = match options.colorize {
			Some(ColorizeOutput::Fg) => text
				.truecolor(color.srgb.red, color.srgb.green, color.srgb.blue)
				.to_string(),
			Some(ColorizeOutput::Bg) => text
				.on_truecolor(color.srgb.red, color.srgb.green, color.srgb.blue)
				.to_string(),
			None => text,
		};
		println!("{text} {:>5.1}%", color.percentage);
	}
}
