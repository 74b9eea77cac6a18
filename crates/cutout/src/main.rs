//! cutout: inspect segmentation masks and extract cutouts from image files.
//!
//! Runs the same mask algebra the browser uses on files saved to disk.
//! Masks may be RGBA (alpha is the inclusion indicator) or grayscale
//! (luma is read as alpha).
//!
//! # Usage
//!
//! ```text
//! cutout bounds mask.png
//! cutout overlay mask.png -o overlay.png --color '#ff8800'
//! cutout extract photo.jpg mask.png -o subject.webp --trim --padding 8
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use cutout_core::{
    DEFAULT_JPEG_QUALITY, EncodeFormat, ExtractOptions, OverlayColor, PixelMask, RgbaImage,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Mask inspection and cutout extraction.
#[derive(Parser)]
#[command(name = "cutout", version)]
struct Cli {
    /// Log at debug level (overrides `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the content bounds of a mask as JSON (`null` if empty).
    Bounds {
        /// Mask image.
        mask: PathBuf,
    },

    /// Tint a mask's content with a solid color.
    Overlay {
        /// Mask image.
        mask: PathBuf,

        /// Output file; the format follows the extension.
        #[arg(short, long)]
        output: PathBuf,

        /// Tint color as `#rrggbb`, `rrggbb` or `#rgb`.
        #[arg(long, default_value_t = OverlayColor::default())]
        color: OverlayColor,
    },

    /// Cut an image out with a mask.
    Extract {
        /// Source image (PNG, JPEG, BMP, WebP).
        image: PathBuf,

        /// Mask image; scaled to the source with nearest-neighbour lookup.
        mask: PathBuf,

        /// Output file; the format follows the extension.
        #[arg(short, long)]
        output: PathBuf,

        /// Crop to the non-transparent content.
        #[arg(long)]
        trim: bool,

        /// Margin in pixels kept around the content when trimming.
        #[arg(long, default_value_t = 0)]
        padding: u32,

        /// JPEG quality (1-100).
        #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: u8,

        /// Full extract options as a JSON string.
        ///
        /// When provided, `--trim` and `--padding` are ignored. The JSON
        /// must be a valid `ExtractOptions` serialization.
        #[arg(long)]
        config_json: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Build [`ExtractOptions`] from the flags, or from `--config-json` when
/// given.
fn extract_options(
    trim: bool,
    padding: u32,
    config_json: Option<&str>,
) -> anyhow::Result<ExtractOptions> {
    if let Some(json) = config_json {
        return serde_json::from_str(json).context("parsing --config-json");
    }
    Ok(ExtractOptions {
        trim_to_content: trim,
        padding,
    })
}

/// Pick the encoding from the output file extension.
fn output_format(path: &Path) -> anyhow::Result<EncodeFormat> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    match EncodeFormat::from_extension(ext) {
        Some(format) => Ok(format),
        None => bail!(
            "cannot infer an output format from {} (use .png, .jpg or .webp)",
            path.display()
        ),
    }
}

fn read_mask(path: &Path) -> anyhow::Result<PixelMask> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mask = cutout_core::decode_mask(&bytes)
        .with_context(|| format!("decoding mask {}", path.display()))?;
    debug!(
        path = %path.display(),
        width = mask.width(),
        height = mask.height(),
        "mask loaded"
    );
    Ok(mask)
}

fn read_image(path: &Path) -> anyhow::Result<RgbaImage> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let image = cutout_core::decode_rgba(&bytes)
        .with_context(|| format!("decoding image {}", path.display()))?;
    debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "image loaded"
    );
    Ok(image)
}

fn write_raster(raster: &RgbaImage, path: &Path, quality: u8) -> anyhow::Result<()> {
    let format = output_format(path)?;
    let bytes = cutout_core::encode_raster(raster, format, quality)
        .with_context(|| format!("encoding {}", path.display()))?;
    std::fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?;
    info!(
        path = %path.display(),
        width = raster.width(),
        height = raster.height(),
        bytes = bytes.len(),
        "wrote {}",
        format.mime_type()
    );
    Ok(())
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Bounds { mask } => {
            let mask = read_mask(&mask)?;
            let bounds = cutout_core::compute_bounds(&mask);
            println!("{}", serde_json::to_string(&bounds)?);
        }
        Command::Overlay {
            mask,
            output,
            color,
        } => {
            let mask = read_mask(&mask)?;
            let overlay = cutout_core::composite_overlay(&mask, color);
            write_raster(&overlay, &output, DEFAULT_JPEG_QUALITY)?;
        }
        Command::Extract {
            image,
            mask,
            output,
            trim,
            padding,
            quality,
            config_json,
        } => {
            let options = extract_options(trim, padding, config_json.as_deref())?;
            // Fail on a bad extension before decoding anything.
            output_format(&output)?;
            let image = read_image(&image)?;
            let mask = read_mask(&mask)?;
            if mask.width() != image.width() || mask.height() != image.height() {
                debug!(
                    mask_width = mask.width(),
                    mask_height = mask.height(),
                    "mask will be scaled to the image"
                );
            }
            let cutout = cutout_core::apply_mask_to_image(&image, &mask, &options);
            write_raster(&cutout, &output, quality)?;
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli.command)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_build_options() {
        let options = extract_options(true, 6, None).unwrap();
        assert_eq!(
            options,
            ExtractOptions {
                trim_to_content: true,
                padding: 6,
            }
        );
    }

    #[test]
    fn config_json_overrides_flags() {
        let options = extract_options(false, 0, Some(r#"{"trim_to_content":true}"#)).unwrap();
        assert!(options.trim_to_content);
        assert_eq!(options.padding, 0);
    }

    #[test]
    fn bad_config_json_is_an_error() {
        let err = extract_options(false, 0, Some("{not json")).unwrap_err();
        assert!(err.to_string().contains("--config-json"));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(output_format(Path::new("a/b.PNG")).unwrap(), EncodeFormat::Png);
        assert_eq!(output_format(Path::new("x.jpeg")).unwrap(), EncodeFormat::Jpeg);
        assert_eq!(output_format(Path::new("x.webp")).unwrap(), EncodeFormat::WebP);
        assert!(output_format(Path::new("x.tiff")).is_err());
        assert!(output_format(Path::new("noext")).is_err());
    }

    #[test]
    fn parses_extract_invocation() {
        let cli = Cli::try_parse_from([
            "cutout",
            "extract",
            "photo.jpg",
            "mask.png",
            "-o",
            "out.png",
            "--trim",
            "--padding",
            "4",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Extract {
                trim,
                padding,
                quality,
                ..
            } => {
                assert!(trim);
                assert_eq!(padding, 4);
                assert_eq!(quality, DEFAULT_JPEG_QUALITY);
            }
            _ => unreachable!("parsed as extract"),
        }
    }

    #[test]
    fn overlay_color_flag_parses_hex() {
        let cli =
            Cli::try_parse_from(["cutout", "overlay", "m.png", "-o", "o.png", "--color", "#f80"])
                .unwrap();
        match cli.command {
            Command::Overlay { color, .. } => assert_eq!(color, OverlayColor::new(255, 136, 0)),
            _ => unreachable!("parsed as overlay"),
        }
    }

    #[test]
    fn quality_out_of_range_is_rejected() {
        assert!(
            Cli::try_parse_from([
                "cutout", "extract", "i.png", "m.png", "-o", "o.jpg", "--quality", "0",
            ])
            .is_err()
        );
    }
}
