//! jxlexp CLI - progressive JPEG XL style frame decoder.
//!
//! Decodes codestreams to raw, PPM/PGM or PFM output and inspects their frame
//! headers and section layout.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use jxlexp_rs::decoder::{DecompressParams, Decoder};
use jxlexp_rs::frame_header::FrameEncoding;
use jxlexp_rs::image::ImageBundle;

/// Progressive decoder for JPEG XL style codestreams
#[derive(Parser)]
#[command(name = "jxlexp")]
#[command(author = "jxlexp-rs contributors")]
#[command(version)]
#[command(about = "Progressive frame decoder for VarDCT and Modular codestreams", long_about = None)]
#[command(after_help = "EXAMPLES:
    jxlexp decode -i image.jxl -o pixels.raw
    jxlexp decode -i image.jxl -o image.ppm -f ppm --threads 4
    jxlexp decode -i truncated.jxl -o preview.ppm -f ppm --allow-partial
    jxlexp decode -i image.jxl -o dc.pfm -f pfm --preview
    jxlexp info -i image.jxl

Set RUST_LOG (e.g. RUST_LOG=jxlexp_rs=trace) for detailed decoder logs.")]
struct Cli {
    /// Log scheduler decisions at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a codestream to pixels
    ///
    /// Every displayed frame is written; with more than one frame the frame
    /// index is appended to the output file name.
    #[command(visible_alias = "d")]
    Decode {
        #[arg(short, long, help = "Path to the input codestream")]
        input: PathBuf,

        #[arg(short, long, help = "Path for the output file")]
        output: PathBuf,

        /// Output format: raw (8-bit interleaved), ppm (PPM/PGM) or pfm (float)
        #[arg(short, long, default_value = "raw", value_enum)]
        format: OutputFormat,

        /// Decode at most this many passes per group
        #[arg(long)]
        max_passes: Option<usize>,

        /// Accept truncated codestreams and partially present sections
        #[arg(long)]
        allow_partial: bool,

        /// Decode only the 1:8 DC image
        #[arg(long)]
        preview: bool,

        /// Worker threads (0 decodes on the calling thread)
        #[arg(short, long, default_value = "0")]
        threads: usize,
    },

    /// Display image metadata, frame headers and section layout
    #[command(visible_alias = "i")]
    Info {
        #[arg(short, long, help = "Path to the codestream to inspect")]
        input: PathBuf,
    },

    /// List the supported coding tools
    #[command(visible_alias = "l")]
    List,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Raw 8-bit interleaved samples
    Raw,
    /// Portable PixMap / GrayMap
    Ppm,
    /// Portable FloatMap
    Pfm,
}

fn main() {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Decode {
            input,
            output,
            format,
            max_passes,
            allow_partial,
            preview,
            threads,
        } => {
            let params = DecompressParams {
                allow_partial_files: allow_partial,
                allow_more_progressive_steps: allow_partial,
                max_passes: max_passes.unwrap_or(usize::MAX),
                max_downsampling: if preview { 8 } else { 1 },
                num_threads: threads,
                ..Default::default()
            };
            decode_image(&input, &output, &format, params)
        }
        Commands::Info { input } => show_info(&input),
        Commands::List => list_tools(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn decode_image(
    input: &PathBuf,
    output: &PathBuf,
    format: &OutputFormat,
    params: DecompressParams,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    let mut decoder = Decoder::new(params)?;
    let (_, frames) = decoder.decode(&data)?;
    if frames.is_empty() {
        return Err("codestream has no displayed frame".into());
    }

    for (i, frame) in frames.iter().enumerate() {
        let path = if frames.len() == 1 {
            output.clone()
        } else {
            numbered_path(output, i)
        };
        let image = &frame.image;
        match format {
            OutputFormat::Raw => fs::write(&path, image.to_u8_interleaved())?,
            OutputFormat::Ppm => write_ppm(&path, image)?,
            OutputFormat::Pfm => write_pfm(&path, image)?,
        }
        println!(
            "✓ Decoded {}x{} frame ({} channels, {} bytes of sections) to {:?}",
            image.xsize,
            image.ysize,
            image.color.len(),
            image.decoded_bytes,
            path
        );
    }
    Ok(())
}

fn numbered_path(path: &PathBuf, index: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}-{}", stem, index),
    };
    path.with_file_name(name)
}

fn show_info(input: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;

    println!("File: {:?}", input);
    println!("Size: {} bytes", data.len());
    println!();

    let mut decoder = Decoder::new(DecompressParams::default())?;
    let (metadata, frames) = decoder.inspect(&data)?;
    println!("Image:");
    println!("  Dimensions: {}x{}", metadata.xsize, metadata.ysize);
    println!("  Bit depth:  {} bits", metadata.bit_depth);
    println!("  Channels:   {} color, {} extra", metadata.num_color_channels(), metadata.num_extra_channels());
    println!("  XYB:        {}", if metadata.xyb_encoded { "Yes" } else { "No" });
    println!("  Animation:  {}", if metadata.have_animation { "Yes" } else { "No" });

    for (i, frame) in frames.iter().enumerate() {
        let header = &frame.header;
        let layout = &frame.layout;
        println!();
        println!("Frame {}:", i);
        println!("  Type:       {:?}", header.frame_type);
        println!(
            "  Encoding:   {}",
            match header.encoding {
                FrameEncoding::VarDct => "VarDCT",
                FrameEncoding::Modular => "Modular",
            }
        );
        println!("  Size:       {}x{}", header.frame_size.0, header.frame_size.1);
        println!("  Passes:     {}", header.passes.num_passes);
        println!("  Groups:     {} AC, {} DC", layout.num_groups, layout.num_dc_groups);
        println!(
            "  Sections:   {}{}",
            frame.section_sizes.len(),
            if layout.is_single_section() { " (single)" } else { "" }
        );
        println!("  Last:       {}", if header.is_last { "Yes" } else { "No" });
        let mut offset = frame.sections_start;
        for (id, &size) in frame.section_sizes.iter().enumerate() {
            let kind = if layout.is_single_section() {
                "whole frame".to_string()
            } else {
                format!("{:?}", layout.classify(id)?)
            };
            println!("    [{:>3}] @{:<8} {:>8} bytes  {}", id, offset, size, kind);
            offset += size as usize;
        }
    }
    Ok(())
}

fn list_tools() -> Result<(), Box<dyn std::error::Error>> {
    println!("Supported Coding Tools:");
    println!();
    println!("  VarDCT");
    println!("    Transforms: DCT8");
    println!("    Features:   Adaptive DC smoothing, chroma from luma, Gaborish, EPF");
    println!("    Targets:    Pixels, JPEG coefficients");
    println!();
    println!("  Modular");
    println!("    Features:   Resolution levels per pass, YCoCg-R");
    println!();
    println!("  Frame features");
    println!("    Patches, Splines, Noise, Blending, Reference and DC frames");
    println!();
    Ok(())
}

fn write_ppm(path: &PathBuf, image: &ImageBundle) -> Result<(), Box<dyn std::error::Error>> {
    use std::io::Write;
    let mut file = fs::File::create(path)?;

    if image.color.len() == 1 {
        writeln!(file, "P5")?;
    } else {
        writeln!(file, "P6")?;
    }
    writeln!(file, "{} {}", image.xsize, image.ysize)?;
    writeln!(file, "255")?;
    file.write_all(&image.to_u8_interleaved())?;

    Ok(())
}

fn write_pfm(path: &PathBuf, image: &ImageBundle) -> Result<(), Box<dyn std::error::Error>> {
    use std::io::Write;
    let mut file = fs::File::create(path)?;

    let gray = image.color.len() == 1;
    writeln!(file, "{}", if gray { "Pf" } else { "PF" })?;
    writeln!(file, "{} {}", image.xsize, image.ysize)?;
    // Negative scale marks little-endian samples.
    writeln!(file, "-1.0")?;
    let mut bytes = Vec::with_capacity(image.xsize * image.ysize * image.color.len() * 4);
    // PFM rows run bottom to top.
    for y in (0..image.ysize).rev() {
        for x in 0..image.xsize {
            for plane in &image.color {
                bytes.extend_from_slice(&plane.get(x, y).to_le_bytes());
            }
        }
    }
    file.write_all(&bytes)?;

    Ok(())
}
