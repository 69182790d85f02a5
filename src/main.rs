use std::io::Cursor;
use std::path::PathBuf;

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tiff::encoder::{TiffEncoder, colortype};

use xtc_pipeline_rs::logger;
use xtc_pipeline_rs::xtc_pipeline::quantize::level_to_gray;
use xtc_pipeline_rs::xtc_pipeline::{
    BookManifest, ConversionConfig, ConversionSession, DevicePreset, FrameSource, MetadataRecord,
    PageFormat, QuantizedRaster, ReadDirection, TiffFrameReader, XtcReader,
};

use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "xtc", version, about = "Build and inspect XTC e-reader containers")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert rendered TIFF pages into an XTC container.
    Convert(ConvertArgs),
    /// Print a container's layout and check it for structural defects.
    Inspect(InspectArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DeviceArg {
    X4,
    X3,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    /// 1-bit XTG pages
    Mono,
    /// 2-bit XTH pages
    Gray4,
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    /// Page images in reading order (8-bit or 16-bit grayscale, or RGB TIFF).
    #[arg(value_name = "PAGE", required = true)]
    pages: Vec<PathBuf>,

    /// Output container path.
    #[arg(short, long)]
    out: PathBuf,

    /// Book manifest JSON with metadata, chapters and default options.
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Target device.
    #[arg(long, value_enum, conflicts_with_all = ["width", "height"])]
    device: Option<DeviceArg>,

    /// Custom screen width in pixels.
    #[arg(long, requires = "height")]
    width: Option<u16>,

    /// Custom screen height in pixels.
    #[arg(long, requires = "width")]
    height: Option<u16>,

    /// Page format.
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Dither strength, 0-100.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    dither: Option<u8>,

    /// Invert the tone curve.
    #[arg(long, default_value_t = false)]
    invert: bool,

    /// Mark the book as read right to left.
    #[arg(long, default_value_t = false)]
    rtl: bool,

    /// Book title, overriding the manifest.
    #[arg(long)]
    title: Option<String>,

    /// Image to store as the container thumbnail.
    #[arg(long)]
    thumbnail: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Container to inspect.
    path: PathBuf,

    /// Page to decode (0-based).
    #[arg(long)]
    page: Option<usize>,

    /// Write the decoded page as an 8-bit grayscale TIFF.
    #[arg(long, requires = "page")]
    dump: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    logger::init();

    let cli = Cli::parse();
    let result = match cli.cmd {
        Command::Convert(args) => cmd_convert(args),
        Command::Inspect(args) => cmd_inspect(args),
    };
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn cmd_convert(args: ConvertArgs) -> anyhow::Result<()> {
    let manifest = match &args.manifest {
        Some(path) => BookManifest::from_path(path)
            .with_context(|| format!("load manifest '{}'", path.display()))?,
        None => BookManifest::default(),
    };

    let mut builder = manifest
        .apply(ConversionConfig::builder())
        .expected_pages(Some(args.pages.len()));
    if let Some(device) = args.device {
        builder = builder.preset(match device {
            DeviceArg::X4 => DevicePreset::X4,
            DeviceArg::X3 => DevicePreset::X3,
        });
    }
    if let (Some(width), Some(height)) = (args.width, args.height) {
        builder = builder.preset(DevicePreset::Custom { width, height });
    }
    if let Some(format) = args.format {
        builder = builder.format(match format {
            FormatArg::Mono => PageFormat::Mono,
            FormatArg::Gray4 => PageFormat::Gray4,
        });
    }
    if let Some(dither) = args.dither {
        builder = builder.dither_strength(dither);
    }
    if args.invert {
        builder = builder.invert(true);
    }
    if args.rtl {
        builder = builder.read_direction(ReadDirection::RightToLeft);
    }
    let config = builder.build();

    let mut metadata: MetadataRecord = manifest.metadata.clone();
    if let Some(title) = &args.title {
        metadata.title = title.clone();
    }
    if metadata.title.is_empty() {
        if let Some(stem) = args.out.file_stem() {
            metadata.title = stem.to_string_lossy().into_owned();
        }
    }

    if let Some(parent) = args.out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir '{}'", parent.display()))?;
        }
    }

    let mut session = ConversionSession::new(config, &args.out)
        .with_context(|| format!("start conversion to '{}'", args.out.display()))?;
    let config = session.config();
    info!(
        preset = ?config.preset,
        format = ?config.format,
        dither = config.dither_strength,
        invert = config.invert,
        direction = ?config.read_direction,
        pages = args.pages.len(),
        "Converting"
    );
    session.set_metadata(metadata)?;
    session.set_chapters(manifest.chapters.clone())?;

    let reader = TiffFrameReader;
    for (index, path) in args.pages.iter().enumerate() {
        let data = std::fs::read(path).with_context(|| format!("read page '{}'", path.display()))?;
        let frame = reader
            .read_frame(&data)
            .with_context(|| format!("decode page '{}'", path.display()))?;
        session
            .push(index, frame)
            .with_context(|| format!("convert page {} ('{}')", index, path.display()))?;
    }

    if let Some(path) = &args.thumbnail {
        let data = std::fs::read(path).with_context(|| format!("read thumbnail '{}'", path.display()))?;
        let frame = reader
            .read_frame(&data)
            .with_context(|| format!("decode thumbnail '{}'", path.display()))?;
        session.set_thumbnail_frame(&frame)?;
    }

    let summary = session.finish().context("finalize container")?;
    info!(
        path = %summary.path.display(),
        pages = summary.page_count,
        bytes = summary.total_bytes,
        "Conversion successful"
    );
    Ok(())
}

fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let mut reader = XtcReader::open(&args.path)
        .with_context(|| format!("open container '{}'", args.path.display()))?;

    let header = *reader.header();
    println!("File: {}", args.path.display());
    println!("Format: {:?}", header.format);
    println!("Pages: {}", header.page_count);
    println!("Read direction: {:?}", header.read_direction);
    println!("Size: {} bytes", reader.file_len());

    if let Some(meta) = reader.metadata()? {
        println!("Title: {}", meta.title);
        if !meta.author.is_empty() {
            println!("Author: {}", meta.author);
        }
        if !meta.publisher.is_empty() {
            println!("Publisher: {}", meta.publisher);
        }
        if !meta.language.is_empty() {
            println!("Language: {}", meta.language);
        }
        if let Some(cover) = meta.cover_page {
            println!("Cover page: {}", cover);
        }
    }
    if let Some(thumb) = reader.thumbnail()? {
        println!("Thumbnail: {}x{}", thumb.header.width, thumb.header.height);
    }
    for (chapter, end) in reader.chapters()? {
        println!("Chapter: {} (pages {}-{})", chapter.title, chapter.start_page, end);
    }

    if let Some(index) = args.page {
        let entry = reader.page_entry(index)?;
        println!(
            "Page {}: {}x{} at offset {}, {} bytes",
            index, entry.width, entry.height, entry.offset, entry.size
        );
        if let Some(out) = &args.dump {
            let raster = reader.decode_page(index)?;
            let tiff_bytes = page_to_tiff(&raster)
                .with_context(|| format!("encode page {} as TIFF", index))?;
            std::fs::write(out, tiff_bytes)
                .with_context(|| format!("write '{}'", out.display()))?;
            println!("Wrote {}", out.display());
        }
    }

    let findings = reader.validate()?;
    if findings.is_empty() {
        println!("No structural defects found");
        return Ok(());
    }
    for finding in &findings {
        println!("Defect: {}", finding);
    }
    bail!("{} structural defect(s) in '{}'", findings.len(), args.path.display())
}

/// Renders decoded levels as an 8-bit grayscale TIFF.
fn page_to_tiff(raster: &QuantizedRaster) -> tiff::TiffResult<Vec<u8>> {
    let gray: Vec<u8> = raster
        .data
        .iter()
        .map(|&level| level_to_gray(level, raster.levels))
        .collect();
    let mut out = Cursor::new(Vec::new());
    let mut encoder = TiffEncoder::new(&mut out)?;
    encoder.write_image::<colortype::Gray8>(raster.width as u32, raster.height as u32, &gray)?;
    drop(encoder);
    Ok(out.into_inner())
}
