use std::{
    ffi::{OsStr, OsString},
    fs::{self, create_dir_all, File},
    io::{self, stdout, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use bootimg_unpack::{
    field_files, report, BootImage, BootImageHeader, ExtractSummary, Segment, SegmentKind,
    SegmentSink, UnpackOptions,
};
use clap::{Parser, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Unpack a legacy Android boot image into its kernel, ramdisk, second
/// bootloader, device tree and signature, plus one file per header value
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the boot or recovery image
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory of the unpacked files
    #[arg(short, long, default_value = "./")]
    output: PathBuf,

    /// Page size in hexadecimal, overriding the one in the header
    #[arg(short, long = "pagesize", value_parser = parse_hex)]
    pagesize: Option<u32>,

    /// Text output format
    #[arg(value_enum, long, default_value_t = TextOutputFormat::Info)]
    format: TextOutputFormat,

    /// Output null-terminated argument strings
    #[arg(short = '0', long)]
    null: bool,

    /// Log every segment as it is extracted
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum TextOutputFormat {
    /// Board variables, one `NAME value` pair per line
    Info,
    /// Output shell-escaped (quoted) argument strings that can be used to
    /// reconstruct the boot image using `mkbootimg`
    Mkbootimg,
}

fn parse_hex(s: &str) -> Result<u32, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid hexadecimal page size: {e}"))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    let file = File::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let options = UnpackOptions {
        page_size: args.pagesize,
        ..Default::default()
    };
    let mut img = BootImage::open(BufReader::new(file), &options)
        .with_context(|| format!("Failed to read header of {}", args.input.display()))?;

    let image_name = args
        .input
        .file_name()
        .context("Input path has no file name")?
        .to_owned();
    let outputs = OutputFiles {
        dir: &args.output,
        image_name: &image_name,
    };

    if args.format == TextOutputFormat::Info {
        for line in console_lines(img.magic_offset(), img.header()) {
            println!("{line}");
        }
    }

    create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    for (suffix, contents) in field_files(img.header()) {
        let path = outputs.path(suffix);
        write_file(&path, &contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let mut sink = FileSink {
        outputs: &outputs,
        written: Vec::new(),
    };
    let summary = img
        .extract(&mut sink)
        .with_context(|| format!("Failed to unpack {}", args.input.display()))?;
    info!(
        consumed = summary.consumed,
        files = sink.written.len(),
        "Unpacked image"
    );

    if args.format == TextOutputFormat::Mkbootimg {
        print_mkbootimg_args(img.header(), &summary, &outputs, args.null)?;
    }

    Ok(())
}

/// Lines of the `info` console report. The magic offset is only mentioned
/// when the image has a preamble.
fn console_lines(magic_offset: u64, hdr: &BootImageHeader) -> Vec<String> {
    let mut lines = Vec::new();
    if magic_offset > 0 {
        lines.push(format!("Android magic found at: {magic_offset}"));
    }
    lines.extend(report(hdr).iter().map(ToString::to_string));
    lines
}

/// Names output files `<dir>/<image name>-<suffix>`.
struct OutputFiles<'a> {
    dir: &'a Path,
    image_name: &'a OsStr,
}

impl OutputFiles<'_> {
    fn path(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.image_name);
        name.push("-");
        name.push(suffix);
        self.dir.join(name)
    }
}

fn write_file(path: &Path, data: &[u8]) -> io::Result<()> {
    write_with(path, |w| w.write_all(data))
}

/// Creates a new file at `path` and fills it with `f`, removing the file
/// again if anything fails.
fn write_with<F>(path: &Path, f: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let result = File::create(path).and_then(|file| {
        let mut w = BufWriter::new(file);
        f(&mut w)?;
        w.flush()
    });
    if result.is_err() {
        let _ = fs::remove_file(path);
    }
    result
}

struct FileSink<'a> {
    outputs: &'a OutputFiles<'a>,
    written: Vec<PathBuf>,
}

impl SegmentSink for FileSink<'_> {
    fn write_segment(&mut self, segment: Segment) -> io::Result<()> {
        let path = self.outputs.path(segment.kind.file_suffix());
        debug!(path = %path.display(), size = segment.data.len(), "Writing segment");
        write_file(&path, &segment.data)?;
        self.written.push(path);
        Ok(())
    }
}

fn print_mkbootimg_args(
    hdr: &BootImageHeader,
    summary: &ExtractSummary,
    outputs: &OutputFiles,
    null: bool,
) -> Result<()> {
    let mut args: Vec<(&str, Vec<u8>)> = Vec::new();
    for info in &summary.segments {
        let flag = match info.kind {
            SegmentKind::Kernel => "--kernel",
            SegmentKind::Ramdisk => "--ramdisk",
            SegmentKind::Second => "--second",
            SegmentKind::DeviceTree => "--dt",
            SegmentKind::Signature => continue,
        };
        let path = outputs.path(info.kind.file_suffix());
        args.push((flag, path.into_os_string().into_encoded_bytes()));
    }
    args.push(("--cmdline", hdr.cmdline().to_vec()));
    args.push(("--board", hdr.board_name().to_vec()));
    args.push(("--base", format!("0x{:08x}", hdr.base()).into_bytes()));
    args.push(("--pagesize", hdr.page_size.to_string().into_bytes()));
    args.push((
        "--kernel_offset",
        format!("0x{:08x}", hdr.kernel_offset()).into_bytes(),
    ));
    args.push((
        "--ramdisk_offset",
        format!("0x{:08x}", hdr.ramdisk_offset()).into_bytes(),
    ));
    args.push((
        "--second_offset",
        format!("0x{:08x}", hdr.second_offset()).into_bytes(),
    ));
    args.push((
        "--tags_offset",
        format!("0x{:08x}", hdr.tags_offset()).into_bytes(),
    ));

    let sep = if null { b'\0' } else { b' ' };
    let q = shlex::bytes::Quoter::new();
    let mut out = Vec::new();
    for (i, (flag, value)) in args.iter().enumerate() {
        if i > 0 {
            out.push(sep);
        }
        out.extend_from_slice(flag.as_bytes());
        out.push(sep);
        if null {
            out.extend_from_slice(value);
        } else {
            let quoted = q
                .quote(value)
                .with_context(|| format!("Cannot quote value of {flag}"))?;
            out.extend_from_slice(&quoted);
        }
    }
    out.push(if null { b'\0' } else { b'\n' });

    stdout()
        .lock()
        .write_all(&out)
        .context("Failed to write to stdout")
}
