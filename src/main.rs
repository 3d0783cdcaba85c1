use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use docx_assembler::{Config, Generator, HeaderFooter};
use log::{info, LevelFilter, Metadata, Record};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input HTML file (any fragment or full document).
    #[arg(long)]
    html_file: PathBuf,

    /// Output .docx path.
    #[arg(long)]
    out: PathBuf,

    /// Template name, looked up in the configured template directories.
    #[arg(long)]
    template: Option<String>,

    /// HTML rendered into the page header.
    #[arg(long)]
    header_file: Option<PathBuf>,

    /// HTML rendered into the page footer.
    #[arg(long)]
    footer_file: Option<PathBuf>,

    /// Map classes to paragraph styles and honor text alignment.
    #[arg(long)]
    extras: bool,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn read_html(path: &Path) -> Result<String> {
    let mut html = String::new();
    File::open(path)
        .with_context(|| format!("open {}", path.display()))?
        .read_to_string(&mut html)
        .with_context(|| format!("read {}", path.display()))?;
    Ok(html)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("load config {}", path.display()))?,
        None => Config::default(),
    };

    let html = read_html(&args.html_file)?;
    let mut header_footer = HeaderFooter::new();
    if let Some(path) = &args.header_file {
        header_footer = header_footer.header(read_html(path)?);
    }
    if let Some(path) = &args.footer_file {
        header_footer = header_footer.footer(read_html(path)?);
    }

    let docx = Generator::new(config)
        .create(&html, args.template.as_deref(), args.extras, &header_footer)
        .with_context(|| format!("generate {}", args.out.display()))?;

    fs::write(&args.out, &docx).with_context(|| format!("write {}", args.out.display()))?;
    info!("wrote {} ({} bytes)", args.out.display(), docx.len());
    Ok(())
}
