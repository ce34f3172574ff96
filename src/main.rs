use clap::{CommandFactory, Parser, error::ErrorKind};
use siteark::archive::{PackedArchiveWriter, StorageEngine};
use siteark::config::{self, ConfigError};
use siteark::output;
use siteark::source::EntrySource;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "siteark")]
#[command(version)]
#[command(about = "Pack a directory of static web content into an offline archive")]
#[command(long_about = "\
Pack a directory of static web content into an offline archive

Every file under HTML_DIRECTORY becomes an entry. HTML pages go to
namespace A, images and other binary files to I, stylesheets, scripts and
fonts to -. Links inside HTML and CSS are rewritten so they resolve inside
the archive, and small fonts referenced from CSS are inlined.

Options can also be given in a TOML file with --config; command-line values
take precedence.

Example:

  siteark --welcome=index.html --favicon=m/favicon.png --language=fra \\
      --title=foobar --description=mydescription \\
      --creator=Wikipedia --publisher=Kiwix ./my_site_directory/ ./my.ark")]
struct Cli {
    /// Path of the default page, relative to HTML_DIRECTORY
    #[arg(short, long)]
    welcome: Option<String>,

    /// Path of the favicon (48x48 PNG), relative to HTML_DIRECTORY
    #[arg(short, long)]
    favicon: Option<String>,

    /// Language code of the content (ISO 639-3)
    #[arg(short, long)]
    language: Option<String>,

    /// Title of the archive
    #[arg(short, long)]
    title: Option<String>,

    /// Short description of the content
    #[arg(short, long)]
    description: Option<String>,

    /// Creator of the content
    #[arg(short, long)]
    creator: Option<String>,

    /// Creator of the archive itself
    #[arg(short, long)]
    publisher: Option<String>,

    /// Minimum cluster size in bytes [default: 2048]
    #[arg(short, long = "minchunksize", value_name = "BYTES")]
    min_chunk_size: Option<u32>,

    /// Inflate gzip/zlib compressed HTML files
    #[arg(short = 'x', long = "inflateHtml")]
    inflate_html: bool,

    /// Put all content in namespace A
    #[arg(short, long = "uniqueNamespace")]
    unique_namespace: bool,

    /// Redirects file: url<TAB>title<TAB>target_url per line
    #[arg(short, long, value_name = "FILE")]
    redirects: Option<String>,

    /// Layout page wrapped around every HTML page, relative to HTML_DIRECTORY
    #[arg(long)]
    layout: Option<String>,

    /// Maximum template expansion depth [default: 10]
    #[arg(long = "maxrecurse", value_name = "DEPTH")]
    max_recurse: Option<u32>,

    /// TOML file with build options
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print progress information
    #[arg(short, long)]
    verbose: bool,

    /// Directory with the content to pack
    #[arg(value_name = "HTML_DIRECTORY")]
    source: PathBuf,

    /// Archive to write
    #[arg(value_name = "ARCHIVE_FILE")]
    output: PathBuf,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    setup_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("siteark: {err}");
            if let Some(ConfigError::Missing(_)) = err.downcast_ref::<ConfigError>() {
                eprintln!("{}", Cli::command().render_usage());
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut layers = Vec::new();
    if let Some(path) = &cli.config {
        layers.push(config::load_config_file(path)?);
    }
    layers.push(cli_overlay(cli));
    let config = config::resolve_config(layers)?;
    config.check_inputs(&cli.source)?;

    info!(
        source = %cli.source.display(),
        output = %cli.output.display(),
        "building archive"
    );
    let writer = PackedArchiveWriter::new(config.min_chunk_size);
    let mut source = EntrySource::start(&cli.source, config)?;
    let stats = writer.create(&mut source, &cli.output)?;

    output::print_build_summary(&stats, source.counters(), &source.main_page(), &cli.output);
    Ok(())
}

/// The options given on the command line, as a sparse config layer.
fn cli_overlay(cli: &Cli) -> toml::Value {
    let mut table = toml::Table::new();
    let strings = [
        ("welcome", &cli.welcome),
        ("favicon", &cli.favicon),
        ("language", &cli.language),
        ("title", &cli.title),
        ("description", &cli.description),
        ("creator", &cli.creator),
        ("publisher", &cli.publisher),
        ("redirects", &cli.redirects),
        ("layout", &cli.layout),
    ];
    for (key, value) in strings {
        if let Some(value) = value {
            table.insert(key.into(), toml::Value::String(value.clone()));
        }
    }
    if let Some(size) = cli.min_chunk_size {
        table.insert("min_chunk_size".into(), toml::Value::Integer(i64::from(size)));
    }
    if let Some(depth) = cli.max_recurse {
        table.insert("max_recurse".into(), toml::Value::Integer(i64::from(depth)));
    }
    if cli.inflate_html {
        table.insert("inflate_html".into(), toml::Value::Boolean(true));
    }
    if cli.unique_namespace {
        table.insert("unique_namespace".into(), toml::Value::Boolean(true));
    }
    toml::Value::Table(table)
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("siteark=debug,warn")
        } else {
            EnvFilter::new("siteark=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
