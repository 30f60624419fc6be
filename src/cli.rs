use bmtree::{convert, BmError, Config, Format, IdPolicy, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::OnceLock;

fn get_exe_name() -> &'static str {
    static EXE_NAME: OnceLock<String> = OnceLock::new();
    EXE_NAME.get_or_init(|| {
        std::env::args()
            .next()
            .as_ref()
            .map(std::path::Path::new)
            .and_then(|path| path.file_name())
            .and_then(|name| name.to_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "bmconv".to_string())
    })
}

#[derive(Parser, Debug)]
#[command(
    name = "bmconv",
    about = "BM file converter",
    long_about = None,
    disable_version_flag = true
)]
pub struct Cli {
    /// Show the program version and exit
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    /// Format of SOURCE (chrome, json, sqlite)
    #[arg(short = 'f', long = "from", value_name = "FORMAT")]
    pub from: Option<String>,

    /// Format of DESTINATION (json, sqlite)
    #[arg(short = 't', long = "to", value_name = "FORMAT")]
    pub to: Option<String>,

    /// List the formats that can be read
    #[arg(long)]
    pub list_input_formats: bool,

    /// List the formats that can be written
    #[arg(long)]
    pub list_output_formats: bool,

    /// Optional custom configuration file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// What to do with colliding node ids (reject, renumber)
    #[arg(long, value_name = "POLICY")]
    pub id_policy: Option<String>,

    /// Show debug information
    #[arg(short = 'g', long = "debug")]
    pub debug: bool,

    /// File to read
    #[arg(name = "SOURCE")]
    pub source: Option<PathBuf>,

    /// File to write, replaced atomically
    #[arg(name = "DESTINATION")]
    pub destination: Option<PathBuf>,
}

fn resolve_format(name: Option<&str>, fallback: Option<Format>, flag: &str) -> Result<Format> {
    match name {
        Some(name) => name.parse(),
        None => fallback.ok_or_else(|| {
            BmError::InvalidInput(format!(
                "missing {} format, try '{} --help'",
                flag,
                get_exe_name()
            ))
        }),
    }
}

fn format_list(formats: &[Format]) -> String {
    formats
        .iter()
        .map(Format::name)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run the command described by `args`
pub fn handle_args(args: Cli, mut config: Config) -> Result<()> {
    if args.version {
        println!("BM file converter {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if args.list_input_formats {
        println!("{}", format_list(&Format::INPUTS));
        return Ok(());
    }
    if args.list_output_formats {
        println!("{}", format_list(&Format::OUTPUTS));
        return Ok(());
    }

    if let Some(policy) = args.id_policy.as_deref() {
        config.id_policy = IdPolicy::from_string(policy)
            .ok_or_else(|| BmError::InvalidInput(format!("Unknown id policy '{}'", policy)))?;
    }
    let from = resolve_format(args.from.as_deref(), config.default_from, "source")?;
    let to = resolve_format(args.to.as_deref(), config.default_to, "destination")?;

    let (source, destination) = match (args.source, args.destination) {
        (Some(source), Some(destination)) => (source, destination),
        _ => {
            return Err(BmError::InvalidInput(format!(
                "SOURCE and DESTINATION are required, try '{} --help'",
                get_exe_name()
            )))
        }
    };

    let report = convert(&source, from, &destination, to, &config)?;
    log::info!(
        "Wrote {} folders and {} urls to {}",
        report.folders,
        report.urls,
        destination.display()
    );
    Ok(())
}
