use anyhow::{Result, bail};
use clap::Parser;
use dreadlock_instrument::config::{load_excludes, parse_indent, resolve_formatter};
use dreadlock_instrument::driver::{self, Mode, RunConfig, Sink};
use dreadlock_instrument::{BANNER, Instrumenter, init_logger, logger};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = BANNER)]
struct Cli {
    /// Indent value for each scope level (`\t` or `<tab>` for a tab)
    #[arg(short, long, default_value = "    ", allow_hyphen_values = true)]
    indent: String,

    /// Instrument each module to use Dreadlock (the default)
    #[arg(short, long, conflicts_with = "revert")]
    apply: bool,

    /// Reverse the Dreadlock instrumentation of one or more modules
    #[arg(short, long)]
    revert: bool,

    /// Instrument modules without the ability to revert changes
    #[arg(short = 'R', long)]
    disable_revert: bool,

    /// Overwrite the original file with the result
    #[arg(short, long)]
    overwrite: bool,

    /// Print each module's scope map instead of instrumenting it
    #[arg(short, long)]
    debug: bool,

    /// Run each module through clang-format before processing
    #[arg(short, long)]
    sanitize: bool,

    /// Formatter executable (defaults to $CLANG_FORMAT_EXE, then clang-format)
    #[arg(long, value_name = "EXE")]
    clang_format: Option<PathBuf>,

    /// Exclude a mutex or a module; a file argument lists mutex names
    #[arg(short = 'x', long = "exclude", value_name = "NAME|FILE")]
    excludes: Vec<String>,

    /// Align additions to previous indents, if possible; use scope level otherwise
    #[arg(short = 'A', long)]
    align: bool,

    /// Perform all processing, but do not generate output
    #[arg(short = 'D', long)]
    dry_run: bool,

    /// Write a JSON-lines trace of rewrite decisions ("{timestamp}" is expanded)
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,

    /// Modules to process (glob patterns are expanded)
    files: Vec<String>,
}

impl Cli {
    fn into_config(self) -> Result<(RunConfig, Vec<String>)> {
        let excludes = load_excludes(&self.excludes)?;

        let mut instrumenter = Instrumenter::new()
            .indent(parse_indent(&self.indent)?)
            .align(self.align)
            .revert_markers(!self.disable_revert)
            .excludes(excludes.iter().cloned());
        if self.sanitize {
            instrumenter = instrumenter.sanitize_with(resolve_formatter(self.clang_format.as_deref()));
        }

        let mode = if self.debug {
            Mode::Debug
        } else if self.apply || !self.revert {
            Mode::Instrument
        } else {
            Mode::Revert
        };

        let sink = if self.dry_run {
            Sink::DryRun
        } else if self.overwrite {
            Sink::Overwrite
        } else {
            Sink::Stdout
        };

        let config = RunConfig {
            mode,
            sink,
            instrumenter,
            excluded_files: excludes,
        };
        Ok((config, self.files))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    eprintln!("{BANNER}\n");

    init_logger(cli.log.as_ref())?;
    if let Some(path) = logger::get_current_log_file() {
        eprintln!("Tracing rewrite decisions to '{}'", path.display());
    }
    let (config, files) = cli.into_config()?;

    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    let summary = driver::run(&config, &files, &mut stdout.lock(), &mut stderr.lock())?;

    let failed = summary.failed();
    if failed > 0 {
        bail!("{failed} file(s) could not be processed");
    }
    Ok(())
}
