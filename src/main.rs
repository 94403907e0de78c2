mod common;
mod error;
mod freezer;
mod manifest;
mod ui;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use crate::common::platform::EnvironmentContext;
use crate::common::process::SystemRunner;
use crate::freezer::{BuildFlags, Workflow};
use crate::manifest::Manifest;
use crate::ui::prelude::*;

/// Exit status for samples that cannot run here.
const EXIT_UNSUPPORTED: i32 = -1;

/// Install everything a freezer sample needs to be built and tested
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Sample name, a directory under samples/
    sample: String,

    /// Only install the project's build requirements
    #[arg(long)]
    basic_requirements: bool,

    /// Activate debug mode
    #[arg(short, long)]
    debug: bool,

    /// Install the freezer from the checkout in development mode
    #[arg(long)]
    develop: bool,

    /// Like --develop, also unpacking the bases from a locally built wheel
    #[arg(long)]
    editable: bool,

    /// Install the latest released freezer
    #[arg(long)]
    latest: bool,

    /// Verbose build output
    #[arg(long)]
    verbose: bool,

    /// Project root containing pyproject.toml and ci/build-test.json
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Python interpreter to install into
    #[arg(long, global = true, env = "PYTHON", default_value = "python")]
    python: String,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

impl Cli {
    fn flags(&self) -> BuildFlags {
        BuildFlags {
            develop: self.develop,
            editable: self.editable,
            latest: self.latest,
            verbose: self.verbose,
        }
    }
}

fn run(cli: &Cli) -> Result<i32> {
    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("Project root {} not found", cli.root.display()))?;
    let manifest = Manifest::load(&root.join("ci").join("build-test.json"))?;
    let mut record = manifest.sample(&cli.sample)?;

    let ctx = EnvironmentContext::detect(&cli.python)?;
    emit(
        Level::Debug,
        "env.detected",
        &format!("{} Python {} ({:?})", ctx.platform, ctx.interpreter.python_version, ctx.manager),
        None,
    );

    if !record.supports(ctx.platform) {
        emit(
            Level::Info,
            "sample.unsupported",
            &format!("Sample '{}' does not run on {}", cli.sample, ctx.platform),
            None,
        );
        return Ok(EXIT_UNSUPPORTED);
    }

    let mut runner = SystemRunner;
    if cli.basic_requirements {
        Workflow::new(&root, &ctx, &mut runner, cli.flags()).install_requires(None)?;
        return Ok(0);
    }

    if ctx.pipenv_active {
        for (enabled, option) in [(cli.develop, "--develop"), (cli.editable, "--editable")] {
            if enabled {
                emit(
                    Level::Error,
                    "cli.pipenv_conflict",
                    &format!("{} option not valid using pipenv", option),
                    None,
                );
                return Ok(EXIT_UNSUPPORTED);
            }
        }
    }

    let job = record.take_job();
    emit(Level::Debug, "cli.args", &format!("args: {:?}", cli), None);
    emit(
        Level::Debug,
        "cli.data",
        &format!("data: {}", serde_json::Value::Object(record.other.clone())),
        None,
    );
    emit(Level::Debug, "cli.kw", &format!("kw: {:?} {:?}", job, cli.flags()), None);

    enter_sample_dir(&root, &cli.sample)?;
    Workflow::new(&root, &ctx, &mut runner, cli.flags()).install_requires(Some(job))?;
    Ok(0)
}

/// Sample-relative paths such as `find_links` resolve from the sample dir.
fn enter_sample_dir(root: &Path, sample: &str) -> Result<()> {
    let dir = freezer::sample_dir(root, sample)?;
    std::env::set_current_dir(&dir).with_context(|| format!("Failed to enter {}", dir.display()))
}

fn main() {
    let cli = Cli::parse();

    ui::init(cli.output, !cli.no_color);
    ui::set_debug_mode(cli.debug);

    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            emit(Level::Error, "cli.error", &format!("Error: {:#}", e), None);
            std::process::exit(1);
        }
    }
}
