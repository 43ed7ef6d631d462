//! Pull CLI - npm packages and container images
//!
//! Usage:
//!   pull npm [package...]            Download packages and all their dependencies
//!   pull image [image...]            Pull images into tar archives
//!   pull tags <image>                List the tags of an image repository
//!
//! Without arguments, `npm` and `image` read identifiers interactively until
//! `done` is entered.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use levitate_pull::core::config::{
    DEFAULT_BLOB_READ_TIMEOUT_SECS, DEFAULT_DOCKER_AUTH, DEFAULT_DOCKER_REGISTRY,
    DEFAULT_DOCKER_SERVICE, DEFAULT_DOWNLOAD_DIR, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_NPM_REGISTRY,
};
use levitate_pull::docker::{
    ImagePuller, ImageReference, PlatformEntry, PlatformPreference, PullReport, Selector,
};
use levitate_pull::npm::{DependencyWalker, NpmRegistry, PackageSpec, WalkReport};
use levitate_pull::{output, Config, TerminalProgress};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Ends interactive input
const SENTINEL: &str = "done";

#[derive(Parser)]
#[command(name = "pull")]
#[command(about = "Download npm packages with their dependencies and container images as archives")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root of the download tree
    #[arg(short, long, global = true, env = "PULL_DOWNLOAD_DIR", default_value = DEFAULT_DOWNLOAD_DIR)]
    download_dir: PathBuf,

    /// npm registry base URL
    #[arg(long, global = true, env = "PULL_NPM_REGISTRY", default_value = DEFAULT_NPM_REGISTRY)]
    npm_registry: String,

    /// Image registry base URL
    #[arg(long, global = true, env = "PULL_DOCKER_REGISTRY", default_value = DEFAULT_DOCKER_REGISTRY)]
    docker_registry: String,

    /// Token endpoint of the image registry
    #[arg(long, global = true, env = "PULL_DOCKER_AUTH", default_value = DEFAULT_DOCKER_AUTH)]
    docker_auth: String,

    /// Service name sent to the token endpoint
    #[arg(long, global = true, env = "PULL_DOCKER_SERVICE", default_value = DEFAULT_DOCKER_SERVICE)]
    docker_service: String,

    /// Request timeout in seconds (5-300)
    #[arg(short, long, global = true, env = "PULL_HTTP_TIMEOUT", default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
    timeout: u64,

    /// Per-read timeout in seconds while streaming blobs (5-3600)
    #[arg(long, global = true, env = "PULL_BLOB_TIMEOUT", default_value_t = DEFAULT_BLOB_READ_TIMEOUT_SECS)]
    blob_timeout: u64,

    /// Log every request (same as RUST_LOG=levitate_pull=debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download packages and everything they depend on
    Npm {
        /// name, name@version, name@range or name@tag
        packages: Vec<String>,
    },

    /// Pull images into tar archives
    Image {
        /// name, name:tag or name@digest
        images: Vec<String>,

        /// Platform to pick from multi-platform images, e.g. linux/amd64
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// List the tags of an image repository
    Tags {
        /// Image name
        image: String,
    },
}

impl Cli {
    fn config(&self) -> Config {
        Config::default()
            .with_download_dir(&self.download_dir)
            .with_npm_registry(self.npm_registry.as_str())
            .with_docker_registry(self.docker_registry.as_str())
            .with_docker_auth(self.docker_auth.as_str(), self.docker_service.as_str())
            .with_timeout_secs(self.timeout)
            .with_blob_read_timeout_secs(self.blob_timeout)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = cli.config();

    let failures = match cli.command {
        Commands::Npm { packages } => pull_packages(&config, packages)?,
        Commands::Image { images, platform } => pull_images(&config, images, platform.as_deref())?,
        Commands::Tags { image } => {
            list_tags(&config, &image)?;
            0
        }
    };

    if failures > 0 {
        bail!("{} item(s) failed", failures);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("levitate_pull=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn pull_packages(config: &Config, packages: Vec<String>) -> Result<usize> {
    // One walker for the whole batch so shared dependencies download once.
    let mut walker = DependencyWalker::new(NpmRegistry::new(config), config.npm_dir())
        .with_progress(Box::new(TerminalProgress::new()));

    for_each_input(packages, "package", |input| {
        let spec = PackageSpec::parse(input)?;
        let report = walker
            .acquire_spec(&spec)
            .with_context(|| format!("failed to acquire {}", spec))?;
        summarize_walk(&report);
        Ok(())
    })
}

fn summarize_walk(report: &WalkReport) {
    let downloaded = report.downloaded().count();
    let present = report.already_present().count();
    if downloaded == 0 && present == 0 {
        output::skip("already handled in this session");
        return;
    }
    output::success(&format!(
        "{} downloaded, {} already present",
        downloaded, present
    ));
    if !report.is_clean() {
        output::warning(&format!(
            "{} dependency issue(s), {} unsatisfied",
            report.issues.len(),
            report.unsatisfied_count()
        ));
    }
}

fn pull_images(config: &Config, images: Vec<String>, platform: Option<&str>) -> Result<usize> {
    let mut selector: Box<dyn Selector> = match platform {
        Some(p) => Box::new(PlatformPreference::parse(p)?),
        None => Box::new(PromptSelector),
    };
    let mut puller = ImagePuller::new(config).with_progress(Box::new(TerminalProgress::new()));

    for_each_input(images, "image", |input| {
        let image: ImageReference = input.parse()?;
        let report = puller
            .pull(&image, selector.as_mut())
            .with_context(|| format!("failed to pull {}", image))?;
        summarize_pull(&report);
        Ok(())
    })
}

fn summarize_pull(report: &PullReport) {
    let message = format!(
        "{} -> {} ({}/{} layers)",
        report.image,
        report.archive.display(),
        report.layers_written,
        report.layers_total
    );
    if report.is_complete() {
        output::success(&message);
    } else {
        output::warning(&format!(
            "incomplete archive {}, {} blob(s) missing",
            message,
            report.failures.len()
        ));
    }
}

fn list_tags(config: &Config, image: &str) -> Result<()> {
    let image: ImageReference = image.parse()?;
    let tags = ImagePuller::new(config)
        .list_tags(&image)
        .with_context(|| format!("failed to list tags of {}", image))?;
    if tags.is_empty() {
        output::info(&format!("{} has no tags", image.repository));
        return Ok(());
    }
    output::info(&format!("{} tag(s) for {}", tags.len(), image.repository));
    for tag in &tags {
        output::list_item(tag, "");
    }
    Ok(())
}

/// Run `handle` for each argument, or for each line typed until the sentinel.
///
/// Arguments are numbered `(i/n)` as they run. A failing item is reported
/// and counted; the rest still run.
fn for_each_input(
    args: Vec<String>,
    what: &str,
    mut handle: impl FnMut(&str) -> Result<()>,
) -> Result<usize> {
    let mut failures = 0;
    let mut run = |input: &str| {
        if let Err(err) = handle(input) {
            output::error(&format!("{:#}", err));
            failures += 1;
        }
    };

    if args.is_empty() {
        let prompt = format!("{} ('{}' to finish): ", what, SENTINEL);
        while let Some(line) = read_line(&prompt)? {
            let input = line.trim();
            if input.is_empty() {
                output::warning(&format!("{} cannot be empty", what));
                continue;
            }
            if input == SENTINEL {
                break;
            }
            output::action(&format!("Pulling {}", input));
            run(input);
        }
    } else {
        let inputs: Vec<&str> = args.iter().map(|a| a.trim()).collect();
        let skipped = inputs.iter().filter(|i| i.is_empty()).count();
        if skipped > 0 {
            output::warning(&format!("skipping {} empty {} argument(s)", skipped, what));
        }
        let total = inputs.len() - skipped;
        for (i, input) in inputs.into_iter().filter(|i| !i.is_empty()).enumerate() {
            output::action_numbered(i + 1, total, &format!("Pulling {}", input));
            run(input);
        }
    }

    Ok(failures)
}

/// Prompt on stderr and read one line; `None` at end of input.
fn read_line(prompt: &str) -> io::Result<Option<String>> {
    let mut stderr = io::stderr();
    write!(stderr, "{}", prompt)?;
    stderr.flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

/// Asks on the terminal whenever a pull needs a platform or a tag.
struct PromptSelector;

impl PromptSelector {
    /// Numbered choice among `items`; `None` if input ends.
    fn choose(&self, title: &str, items: &[String]) -> Option<usize> {
        output::info(title);
        for (i, item) in items.iter().enumerate() {
            output::list_item(&format!("{:>3})", i + 1), item);
        }
        let prompt = format!("choose 1-{}: ", items.len());
        loop {
            let line = match read_line(&prompt) {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) => return None,
            };
            match line.trim().parse::<usize>() {
                Ok(n) if (1..=items.len()).contains(&n) => return Some(n - 1),
                _ => output::warning(&format!("enter a number between 1 and {}", items.len())),
            }
        }
    }
}

impl Selector for PromptSelector {
    fn select_platform(&mut self, image: &ImageReference, entries: &[PlatformEntry]) -> Option<usize> {
        let items: Vec<String> = entries.iter().map(|e| e.platform.to_string()).collect();
        self.choose(&format!("{} is available for several platforms", image), &items)
    }

    fn select_tag(&mut self, image: &ImageReference, tags: &[String]) -> Option<String> {
        let idx = self.choose(&format!("{} has no 'latest' tag", image.repository), tags)?;
        tags.get(idx).cloned()
    }
}
