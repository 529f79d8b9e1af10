use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::completion::DocumentLanguage;
use crate::{
    Error, Result, DEFAULT_OUTPUT, DEFAULT_RETRY_DELAY_MS, DEFAULT_SNIPPETS_DIR,
    DEFAULT_TIMEOUT_SECS, DEFAULT_WORKERS, DOCS_BASE_URL, POLICY_GENERATOR_URL, SERVICES_PAGE,
};

/// Scrape service principals from AWS documentation and the policy generator.
#[derive(Debug, Clone, Parser)]
#[command(name = "svc-principals", version, about)]
pub struct Config {
    /// Output file name, written inside the snippets directory
    #[arg(long = "output", env = "SVC_PRINCIPALS_OUTPUT", default_value = DEFAULT_OUTPUT)]
    pub output_file: String,

    /// Number of parallel workers scraping service pages
    #[arg(long, env = "SVC_PRINCIPALS_WORKERS", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Directory the output file is written to (created if missing)
    #[arg(long, env = "SVC_PRINCIPALS_SNIPPETS_DIR", default_value = DEFAULT_SNIPPETS_DIR)]
    pub snippets_dir: PathBuf,

    /// Base URL of the IAM user guide
    #[arg(long, env = "SVC_PRINCIPALS_DOCS_BASE_URL", default_value = DOCS_BASE_URL)]
    pub docs_base_url: String,

    /// Page listing the services that work with IAM, relative to the base URL
    #[arg(long, env = "SVC_PRINCIPALS_SERVICES_PAGE", default_value = SERVICES_PAGE)]
    pub services_page: String,

    /// Policy generator script embedding the service map
    #[arg(long, env = "SVC_PRINCIPALS_POLICY_GENERATOR_URL", default_value = POLICY_GENERATOR_URL)]
    pub policy_generator_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "SVC_PRINCIPALS_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Pause between policy generator attempts, in milliseconds
    #[arg(long, env = "SVC_PRINCIPALS_RETRY_DELAY_MS", default_value_t = DEFAULT_RETRY_DELAY_MS)]
    pub retry_delay_ms: u64,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the known principals if the cursor sits inside a principal block
    Suggest {
        /// Document being edited
        file: PathBuf,
        /// Zero-based cursor line
        #[arg(long)]
        line: usize,
        /// Zero-based cursor column
        #[arg(long, default_value_t = 0)]
        column: usize,
        /// Document language; inferred from the file extension when omitted
        #[arg(long)]
        language: Option<DocumentLanguage>,
        /// Principals JSON to read; defaults to the scraper's output path
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_file: DEFAULT_OUTPUT.into(),
            workers: DEFAULT_WORKERS,
            snippets_dir: DEFAULT_SNIPPETS_DIR.into(),
            docs_base_url: DOCS_BASE_URL.into(),
            services_page: SERVICES_PAGE.into(),
            policy_generator_url: POLICY_GENERATOR_URL.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            command: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("--workers must be at least 1".into()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("--timeout-secs must be at least 1".into()));
        }
        Ok(())
    }

    /// Only the file name of `--output` is kept; the file always lands in the snippets dir.
    pub fn output_path(&self) -> PathBuf {
        let name = Path::new(&self.output_file)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
        self.snippets_dir.join(name)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
