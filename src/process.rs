use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use reqwest::Client;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    sync::Semaphore,
    task::{spawn_blocking, JoinSet},
};
use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter, Serializer};
use url::Url;

use crate::config::Config;
use crate::merge::{merge_service_principals, MergeSummary, MergedMap, SourceMap, SourcedPrincipal};
use crate::normalize::normalize_service_name;
use crate::parse::{extract_principal, parse_services_table, policy_generator_principals, RawServiceListing};
use crate::request::{build_client, fetch_text};
use crate::{info_time, warn_time, Result, POLICY_GENERATOR_ATTEMPTS};

/// What became of one service's documentation page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Found {
        service_name: String,
        principal: SourcedPrincipal,
    },
    /// The page was read but mentions no principal.
    NotFound { service_name: String },
    Failed { service_name: String, reason: String },
}

/// Result of a full run.
#[derive(Debug)]
pub struct RunReport {
    pub output_path: PathBuf,
    pub merged: MergedMap,
    pub summary: MergeSummary,
}

pub async fn process_site(config: &Config) -> Result<RunReport> {
    config.validate()?;
    let start_time = Local::now();
    let client = build_client(config.timeout())?;

    info_time!("Started scraping");

    let documentation = scrape_service_principals(&client, config).await?;
    info_time!(
        start_time,
        "Finished scraping documentation: {} principals",
        documentation.len()
    );

    let policy_generator =
        fetch_policy_generator_principals(&client, &config.policy_generator_url, config).await;

    let merged = merge_service_principals(&documentation, &policy_generator);
    let summary = MergeSummary::from_merged(&merged);

    let output_path = config.output_path();
    write_output(&output_path, &merged).await?;
    info_time!(start_time, "Wrote the results to file: {}", output_path.display());

    Ok(RunReport {
        output_path,
        merged,
        summary,
    })
}

/// Requests the services listing, then scrapes every listed service page on a
/// pool of `config.workers` concurrent tasks.
///
/// Returns the found principals keyed by normalized service name. A failure to
/// fetch the listing itself aborts the run; per-service failures don't.
pub async fn scrape_service_principals(client: &Client, config: &Config) -> Result<SourceMap> {
    let services = scrape_services(client, config).await?;
    info_time!("Found {} services with a service-linked role", services.len());

    let outcomes = scrape_all(client, services, config.workers).await;

    let mut documentation = SourceMap::new();
    for outcome in outcomes {
        match outcome {
            ScrapeOutcome::Found {
                service_name,
                principal,
            } => {
                documentation.insert(normalize_service_name(&service_name), principal);
            }
            ScrapeOutcome::NotFound { service_name } => {
                info_time!("No service principal found for {}", service_name);
            }
            ScrapeOutcome::Failed {
                service_name,
                reason,
            } => {
                warn_time!("{} generated an error: {}", service_name, reason);
            }
        }
    }
    Ok(documentation)
}

/// Fetches and parses the services listing page.
pub async fn scrape_services(client: &Client, config: &Config) -> Result<Vec<RawServiceListing>> {
    let base_url = Url::parse(&config.docs_base_url)?;
    let page_url = base_url.join(&config.services_page)?;

    let html = fetch_text(client, page_url.as_str()).await?;
    // `Html` isn't `Send`, parse away from the async workers.
    spawn_blocking(move || parse_services_table(&html, &base_url)).await?
}

/// Runs one task per service, at most `workers` at a time.
/// Outcomes are returned in listing order, whatever order the tasks finish in.
async fn scrape_all(
    client: &Client,
    services: Vec<RawServiceListing>,
    workers: usize,
) -> Vec<ScrapeOutcome> {
    // Client uses Arc so we can clone cheaply
    let client = client.clone();
    run_bounded(services, workers, move |service| {
        let client = client.clone();
        async move { scrape_service(&client, service).await }
    })
    .await
}

/// Spawns `task` for every service on a `JoinSet`, holding one of `workers`
/// semaphore permits while it runs. A task that panics becomes
/// `ScrapeOutcome::Failed` for its own service only.
async fn run_bounded<F, Fut>(
    services: Vec<RawServiceListing>,
    workers: usize,
    task: F,
) -> Vec<ScrapeOutcome>
where
    F: Fn(RawServiceListing) -> Fut,
    Fut: Future<Output = ScrapeOutcome> + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut task_set = JoinSet::new();
    let mut pending = HashMap::with_capacity(services.len());

    for (idx, service) in services.into_iter().enumerate() {
        let service_name = service.service_name.clone();
        let scrape = task(service);
        let handle = task_set.spawn({
            let permits = permits.clone();
            let service_name = service_name.clone();
            async move {
                match permits.acquire_owned().await {
                    Ok(_permit) => scrape.await,
                    Err(err) => ScrapeOutcome::Failed {
                        service_name,
                        reason: err.to_string(),
                    },
                }
            }
        });
        pending.insert(handle.id(), (idx, service_name));
    }

    let mut outcomes = Vec::with_capacity(pending.len());
    while let Some(joined) = task_set.join_next_with_id().await {
        let (id, outcome) = match joined {
            Ok((id, outcome)) => (id, outcome),
            Err(err) => {
                let id = err.id();
                let service_name = pending
                    .get(&id)
                    .map(|(_, name)| name.clone())
                    .unwrap_or_default();
                (
                    id,
                    ScrapeOutcome::Failed {
                        service_name,
                        reason: err.to_string(),
                    },
                )
            }
        };
        if let Some((idx, _)) = pending.remove(&id) {
            outcomes.push((idx, outcome));
        }
    }
    outcomes.sort_unstable_by_key(|(idx, _)| *idx);
    outcomes.into_iter().map(|(_, outcome)| outcome).collect()
}

/// Scrapes a single service page. Never fails: every error becomes `ScrapeOutcome::Failed`.
pub async fn scrape_service(client: &Client, service: RawServiceListing) -> ScrapeOutcome {
    let RawServiceListing {
        service_name,
        doc_url,
    } = service;

    match scrape_service_principal(client, &doc_url).await {
        Ok(Some(principal)) => ScrapeOutcome::Found {
            service_name,
            principal,
        },
        Ok(None) => ScrapeOutcome::NotFound { service_name },
        Err(err) => ScrapeOutcome::Failed {
            service_name,
            reason: err.to_string(),
        },
    }
}

/// Fetches a service page and extracts its principal, if any.
pub async fn scrape_service_principal(client: &Client, doc_url: &str) -> Result<Option<SourcedPrincipal>> {
    let html = fetch_text(client, doc_url).await?;
    let principal = spawn_blocking(move || extract_principal(&html)).await??;
    Ok(principal.map(|p| SourcedPrincipal::new(p, doc_url)))
}

/// Fetches the policy generator script and extracts its principals.
///
/// Request failures are retried up to `POLICY_GENERATOR_ATTEMPTS` attempts in
/// total with `config.retry_delay()` between them. Any other failure, or running
/// out of attempts, yields an empty map.
pub async fn fetch_policy_generator_principals(client: &Client, url: &str, config: &Config) -> SourceMap {
    for attempt in 1..=POLICY_GENERATOR_ATTEMPTS {
        let res = match fetch_text(client, url).await {
            Ok(script) => policy_generator_principals(&script, url),
            Err(err) => Err(err),
        };

        match res {
            Ok(principals) => return principals,
            Err(err) if err.is_fetch() => {
                if attempt == POLICY_GENERATOR_ATTEMPTS {
                    warn_time!(
                        "Failed to fetch the policy generator after {} attempts: {}",
                        POLICY_GENERATOR_ATTEMPTS,
                        err
                    );
                    break;
                }
                warn_time!("Policy generator attempt {} failed: {}", attempt, err);
                tokio::time::sleep(config.retry_delay()).await;
            }
            Err(err) => {
                warn_time!("Couldn't parse the policy generator payload: {}", err);
                break;
            }
        }
    }
    SourceMap::new()
}

/// Writes the merged map as 2-space indented JSON, creating the parent directory if needed.
pub async fn write_output(path: &Path, merged: &MergedMap) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let json = to_ascii_json(merged)?;
    let mut file = File::create(path).await?;
    file.write_all(&json).await?;
    file.flush().await?;
    Ok(())
}

/// Pretty JSON with everything outside printable ASCII written as `\uXXXX`
/// escapes, so the artifact stays byte-for-byte stable across platforms.
pub fn to_ascii_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = AsciiPrettyFormatter(PrettyFormatter::with_indent(b"  "));
    let mut ser = Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// `PrettyFormatter` that escapes non-ASCII and DEL characters in strings.
struct AsciiPrettyFormatter<'a>(PrettyFormatter<'a>);

impl Formatter for AsciiPrettyFormatter<'_> {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.0.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.0.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object_value(writer)
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let mut units = [0u16; 2];
        let mut plain_start = 0;
        for (pos, ch) in fragment.char_indices() {
            if (' '..='~').contains(&ch) {
                continue;
            }
            writer.write_all(fragment[plain_start..pos].as_bytes())?;
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            plain_start = pos + ch.len_utf8();
        }
        writer.write_all(fragment[plain_start..].as_bytes())
    }
}
