//! AWS SERVICE PRINCIPAL SCRAPER
//! Collects `<prefix>.amazonaws.com` principals from the IAM user guide and the
//! public policy generator, merges them and writes a single JSON snippet.

pub mod completion;
pub mod config;
mod error;
mod macros;
pub mod merge;
pub mod normalize;
pub mod parse;
pub mod process;
pub mod request;

pub use error::{Error, Result};

pub const DOCS_BASE_URL: &str = "https://docs.aws.amazon.com/IAM/latest/UserGuide/";
pub const SERVICES_PAGE: &str = "reference_aws-services-that-work-with-iam.html";
pub const POLICY_GENERATOR_URL: &str = "https://awspolicygen.s3.amazonaws.com/js/policies.js";
/// Marks the start of the JSON object embedded in the policy generator script.
pub const POLICY_CONFIG_MARKER: &str = "app.PolicyEditorConfig=";
pub const PRINCIPAL_SUFFIX: &str = ".amazonaws.com";

pub const DEFAULT_OUTPUT: &str = "service-principals.json";
pub const DEFAULT_SNIPPETS_DIR: &str = "snippets";
pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
/// Total attempts (not re-tries) made against the policy generator.
pub const POLICY_GENERATOR_ATTEMPTS: usize = 3;
/// Column of the services table holding the service-linked role marker.
const SERVICE_LINKED_ROLE_COLUMN: usize = 6;
const USER_AGENT: &str = concat!("svc-principals/", env!("CARGO_PKG_VERSION"));
