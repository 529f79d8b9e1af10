use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use url::Url;

use crate::merge::{SourceMap, SourcedPrincipal};
use crate::{
    info_time, Error, Result, POLICY_CONFIG_MARKER, PRINCIPAL_SUFFIX, SERVICE_LINKED_ROLE_COLUMN,
};

static PRINCIPAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:trusts the|allows the|assumes the|arn:aws:iam::\*:role/aws-service-role/)?\s*([a-z0-9.-]+\.amazonaws\.com)",
    )
    .expect("valid principal regex")
});

/// A row of the services table whose service-linked role column says "yes".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawServiceListing {
    pub service_name: String,
    pub doc_url: String,
}

/// One service declared by the policy generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyGeneratorEntry {
    pub service_name: String,
    pub service_principal: String,
}

#[inline]
fn create_selector(sel_str: &str) -> Result<Selector> {
    Selector::parse(sel_str).map_err(|_| Error::Selector(sel_str.into()))
}

#[inline]
fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

/// Extracts the services with a service-linked role from the "AWS services that
/// work with IAM" page. Relative links are resolved against `base_url`.
///
/// Only the first table is read and its header row is skipped. A service listed
/// twice keeps its first position and its last link. A page without a table
/// yields an empty list.
pub fn parse_services_table(html: &str, base_url: &Url) -> Result<Vec<RawServiceListing>> {
    let doc = Html::parse_document(html);

    let table_selector = create_selector("table")?;
    let row_selector = create_selector("tr")?;
    let cell_selector = create_selector("td")?;
    let link_selector = create_selector("a")?;

    let Some(table) = doc.select(&table_selector).next() else {
        return Ok(Vec::new());
    };

    let mut listings: Vec<RawServiceListing> = Vec::new();
    for row in table.select(&row_selector).skip(1) {
        let cells = row.select(&cell_selector).collect::<Vec<_>>();
        if cells.len() <= SERVICE_LINKED_ROLE_COLUMN {
            continue;
        }

        let Some(link) = cells[SERVICE_LINKED_ROLE_COLUMN]
            .select(&link_selector)
            .next()
        else {
            continue;
        };
        if element_text(link).trim().to_lowercase() != "yes" {
            continue;
        }
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Ok(doc_url) = base_url.join(href) else {
            continue;
        };

        let service_name = element_text(cells[0]).trim().to_string();
        match listings
            .iter_mut()
            .find(|l| l.service_name == service_name)
        {
            Some(listing) => listing.doc_url = doc_url.into(),
            None => listings.push(RawServiceListing {
                service_name,
                doc_url: doc_url.into(),
            }),
        }
    }
    Ok(listings)
}

/// Finds the service principal mentioned in a service-linked role page.
///
/// Paragraphs are scanned in document order; the first one containing
/// `amazonaws.com` that matches the principal pattern wins.
pub fn extract_principal(html: &str) -> Result<Option<String>> {
    let doc = Html::parse_document(html);
    let paragraph_selector = create_selector("p")?;

    let principal = doc
        .select(&paragraph_selector)
        .map(element_text)
        .filter(|text| text.contains("amazonaws.com"))
        .find_map(|text| match_principal(text.trim()));
    Ok(principal)
}

/// Applies the principal pattern to a single piece of text.
pub fn match_principal(text: &str) -> Option<String> {
    PRINCIPAL_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Slices the JSON object assigned to `app.PolicyEditorConfig` out of the policy
/// generator script: everything after the first marker, cut at the last `}`.
pub fn extract_policy_config_json(script: &str) -> Result<String> {
    let after_marker = script
        .split(POLICY_CONFIG_MARKER)
        .nth(1)
        .ok_or(Error::MissingPayload("policy generator config"))?;

    let json = match after_marker.rfind('}') {
        Some(end) => after_marker[..=end].to_string(),
        None => format!("{after_marker}}}"),
    };
    Ok(json)
}

#[derive(Debug, Deserialize)]
struct PolicyEditorConfig {
    #[serde(rename = "serviceMap")]
    service_map: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PolicyGeneratorService {
    #[serde(rename = "StringPrefix", default)]
    string_prefix: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Parses the policy generator payload into one entry per service declaring a
/// non-empty `StringPrefix`. Services without a `name` are listed under their prefix.
pub fn parse_policy_generator(json: &str) -> Result<Vec<PolicyGeneratorEntry>> {
    let config: PolicyEditorConfig = serde_json::from_str(json)?;

    let entries = config
        .service_map
        .into_iter()
        .filter_map(|(_, value)| {
            // Services with unexpected shapes are skipped rather than failing the map.
            let service: PolicyGeneratorService = serde_json::from_value(value).ok()?;
            let prefix = service.string_prefix.filter(|p| !p.is_empty())?;
            Some(PolicyGeneratorEntry {
                service_name: service.name.unwrap_or_else(|| prefix.clone()),
                service_principal: format!("{prefix}{PRINCIPAL_SUFFIX}"),
            })
        })
        .collect();
    Ok(entries)
}

/// Runs the whole policy generator extraction on a fetched script and keys the
/// result by service name. Later duplicates of a name replace earlier ones.
pub fn policy_generator_principals(script: &str, reference_url: &str) -> Result<SourceMap> {
    let json = extract_policy_config_json(script)?;
    let entries = parse_policy_generator(&json)?;

    let unique = entries
        .iter()
        .map(|e| e.service_principal.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    info_time!("Found {} unique principals in the policy generator", unique);

    Ok(entries
        .into_iter()
        .map(|e| {
            (
                e.service_name,
                SourcedPrincipal::new(e.service_principal, reference_url),
            )
        })
        .collect::<BTreeMap<_, _>>())
}
