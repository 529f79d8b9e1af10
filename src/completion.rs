//! Principal suggestions for policy documents being edited.
//!
//! The scraper's output is loaded into a [`PrincipalCatalog`]; [`is_principal_context`]
//! decides, from the text above the cursor, whether the cursor sits where a
//! service principal is expected (a `Principal` block in JSON, Terraform or YAML,
//! or a `ServicePrincipal(...)`/`assumedBy` in CDK code).

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;

use crate::merge::ServiceEntry;
use crate::Result;

/// How many lines above the cursor are inspected.
pub const MAX_LINES_UP: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentLanguage {
    Json,
    Yaml,
    Terraform,
    TypeScript,
    Python,
}

impl DocumentLanguage {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "tf" => Some(Self::Terraform),
            "ts" => Some(Self::TypeScript),
            "py" => Some(Self::Python),
            _ => None,
        }
    }
}

impl FromStr for DocumentLanguage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "terraform" | "tf" => Ok(Self::Terraform),
            "typescript" | "ts" => Ok(Self::TypeScript),
            "python" | "py" => Ok(Self::Python),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// Service principals read back from a scraper output file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrincipalCatalog {
    principals: BTreeSet<String>,
}

impl PrincipalCatalog {
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: BTreeMap<String, ServiceEntry> = serde_json::from_str(json)?;
        let principals = entries
            .into_values()
            .map(|entry| entry.service_principal)
            .filter(|principal| !principal.is_empty())
            .collect();
        Ok(Self { principals })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    /// All principals, sorted.
    pub fn principals(&self) -> impl Iterator<Item = &str> {
        self.principals.iter().map(String::as_str)
    }
}

/// Text from at most `MAX_LINES_UP` lines above the cursor up to the cursor itself.
/// `line` and `column` are zero based; `column` counts characters.
pub fn text_before(document: &str, line: usize, column: usize) -> String {
    let lines = document.split('\n').collect::<Vec<_>>();
    let Some(last) = lines.len().checked_sub(1) else {
        return String::new();
    };
    let line = line.min(last);
    let start = line.saturating_sub(MAX_LINES_UP);

    let mut out = lines[start..line].iter().fold(String::new(), |mut acc, l| {
        acc.push_str(l);
        acc.push('\n');
        acc
    });
    out.extend(lines[line].chars().take(column));
    out
}

/// Whether the text before the cursor puts it where a service principal belongs.
pub fn is_principal_context(text: &str, language: DocumentLanguage) -> bool {
    let reversed = text.split('\n').rev();
    match language {
        DocumentLanguage::Json | DocumentLanguage::Terraform => {
            brace_block_context(reversed, language)
        }
        DocumentLanguage::Yaml => yaml_context(reversed),
        DocumentLanguage::TypeScript => typescript_context(reversed),
        DocumentLanguage::Python => python_context(reversed),
    }
}

fn brace_block_context<'a>(lines: impl Iterator<Item = &'a str>, language: DocumentLanguage) -> bool {
    for line in lines {
        let trimmed = line.trim().to_lowercase();
        let opens = trimmed.contains('{') || trimmed.contains(':');
        let found = match language {
            DocumentLanguage::Json => {
                (trimmed.contains("\"principal\"") || trimmed.contains("\"notprincipal\"")) && opens
            }
            _ => trimmed.contains("principal") && trimmed.contains('=') && trimmed.contains('{'),
        };
        if found {
            return true;
        }
        if trimmed.starts_with('}') || trimmed.starts_with(']') {
            break;
        }
    }
    false
}

fn yaml_context<'a>(lines: impl Iterator<Item = &'a str>) -> bool {
    let mut found_service = false;
    // Indentation of the `principal:` key once seen.
    let mut principal_indent: Option<Option<usize>> = None;

    for line in lines {
        let trimmed = line.trim().to_lowercase();
        // `None` for blank lines, ordering below every real indentation.
        let indent = line.find(|c: char| !c.is_whitespace());

        if trimmed.starts_with("service:") {
            found_service = true;
            if principal_indent.is_some_and(|p| indent > p) {
                return true;
            }
        }

        if trimmed.starts_with("principal:") {
            principal_indent = Some(indent);
            continue;
        }

        if principal_indent.is_some_and(|p| indent <= p) && !trimmed.is_empty() {
            break;
        }

        if trimmed.starts_with("---") || trimmed.starts_with("...") {
            break;
        }
    }

    found_service && principal_indent.is_some()
}

fn typescript_context<'a>(lines: impl Iterator<Item = &'a str>) -> bool {
    for line in lines {
        let trimmed = line.trim().to_lowercase();
        if trimmed.contains("serviceprincipal(")
            || trimmed.contains("assumedby:")
            || trimmed.contains("principal:")
        {
            return true;
        }
        if trimmed.contains("class") || trimmed.contains("interface") {
            break;
        }
    }
    false
}

fn python_context<'a>(lines: impl Iterator<Item = &'a str>) -> bool {
    for line in lines {
        let trimmed = line.trim().to_lowercase();
        if trimmed.contains("serviceprincipal(")
            || trimmed.contains("assumed_by=")
            || trimmed.contains("principal=")
        {
            return true;
        }
        if trimmed.starts_with("class ") || trimmed.starts_with("def ") || trimmed.starts_with(')') {
            break;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_end(document: &str, language: DocumentLanguage) -> bool {
        let line = document.lines().count().saturating_sub(1);
        let column = document.lines().last().map_or(0, |l| l.chars().count());
        is_principal_context(&text_before(document, line, column), language)
    }

    #[test]
    fn catalog_lists_unique_principals() {
        let json = r#"{
  "ec2": {"originalNames": ["ec2"], "reference_url": "u", "servicePrincipal": "ec2.amazonaws.com", "sources": ["documentation"]},
  "lambda": {"originalNames": ["lambda"], "reference_url": "u", "servicePrincipal": "lambda.amazonaws.com", "sources": ["documentation"]},
  "s3": {"originalNames": ["Amazon S3"], "reference_url": "p", "servicePrincipal": "s3.amazonaws.com", "sources": ["policy_generator"]},
  "blank": {"originalNames": [], "reference_url": "p", "servicePrincipal": "", "sources": ["policy_generator"]}
}"#;
        let catalog = PrincipalCatalog::from_json(json).unwrap();
        assert_eq!(
            catalog.principals().collect::<Vec<_>>(),
            vec!["ec2.amazonaws.com", "lambda.amazonaws.com", "s3.amazonaws.com"]
        );
        assert_eq!(PrincipalCatalog::from_json("{}").unwrap().principals().count(), 0);
    }

    #[test]
    fn json_principal_block() {
        let doc = "{\n  \"Effect\": \"Allow\",\n  \"Principal\": {\n    \"Service\": \"";
        assert!(at_end(doc, DocumentLanguage::Json));

        let not_principal = "{\n  \"NotPrincipal\": {\n    \"Service\": [\n      \"";
        assert!(at_end(not_principal, DocumentLanguage::Json));
    }

    #[test]
    fn json_stops_at_closed_block() {
        let doc = "{\n  \"Principal\": {\"AWS\": \"*\"},\n  \"Resource\": [\n  ],\n  \"Action\": \"";
        assert!(!at_end(doc, DocumentLanguage::Json));
    }

    #[test]
    fn terraform_principals_block() {
        let doc = "statement {\n  principals = {\n    type = \"Service\"\n    identifiers = [\"";
        assert!(at_end(doc, DocumentLanguage::Terraform));
        assert!(!at_end("resource \"aws_iam_role\" \"r\" {\n  name = \"", DocumentLanguage::Terraform));
    }

    #[test]
    fn yaml_service_under_principal() {
        let doc = "Statement:\n  - Effect: Allow\n    Principal:\n      Service:\n        - ";
        assert!(at_end(doc, DocumentLanguage::Yaml));

        let inline = "    Principal:\n      Service: ";
        assert!(at_end(inline, DocumentLanguage::Yaml));
    }

    #[test]
    fn yaml_without_principal_or_across_documents() {
        assert!(!at_end("Resources:\n  Service: ", DocumentLanguage::Yaml));
        let doc = "Principal:\n  Service: x\n---\nOther:\n  Service: ";
        assert!(!at_end(doc, DocumentLanguage::Yaml));
    }

    #[test]
    fn typescript_cdk_constructs() {
        assert!(at_end(
            "const role = new iam.Role(this, 'Role', {\n  assumedBy: new iam.ServicePrincipal('",
            DocumentLanguage::TypeScript
        ));
        assert!(!at_end(
            "export class Stack {\n  const x = '",
            DocumentLanguage::TypeScript
        ));
    }

    #[test]
    fn python_cdk_constructs() {
        let doc = "        sns_key = kms.Key(self, \"k\",\n            principals=[\n                iam.ServicePrincipal(\"";
        assert!(at_end(doc, DocumentLanguage::Python));

        let after_def = "principal=iam.AnyPrincipal()\ndef build(self):\n    name = \"";
        assert!(!at_end(after_def, DocumentLanguage::Python));
    }

    #[test]
    fn text_before_is_bounded() {
        let document = (0..100).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let text = text_before(&document, 60, 4);
        assert!(text.starts_with("line 20\n"));
        assert!(text.ends_with("line 59\nline"));
        assert_eq!(text_before("", 3, 3), "");
    }

    #[test]
    fn language_from_name_and_path() {
        assert_eq!("YML".parse::<DocumentLanguage>(), Ok(DocumentLanguage::Yaml));
        assert!("cobol".parse::<DocumentLanguage>().is_err());
        assert_eq!(
            DocumentLanguage::from_path(Path::new("infra/main.tf")),
            Some(DocumentLanguage::Terraform)
        );
        assert_eq!(DocumentLanguage::from_path(Path::new("README")), None);
    }
}
