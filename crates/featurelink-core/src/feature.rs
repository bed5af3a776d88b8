//! Configured feature entries.

use serde::{Deserialize, Deserializer, Serialize};

use crate::descriptor::DESCRIPTOR_PACKAGE;
use crate::names::{capitalize, package_leaf, sanitize_identifier, source_basename};

fn default_branch() -> String {
    "main".to_string()
}

/// One externally sourced feature to integrate.
///
/// Accepts `source`, `repo` or `repository` for the location, and either a
/// `packages` list or a single `package` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Where to fetch the feature from (a git URL or local path).
    #[serde(alias = "repo", alias = "repository")]
    pub source: String,
    /// Branch to check out.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Requested packages; empty means "everything".
    #[serde(
        default,
        alias = "package",
        deserialize_with = "deserialize_packages"
    )]
    pub packages: Vec<String>,
}

impl FeatureSpec {
    /// Create a feature on the `main` branch with no package filter.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            branch: default_branch(),
            packages: Vec::new(),
        }
    }

    /// Set the branch.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Add a requested package.
    #[must_use]
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.packages.push(package.into());
        self.packages = normalize_packages(&self.packages);
        self
    }

    /// Requested packages, trimmed, without blanks or duplicates, in order.
    #[must_use]
    pub fn requested_packages(&self) -> Vec<String> {
        normalize_packages(&self.packages)
    }

    /// Candidate descriptor type names, in probing order: first from the
    /// source basename, then one per requested package leaf.
    #[must_use]
    pub fn descriptor_candidates(&self) -> Vec<String> {
        let mut candidates = Vec::new();
        let base = sanitize_identifier(source_basename(&self.source));
        if !base.is_empty() {
            candidates.push(descriptor_type_name(&capitalize(&base)));
        }
        for package in self.requested_packages() {
            let leaf = sanitize_identifier(package_leaf(&package));
            if leaf.is_empty() {
                continue;
            }
            let candidate = descriptor_type_name(&capitalize(&leaf));
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates
    }
}

/// `generated.<FeatureName>Descriptor`.
#[must_use]
pub fn descriptor_type_name(feature_name: &str) -> String {
    format!("{DESCRIPTOR_PACKAGE}.{feature_name}Descriptor")
}

/// Trim, drop blanks and de-duplicate while preserving order.
#[must_use]
pub fn normalize_packages<S: AsRef<str>>(packages: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for pkg in packages {
        let pkg = pkg.as_ref().trim();
        if !pkg.is_empty() && !out.iter().any(|p| p == pkg) {
            out.push(pkg.to_string());
        }
    }
    out
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PackagesField {
    One(String),
    Many(Vec<String>),
}

fn deserialize_packages<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match PackagesField::deserialize(deserializer)? {
        PackagesField::One(s) => vec![s],
        PackagesField::Many(v) => v,
    };
    Ok(normalize_packages(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_main_branch() {
        let spec: FeatureSpec = toml::from_str(r#"source = "https://example/repo.git""#).unwrap();
        assert_eq!(spec.branch, "main");
        assert!(spec.packages.is_empty());
    }

    #[test]
    fn accepts_original_key_aliases() {
        let spec: FeatureSpec = toml::from_str(
            r#"
            repository = "https://example/billing.git"
            package = " com.acme.billing "
            "#,
        )
        .unwrap();
        assert_eq!(spec.source, "https://example/billing.git");
        assert_eq!(spec.packages, vec!["com.acme.billing"]);
    }

    #[test]
    fn packages_are_normalized() {
        let spec: FeatureSpec = toml::from_str(
            r#"
            repo = "r"
            packages = ["a.b", "  ", "a.b", "c"]
            "#,
        )
        .unwrap();
        assert_eq!(spec.packages, vec!["a.b", "c"]);
    }

    #[test]
    fn descriptor_candidates_in_lookup_order() {
        let spec = FeatureSpec::new("https://example/greeting-feature.git")
            .with_package("com.acme.greeting")
            .with_package("com.acme.billing");
        assert_eq!(
            spec.descriptor_candidates(),
            vec![
                "generated.GreetingfeatureDescriptor",
                "generated.GreetingDescriptor",
                "generated.BillingDescriptor",
            ]
        );
    }
}
