//! Type names and the naming helpers shared by the generator and the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A fully-qualified, dot-separated type name such as `billing.api.Invoices`.
///
/// The last segment is the simple name; everything before it is the package.
/// A name without dots lives in the root package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TypeName(String);

impl<'de> Deserialize<'de> for TypeName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl TypeName {
    /// Create a type name, rejecting empty names and empty segments.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTypeName`] for `""`, `"a..b"`, `".a"` or `"a."`.
    pub fn new(name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.split('.').any(str::is_empty) {
            return Err(CoreError::InvalidTypeName(name));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Build a name from a package (possibly absent) and a simple name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTypeName`] if the result is malformed.
    pub fn qualified(package: Option<&str>, simple: &str) -> CoreResult<Self> {
        match package {
            Some(pkg) if !pkg.is_empty() => Self::new(format!("{pkg}.{simple}")),
            _ => Self::new(simple),
        }
    }

    /// The full dotted name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The package portion, or `None` for the root package.
    #[must_use]
    pub fn package(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(pkg, _)| pkg)
    }

    /// The last segment.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.0.rsplit_once('.').map_or(self.0.as_str(), |(_, simple)| simple)
    }

    /// Default registry binding name: the decapitalized simple name.
    #[must_use]
    pub fn binding_name(&self) -> String {
        decapitalize(self.simple_name())
    }

    /// Whether this type lives in `package` or one of its sub-packages.
    #[must_use]
    pub fn is_in_package(&self, package: &str) -> bool {
        self.package()
            .is_some_and(|pkg| package_matches(pkg, package))
    }

    /// Path of this type relative to a package-structured directory,
    /// e.g. `a.b.Service` + `wasm` → `a/b/Service.wasm`.
    #[must_use]
    pub fn relative_path(&self, extension: &str) -> std::path::PathBuf {
        let mut path: std::path::PathBuf = self.0.split('.').collect();
        path.set_extension(extension);
        path
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TypeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether `package` equals `filter` or is a sub-package of it.
///
/// `a.b.c` matches `a.b`; `a.bx` does not.
#[must_use]
pub fn package_matches(package: &str, filter: &str) -> bool {
    package == filter
        || package
            .strip_prefix(filter)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Whether `package` matches any of `filters`. `None` never matches.
#[must_use]
pub fn package_allowed<S: AsRef<str>>(package: Option<&str>, filters: &[S]) -> bool {
    let Some(package) = package else {
        return false;
    };
    filters
        .iter()
        .any(|filter| package_matches(package, filter.as_ref()))
}

/// Upper-case the first character.
#[must_use]
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lower-case the first character, unless the first two are both upper-case
/// (`URLParser` stays `URLParser`, `GreetingService` becomes `greetingService`).
#[must_use]
pub fn decapitalize(s: &str) -> String {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    if chars.next().is_some_and(char::is_uppercase) && first.is_uppercase() {
        return s.to_string();
    }
    first.to_lowercase().chain(s.chars().skip(1)).collect()
}

/// Keep ASCII alphanumerics and underscores.
#[must_use]
pub fn sanitize_identifier(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Keep ASCII alphanumerics only.
#[must_use]
pub fn strip_non_alphanumeric(s: &str) -> String {
    s.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Last path segment of a source location with any `.git` suffix removed.
///
/// Both `/` and `\` separate segments.
#[must_use]
pub fn source_basename(location: &str) -> &str {
    let trimmed = location.trim_end_matches(['/', '\\']);
    let name = trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed);
    name.strip_suffix(".git").unwrap_or(name)
}

/// Last dot-separated segment of a package name.
#[must_use]
pub fn package_leaf(package: &str) -> &str {
    package.rsplit('.').next().unwrap_or(package)
}
