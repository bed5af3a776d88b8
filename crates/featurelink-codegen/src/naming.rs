//! Feature name derivation.

use std::collections::BTreeSet;

use featurelink_core::FeatureSpec;
use featurelink_core::names::{capitalize, package_leaf, source_basename, strip_non_alphanumeric};

/// The name a feature's descriptor is generated under.
///
/// In order of preference: the leaf of the last requested package, the leaf
/// of the first exposed type, then the source basename with everything but
/// ASCII alphanumerics stripped. The result is capitalized.
#[must_use]
pub fn feature_name(feature: &FeatureSpec, exposed_types: &BTreeSet<String>) -> String {
    if let Some(package) = feature.requested_packages().last() {
        return capitalize(package_leaf(package));
    }
    if let Some(first) = exposed_types.first() {
        return capitalize(package_leaf(first));
    }
    capitalize(&strip_non_alphanumeric(source_basename(&feature.source)))
}
