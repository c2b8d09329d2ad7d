//! Tag resolution for package events.
//!
//! The tag carried in the package metadata is deployed verbatim, except for
//! feature-branch builds that publish no tag or only `latest`: those collapse
//! onto `feature-<branch>`, so every commit on one feature branch redeploys the
//! same long-lived environment.

use crate::{BranchRef, PackagePublished};

/// The floating tag that triggers feature-branch collapsing.
pub const LATEST_TAG: &str = "latest";

/// Computes the tag to deploy for a package event.
///
/// The result may be empty; the deployment forcer rejects that explicitly.
pub fn resolve(event: &PackagePublished) -> String {
    let extracted = event.extracted_tag();
    match &event.branch {
        BranchRef::Feature(branch) if extracted.is_empty() || extracted == LATEST_TAG => {
            format!("feature-{branch}")
        }
        _ => extracted.to_owned(),
    }
}
