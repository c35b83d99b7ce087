//! Deterministic provenance classification of labeled fragments.

use crate::core::types::{LabeledFragment, Role};

/// First fragment whose case-folded label contains any of `keywords`.
///
/// Fragments are scanned in their original order and empty labels never match.
/// `None` means the payload was not produced by this role; it is not an error.
pub fn select<'a>(
    fragments: &'a [LabeledFragment],
    keywords: &[&str],
) -> Option<&'a LabeledFragment> {
    fragments
        .iter()
        .find(|fragment| label_matches(&fragment.role_label, keywords))
}

/// Assign a label to the first role in [`Role::ORDERED`] whose keywords match.
pub fn classify_label(label: &str) -> Option<Role> {
    Role::ORDERED
        .into_iter()
        .find(|role| label_matches(label, role.keywords()))
}

/// First fragment whose label is assigned to `role`.
///
/// Unlike [`select`], a label that matches an earlier role in the evaluation
/// order is never handed to a later one, so "High-Level Design Architect" is a
/// design fragment even though it mentions "architect".
pub fn select_role(fragments: &[LabeledFragment], role: Role) -> Option<&LabeledFragment> {
    fragments
        .iter()
        .find(|fragment| classify_label(&fragment.role_label) == Some(role))
}

fn label_matches(label: &str, keywords: &[&str]) -> bool {
    let folded = label.to_lowercase();
    if folded.trim().is_empty() {
        return false;
    }
    keywords
        .iter()
        .any(|keyword| folded.contains(&keyword.to_lowercase()))
}
