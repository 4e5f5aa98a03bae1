//! Structural comparison of two models.

use std::collections::BTreeSet;

use super::{Model, ModelFile};

/// One change record between an old and a new model.
///
/// Equality is full structural equality of [`ModelFile`], recursively for
/// directory children, so any observable attribute change surfaces as
/// `Updated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelDiff {
    Added(ModelFile),
    Removed(ModelFile),
    Updated { old: ModelFile, new: ModelFile },
}

impl ModelDiff {
    /// Name of the file this record refers to.
    pub fn name(&self) -> &str {
        match self {
            ModelDiff::Added(file) | ModelDiff::Removed(file) => &file.name,
            ModelDiff::Updated { new, .. } => &new.name,
        }
    }
}

/// Compare `old` and `new`, emitting change records in ascending name order.
pub fn diff_models(old: &Model, new: &Model) -> Vec<ModelDiff> {
    let names: BTreeSet<&String> = old.files.keys().chain(new.files.keys()).collect();

    let mut diffs = Vec::new();
    for name in names {
        match (old.files.get(name), new.files.get(name)) {
            (None, Some(added)) => diffs.push(ModelDiff::Added(added.clone())),
            (Some(removed), None) => diffs.push(ModelDiff::Removed(removed.clone())),
            (Some(before), Some(after)) if before != after => diffs.push(ModelDiff::Updated {
                old: before.clone(),
                new: after.clone(),
            }),
            _ => {}
        }
    }
    diffs
}
