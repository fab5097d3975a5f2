//! Pairs scanned files with their category folder.

use crate::rules::RuleSet;
use crate::scanner::FileDescriptor;

/// A file together with the category it should be moved into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub descriptor: FileDescriptor,
    pub category: String,
}

/// Applies a [`RuleSet`] to scanned files. Pure; touches no filesystem state.
pub struct Classifier<'a> {
    rules: &'a RuleSet,
}

impl<'a> Classifier<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self { rules }
    }

    /// Returns one assignment per descriptor, in input order.
    pub fn assign(&self, descriptors: Vec<FileDescriptor>) -> Vec<Assignment> {
        descriptors
            .into_iter()
            .map(|descriptor| {
                let category = self.rules.classify(&descriptor.extension).to_string();
                Assignment {
                    descriptor,
                    category,
                }
            })
            .collect()
    }
}
