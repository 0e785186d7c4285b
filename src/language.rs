use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::workflow::types::PhaseError;

/// How code in one language is described to the model and tested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageProfile {
    pub display_name: String,
    pub test_framework: String,
    /// Shell command run from the working-copy root inside the sandbox.
    pub test_command: String,
    /// Info string used for fenced code blocks.
    pub markdown_tag: String,
}

/// Immutable lookup from file extension to [`LanguageProfile`].
#[derive(Debug, Clone)]
pub struct LanguageTable {
    by_extension: HashMap<String, LanguageProfile>,
}

impl LanguageTable {
    pub fn new(entries: HashMap<String, LanguageProfile>) -> Self {
        let by_extension = entries
            .into_iter()
            .map(|(ext, profile)| (ext.trim_start_matches('.').to_ascii_lowercase(), profile))
            .collect();
        Self { by_extension }
    }

    /// Resolve the profile for `path` from its extension.
    pub fn resolve(&self, path: &str) -> Result<&LanguageProfile, PhaseError> {
        Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.by_extension.get(&ext.to_ascii_lowercase()))
            .ok_or_else(|| PhaseError::UnknownLanguage(path.to_string()))
    }

    pub fn len(&self) -> usize {
        self.by_extension.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }
}
