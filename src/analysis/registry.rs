//! Analyzer Registry: extension-keyed dispatch table over
//! [`LanguageAnalyzer`] instances, mirroring [`crate::lang::registry`].

use std::collections::HashMap;
use std::path::Path;

use crate::analysis::analyzer::{LanguageAnalyzer, StandardAnalyzer};
use crate::core::errors::{Result, VigilError};
use crate::lang::registry::SUPPORTED_LANGUAGES;

/// Holds one analyzer instance per supported language, looked up by file
/// extension.
pub struct AnalyzerRegistry {
    by_extension: HashMap<&'static str, &'static str>,
    analyzers: HashMap<&'static str, Box<dyn LanguageAnalyzer>>,
}

impl AnalyzerRegistry {
    /// Build the registry with the standard analyzer for every supported
    /// language.
    pub fn new() -> Self {
        let mut by_extension = HashMap::new();
        let mut analyzers: HashMap<&'static str, Box<dyn LanguageAnalyzer>> = HashMap::new();
        for &language in SUPPORTED_LANGUAGES {
            let extensions = extensions_for(language);
            for ext in extensions {
                by_extension.insert(*ext, language);
            }
            analyzers.insert(language, Box::new(StandardAnalyzer::new(language, extensions)));
        }
        Self { by_extension, analyzers }
    }

    /// Resolve the analyzer registered for a file's extension.
    pub fn analyzer_for_file(&self, path: &Path) -> Result<&dyn LanguageAnalyzer> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| VigilError::unsupported_language(path.display().to_string()))?;
        let language = self
            .by_extension
            .get(ext.as_str())
            .ok_or_else(|| VigilError::unsupported_language(path.display().to_string()))?;
        Ok(self.analyzers[language].as_ref())
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn extensions_for(language: &str) -> &'static [&'static str] {
    match language {
        "python" => &["py", "pyi"],
        "javascript" => &["js", "jsx", "mjs", "cjs"],
        "typescript" => &["ts", "tsx"],
        "rust" => &["rs"],
        "go" => &["go"],
        "cpp" => &["cpp", "cc", "cxx", "hpp", "hh", "h"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn resolves_analyzer_by_extension() {
        let registry = AnalyzerRegistry::new();
        let analyzer = registry.analyzer_for_file(&PathBuf::from("a.py")).unwrap();
        assert_eq!(analyzer.language_name(), "python");
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let registry = AnalyzerRegistry::new();
        assert!(registry.analyzer_for_file(&PathBuf::from("a.unknown")).is_err());
    }
}
