//! Extension-keyed dispatch table for language adapters.
//!
//! A single dispatch table keyed by file extension: adding a language
//! means adding one match arm here plus one adapter module, not a new
//! abstraction layer.

use std::path::Path;

use crate::core::errors::{Result, VigilError};
use crate::lang::common::LanguageAdapter;
use crate::lang::{cpp, go, javascript, python, rust_lang, typescript};

/// The fixed set of supported languages, in the order new adapters were
/// added.
pub const SUPPORTED_LANGUAGES: &[&str] =
    &["python", "javascript", "typescript", "rust", "go", "cpp"];

/// Resolve the language key for a file path from its extension, if any
/// registered adapter claims it.
pub fn language_key_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    for lang in SUPPORTED_LANGUAGES {
        if adapter_extensions(lang).contains(&ext.as_str()) {
            return Some(lang);
        }
    }
    None
}

fn adapter_extensions(language: &str) -> &'static [&'static str] {
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

/// Construct a fresh adapter instance for `language`.
///
/// A new instance per call is intentional: a `tree_sitter::Parser` isn't
/// meant to be driven concurrently, so each analyzer task (one per file,
/// run on the rayon worker pool) gets its own parser rather than sharing
/// one behind a lock.
pub fn adapter_for_language(language: &str) -> Result<Box<dyn LanguageAdapter>> {
    match language {
        "python" => Ok(Box::new(python::PythonAdapter::new()?)),
        "javascript" => Ok(Box::new(javascript::JavaScriptAdapter::new()?)),
        "typescript" => Ok(Box::new(typescript::TypeScriptAdapter::new()?)),
        "rust" => Ok(Box::new(rust_lang::RustAdapter::new()?)),
        "go" => Ok(Box::new(go::GoAdapter::new()?)),
        "cpp" => Ok(Box::new(cpp::CppAdapter::new()?)),
        other => Err(VigilError::unsupported_language(other)),
    }
}

/// Construct the adapter registered for a file's extension.
pub fn adapter_for_file(path: &Path) -> Result<Box<dyn LanguageAdapter>> {
    let language = language_key_for_path(path)
        .ok_or_else(|| VigilError::unsupported_language(path.display().to_string()))?;
    adapter_for_language(language)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn resolves_known_extensions() {
        assert_eq!(
            language_key_for_path(&PathBuf::from("a/b.py")),
            Some("python")
        );
        assert_eq!(
            language_key_for_path(&PathBuf::from("a/b.rs")),
            Some("rust")
        );
        assert_eq!(language_key_for_path(&PathBuf::from("a/b.unknown")), None);
    }

    #[test]
    fn builds_adapter_for_each_supported_language() {
        for lang in SUPPORTED_LANGUAGES {
            assert!(adapter_for_language(lang).is_ok(), "language: {lang}");
        }
    }
}
