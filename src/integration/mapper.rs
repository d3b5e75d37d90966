//! Integration Mapper (C9): turns a Package Dependency Graph plus
//! accepted Code Connector suggestions into an ordered, risk-tagged
//! Integration Map the Automated Patcher can execute step by step.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::integration::connector::ConnectionSuggestion;
use crate::integration::package::{PackageDependencyGraph, PackageFile, Role};

/// Kind of textual change a `Modification` step makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationType {
    /// Adding a new top-of-file import.
    ImportAdd,
    /// Inserting or editing a call site.
    FunctionCall,
    /// Editing a configuration value.
    ConfigUpdate,
    /// Any other textual patch.
    TextPatch,
}

/// How confident the mapper is that a modification preserves behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    /// Pure additive change, no shadowing, no control-flow impact.
    Safe,
    /// Modifies an existing expression but is behavior-preserving by
    /// heuristic.
    Caution,
    /// Touches control flow, error handling, security-relevant code, or
    /// collides with an existing file. Requires human sign-off.
    ReviewRequired,
}

/// Aggregate risk of an Integration Map, per spec §4.7's point scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Fewer than 2 risk points.
    Low,
    /// 2 to 4 risk points.
    Medium,
    /// 5 or more risk points.
    High,
}

/// A single textual change to an existing (or newly copied) file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileModification {
    /// File the modification applies to, relative to `project_root`.
    pub target_file: String,
    /// Kind of change.
    pub modification_type: ModificationType,
    /// Line the change applies at, when known (e.g. an import insertion
    /// point). `None` for whole-content replacements.
    pub line_number: Option<usize>,
    /// Content being replaced, empty for a pure insertion.
    pub original_content: String,
    /// Content to write.
    pub new_content: String,
    /// Why this modification was proposed.
    pub reasoning: String,
    /// Confidence this preserves existing behavior.
    pub safety_level: SafetyLevel,
    /// Filled in by the Automated Patcher at execution time: the exact
    /// bytes needed to restore `target_file` on rollback.
    pub rollback_info: Option<String>,
}

/// One step of an Integration Map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrationStep {
    /// Copy a package file into the project tree.
    FileCopy {
        /// Path within the Update Package.
        source_path: String,
        /// Destination path, relative to `project_root`.
        dest_path: String,
        /// Raw content being written.
        content: String,
        /// Confidence this copy is safe (false only when it overwrites
        /// an existing file, in which case it's emitted as a
        /// Modification instead — kept here for completeness of the
        /// enum's shape).
        safety_level: SafetyLevel,
    },
    /// A textual modification to a file already in (or just copied
    /// into) the project.
    Modification(FileModification),
    /// Install external requirements collected from the package.
    DependencyInstall {
        /// Requirement strings as seen in source (not resolved to a
        /// specific package manager's syntax).
        requirements: Vec<String>,
        /// Command used to verify availability, if configured.
        validation_command: Option<String>,
    },
    /// Parse-check every touched file and optionally run a
    /// user-provided validation command.
    Validation {
        /// Files touched by earlier steps.
        touched_files: Vec<String>,
        /// Command used to validate the integration, if configured.
        validation_command: Option<String>,
    },
}

/// The executable plan produced for one Update Package integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationMap {
    /// Steps in execution order.
    pub steps: Vec<IntegrationStep>,
    /// Rough wall-clock estimate, seconds.
    pub total_estimated_time_seconds: u64,
    /// Aggregate risk.
    pub risk_assessment: RiskLevel,
    /// Human-readable description of how rollback will proceed.
    pub rollback_plan: String,
    /// Human-readable description of how success will be checked.
    pub validation_strategy: String,
    /// Criteria that must hold for the integration to be considered
    /// successful.
    pub success_criteria: Vec<String>,
}

static HIGH_RISK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bexec\s*\(|\b__import__\s*\(|os\.system\s*\(|shell\s*=\s*True").unwrap());

/// Build an Integration Map from an analyzed package and its accepted
/// connection suggestions.
pub fn build_integration_map(
    graph: &PackageDependencyGraph,
    suggestions: &[ConnectionSuggestion],
    project_root: &str,
    validation_command: Option<&str>,
) -> IntegrationMap {
    let mut steps = Vec::new();

    if !graph.external_requirements.is_empty() {
        steps.push(IntegrationStep::DependencyInstall {
            requirements: graph.external_requirements.clone(),
            validation_command: validation_command.map(str::to_string),
        });
    }

    let files_by_path: std::collections::HashMap<&str, &PackageFile> =
        graph.files.iter().map(|f| (f.path.as_str(), f)).collect();

    for path in &graph.integration_order {
        let Some(file) = files_by_path.get(path.as_str()) else {
            continue;
        };
        let dest_path = destination_for(project_root, file);
        if Path::new(&dest_path).exists() {
            let original = std::fs::read_to_string(&dest_path).unwrap_or_default();
            steps.push(IntegrationStep::Modification(FileModification {
                target_file: dest_path,
                modification_type: ModificationType::TextPatch,
                line_number: None,
                original_content: original,
                new_content: file.content.clone(),
                reasoning: format!("destination already exists; overwriting '{path}' requires review"),
                safety_level: SafetyLevel::ReviewRequired,
                rollback_info: None,
            }));
        } else {
            steps.push(IntegrationStep::FileCopy {
                source_path: file.path.clone(),
                dest_path,
                content: file.content.clone(),
                safety_level: SafetyLevel::Safe,
            });
        }
    }

    for suggestion in suggestions {
        steps.push(IntegrationStep::Modification(import_add_step(project_root, suggestion)));
        steps.push(IntegrationStep::Modification(call_site_step(project_root, suggestion)));
    }

    let touched_files: Vec<String> = touched_files(&steps);
    steps.push(IntegrationStep::Validation {
        touched_files: touched_files.clone(),
        validation_command: validation_command.map(str::to_string),
    });

    let risk_assessment = assess_risk(&steps);
    let total_estimated_time_seconds = estimate_seconds(&steps);

    IntegrationMap {
        steps,
        total_estimated_time_seconds,
        risk_assessment,
        rollback_plan: "restore every backed-up file from the pre-flight backup directory, in reverse step order".to_string(),
        validation_strategy: "parse-check every touched file, then run the configured validation command if any".to_string(),
        success_criteria: vec![
            "every touched file parses under its analyzer's parser".to_string(),
            "the validation command, if configured, exits zero".to_string(),
        ],
    }
}

fn destination_for(project_root: &str, file: &PackageFile) -> String {
    let subdir = match file.role {
        Role::Core => "src",
        Role::Utility => "src/utils",
        Role::Config => "config",
        Role::Test => "tests",
        Role::Documentation => "docs",
    };
    let file_name = Path::new(&file.path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.path.clone());
    Path::new(project_root)
        .join(subdir)
        .join(file_name)
        .to_string_lossy()
        .to_string()
}

fn import_add_step(project_root: &str, suggestion: &ConnectionSuggestion) -> FileModification {
    let module = Path::new(&suggestion.orphan_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| suggestion.orphan_path.clone());
    FileModification {
        target_file: resolve_target(project_root, &suggestion.target_path),
        modification_type: ModificationType::ImportAdd,
        line_number: Some(1),
        original_content: String::new(),
        new_content: format!("import {module}"),
        reasoning: format!("connect orphan '{}' via {:?} ({})", suggestion.orphan_path, suggestion.connection_type, suggestion.reasoning),
        safety_level: SafetyLevel::Safe,
        rollback_info: None,
    }
}

fn call_site_step(project_root: &str, suggestion: &ConnectionSuggestion) -> FileModification {
    let module = Path::new(&suggestion.orphan_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| suggestion.orphan_path.clone());
    FileModification {
        target_file: resolve_target(project_root, &suggestion.target_path),
        modification_type: ModificationType::FunctionCall,
        line_number: None,
        original_content: String::new(),
        new_content: format!("# TODO(integration): wire up a call into '{module}' here"),
        reasoning: "call-site insertion is a heuristic guess and needs human confirmation of the right call shape".to_string(),
        safety_level: SafetyLevel::Caution,
        rollback_info: None,
    }
}

fn resolve_target(project_root: &str, target_path: &str) -> String {
    if Path::new(target_path).is_absolute() {
        target_path.to_string()
    } else {
        Path::new(project_root).join(target_path).to_string_lossy().to_string()
    }
}

fn touched_files(steps: &[IntegrationStep]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for step in steps {
        let path = match step {
            IntegrationStep::FileCopy { dest_path, .. } => Some(dest_path.clone()),
            IntegrationStep::Modification(m) => Some(m.target_file.clone()),
            _ => None,
        };
        if let Some(path) = path {
            if seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }
    files
}

fn assess_risk(steps: &[IntegrationStep]) -> RiskLevel {
    let mut points = 0u32;
    for step in steps {
        match step {
            IntegrationStep::Modification(m) => {
                points += match m.safety_level {
                    SafetyLevel::Safe => 0,
                    SafetyLevel::Caution => 1,
                    SafetyLevel::ReviewRequired => 2,
                };
                if HIGH_RISK_PATTERN.is_match(&m.new_content) {
                    points += 2;
                }
            }
            IntegrationStep::FileCopy { content, .. } => {
                if HIGH_RISK_PATTERN.is_match(content) {
                    points += 2;
                }
            }
            _ => {}
        }
    }
    match points {
        0..=1 => RiskLevel::Low,
        2..=4 => RiskLevel::Medium,
        _ => RiskLevel::High,
    }
}

fn estimate_seconds(steps: &[IntegrationStep]) -> u64 {
    steps.len() as u64 * 5
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::connector::ConnectionType;
    use crate::integration::package::analyze_package;

    fn package_file(path: &str, content: &str) -> PackageFile {
        PackageFile {
            path: path.to_string(),
            content: content.to_string(),
            language: Some("python".to_string()),
            role: Role::Utility,
            internal_dependencies: Vec::new(),
            external_dependencies: Vec::new(),
        }
    }

    #[test]
    fn dependency_install_step_precedes_file_copies() {
        let files = vec![package_file("lib.py", "import requests\n")];
        let graph = analyze_package(files);
        let map = build_integration_map(&graph, &[], "/tmp/project-does-not-exist", None);
        let first = &map.steps[0];
        assert!(matches!(first, IntegrationStep::DependencyInstall { .. }));
    }

    #[test]
    fn suggestion_emits_import_and_call_site_modifications() {
        let files = vec![package_file("helper.py", "def helper():\n    pass\n")];
        let graph = analyze_package(files);
        let suggestion = ConnectionSuggestion {
            orphan_path: "helper.py".to_string(),
            target_path: "main.py".to_string(),
            score: 0.8,
            connection_type: ConnectionType::FunctionImport,
            reasoning: "fits".to_string(),
            need: 0.5,
        };
        let map = build_integration_map(&graph, &[suggestion], "/tmp/project-does-not-exist", None);
        let modifications: Vec<&FileModification> = map
            .steps
            .iter()
            .filter_map(|s| match s {
                IntegrationStep::Modification(m) => Some(m),
                _ => None,
            })
            .collect();
        assert!(modifications.iter().any(|m| m.modification_type == ModificationType::ImportAdd));
        assert!(modifications.iter().any(|m| m.modification_type == ModificationType::FunctionCall));
    }

    #[test]
    fn validation_step_is_always_last() {
        let files = vec![package_file("a.py", "x = 1\n")];
        let graph = analyze_package(files);
        let map = build_integration_map(&graph, &[], "/tmp/project-does-not-exist", Some("pytest"));
        assert!(matches!(map.steps.last().unwrap(), IntegrationStep::Validation { .. }));
    }

    #[test]
    fn high_risk_content_pushes_risk_to_high() {
        let files = vec![package_file("danger.py", "os.system(user_input)\n")];
        let graph = analyze_package(files);
        let suggestion = ConnectionSuggestion {
            orphan_path: "danger.py".to_string(),
            target_path: "main.py".to_string(),
            score: 0.9,
            connection_type: ConnectionType::ModuleImport,
            reasoning: "exec-heavy".to_string(),
            need: 0.5,
        };
        let map = build_integration_map(&graph, &[suggestion], "/tmp/project-does-not-exist", None);
        assert_ne!(map.risk_assessment, RiskLevel::Low);
    }
}
