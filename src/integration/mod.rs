//! Update-package integration: the Code Connector (C7), Package
//! Analyzer (C8), Integration Mapper (C9), and Automated Patcher (C10)
//! that together turn a dropped-in update package into an applied,
//! rollback-safe set of project changes.

pub mod connector;
pub mod mapper;
pub mod package;
pub mod patcher;

pub use connector::{Capabilities, ConnectionSuggestion, ConnectionType};
pub use mapper::{IntegrationMap, IntegrationStep, RiskLevel};
pub use package::{PackageDependencyGraph, PackageFile, Role};
pub use patcher::{AutomatedPatcher, ExecutionContext};
