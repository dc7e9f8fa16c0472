pub mod config;
pub mod drift;
pub mod extract;
pub mod graph;
pub mod ontology;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod scheduler;
pub mod snapshot;
pub mod storage;
pub mod summary;
pub mod version;

pub use config::Config;
pub use drift::{Severity, Violation};
pub use extract::Extractor;
pub use graph::CodeGraph;
pub use ontology::{CompiledOntology, Ontology};
pub use pipeline::{AnalysisOutcome, AnalysisRequest, Pipeline};
pub use render::{DiagramType, Renderer};
pub use report::Report;
pub use scheduler::{Scheduler, TriggerPayload, TriggerResponse};
pub use snapshot::SnapshotProvider;
pub use storage::{FileVersionStore, VersionSelector, VersionStore};
pub use version::{DiagramVersion, Project, TriggerSource};
