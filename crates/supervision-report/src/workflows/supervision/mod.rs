pub mod archive;
pub mod artifacts;
pub mod clinic;
pub mod domain;
pub mod extract;
pub mod merge;
pub mod pipeline;
pub mod queries;
pub mod transform;
pub mod warehouse;
pub mod workbook;

pub use archive::{ArchiveEntry, ArchiveError, ArchiveStore};
pub use artifacts::{ArtifactClass, StorageLayout};
pub use clinic::{ClinicRule, ClinicRuleError, ClinicRules};
pub use domain::{
    BillingRecord, CertificationRecord, ComplianceRange, ComplianceStatus, DateRange,
    DateRangeError, MergedRow, ProviderLocationGroup, ServiceCategory, ServiceCodes,
};
pub use extract::{ExtractError, Extractor, RawArtifacts, Warehouse, WarehouseError};
pub use merge::{MergeArtifact, MergeError, MergeOutcome, MergeStats, Merger};
pub use pipeline::{PhaseError, PipelinePhase, PipelineSummary, RunStatus, SupervisionPipeline};
pub use transform::{TransformArtifact, TransformError, TransformOutcome, TransformStats, Transformer};
pub use warehouse::SqlxWarehouse;
