//! Audit engine for pagescope.
//!
//! Audits are pure scoring functions over an [`ArtifactSet`](pagescope_types::ArtifactSet).
//! The engine guards each audit's declared inputs and turns unmeasurable
//! data into not-scored results; [`aggregate`] folds the results into
//! weighted report groups.

pub mod aggregate;
pub mod audit;
pub mod audits;
pub mod engine;
pub mod error;
pub mod report;

pub use aggregate::{aggregate, GroupMember, GroupScore};
pub use audit::{ArtifactView, Audit, AuditInfo, AuditOutput};
pub use engine::{run_audit, run_audits, AuditRegistry};
pub use error::{AuditError, AuditFailure};
pub use report::Report;
