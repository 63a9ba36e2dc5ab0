//! Shared primitive types used across the verification engine.

use uuid::Uuid;

/// A stable, unique identifier for a verification case.
pub type CaseId = Uuid;

/// A stable, unique identifier for a beneficial owner record.
pub type OwnerId = Uuid;

/// A stable, unique identifier for a submitted document.
pub type DocumentId = Uuid;

/// The platform-side identifier of the person or business under
/// verification. Opaque to this crate.
pub type SubjectId = String;
