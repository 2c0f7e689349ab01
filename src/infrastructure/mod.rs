//! Infrastructure layer: configuration, persistence, and platform access
//!
//! Database connections, the upstream session/extraction clients, the two
//! record stores, logging bootstrap, and the diagnostics sink.

pub mod config;
pub mod database_connection;
pub mod diagnostics;
pub mod extractor;
pub mod logging;
pub mod session;
pub mod student_repository;
pub mod tenant_repository;

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager};
pub use database_connection::DatabaseConnection;
pub use diagnostics::DiagnosticsSink;
pub use extractor::{ExtractedTenant, ExtractionOutcome, ExtractionStats, GuestListClient};
pub use logging::{init_logging, init_logging_with_config};
pub use session::{FormLoginAcquirer, PlatformSession, SessionAcquirer, SessionError};
pub use student_repository::{CreateResult, StudentRepository};
pub use tenant_repository::{FloorGrid, TenantRepository};
