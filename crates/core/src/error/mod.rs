//! # Error Handling Framework
//!
//! Structured error management for the screening engine, shared by the
//! gateway, SAR engine, vigilance scheduler and API surface.
//!
//! ## Core Features
//!
//! - **Structured Error Types**: Categorized error codes for consistent handling
//! - **Rich Context**: Request context and error metadata for debugging
//! - **Severity Classification**: Error categorization for appropriate responses
//! - **Metrics Integration**: Error tracking and monitoring capabilities
//!
//! ## Error Categories
//!
//! - **Validation**: Input validation and business rule violations
//! - **Database**: Persistence layer errors and constraint violations
//! - **Network**: External service communication failures
//! - **Gateway**: Provider dispatch, circuit breaker and rate limit errors
//! - **Compliance**: Consent and compliance policy violations
//! - **Screening**: SAR-loop and vigilance domain errors
//! - **Configuration**: System setup and configuration issues
//! - **Internal**: Unexpected system errors requiring investigation
//!
//! ## Context Tracking
//!
//! - **Request Context**: HTTP request tracking with correlation IDs
//! - **Error Context**: Structured error metadata and stack traces
//! - **Tenant Context**: Multi-tenant error isolation and tracking
//!
//! ## Monitoring Integration
//!
//! - **Error Metrics**: Prometheus metrics for error rates and patterns
//! - **Structured Logging**: Consistent error logging with correlation
//!
//! ## Usage Examples
//!
//! ```rust
//! use screening_core::error::{Error, ErrorCode, Result};
//!
//! fn validate_subject_reference(reference: &str) -> Result<()> {
//!     if reference.is_empty() {
//!         return Err(Error::validation("subject reference cannot be empty"));
//!     }
//!     Ok(())
//! }
//!
//! async fn dispatch_query() -> Result<()> {
//!     validate_subject_reference("acme-123")
//!         .map_err(|e| e.add_trace("screening request validation"))?;
//!     Ok(())
//! }
//! ```

pub mod codes;
pub mod context;
pub mod framework;
pub mod metrics;

pub use codes::ErrorCode;
pub use context::ErrorContext;
pub use framework::{Error, ErrorCategory, ErrorSeverity, Result};
pub use metrics::ErrorMetrics;