//! Guard: integrity proofs and redaction before disclosure.
//!
//! Everything returned to a caller outside the trust boundary passes through
//! the [`DisclosureGuard`]; memory states can be attested through the
//! [`IntegrityGuard`].
//!
//! # Modules
//!
//! - [`patterns`]   — `SensitivePattern` identifiers, `RegexRedactor`
//! - [`integrity`]  — `MemoryRoot`, `Proof`, `IntegrityGuard`
//! - [`disclosure`] — `DisclosureGuard` (fail-safe `sanitize`)

pub mod disclosure;
pub mod integrity;
pub mod patterns;

pub use disclosure::{DisclosureGuard, REDACTION_PLACEHOLDER};
pub use integrity::{IntegrityGuard, MemoryRoot, Proof, MEMORY_INTEGRITY_STATEMENT};
pub use patterns::{RegexRedactor, SensitivePattern, SENSITIVE_FIELD_MASK};
