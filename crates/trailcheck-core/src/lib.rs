//! trailcheck-core - Commit message grammar and reference extraction
//!
//! This crate provides the network-free half of trailcheck:
//! - Validating a commit message against the summary / body / trailer grammar
//! - Extracting ticket, changeset and username references with their positions
//! - Pulling human-readable details out of tracker and profile responses
//!
//! # Validating a message
//!
//! ```
//! use trailcheck_core::{validate, Severity};
//!
//! let findings = validate("widgets: fix bug\n");
//! assert!(findings.iter().all(|f| f.severity == Severity::Warning));
//! assert!(findings.iter().any(|f| f.message.contains("capital letter")));
//! ```
//!
//! # Extracting references
//!
//! ```
//! use trailcheck_core::{extract, EntityKind};
//!
//! let occurrences = extract("Widgets: Fix bug.\n\nProps alice.\nFixes #100.");
//! assert_eq!(occurrences.len(), 2);
//! assert_eq!(occurrences[0].kind, EntityKind::Profile);
//! assert_eq!(occurrences[1].identifier, "100");
//! ```
//!
//! Both functions are pure: the same text always produces the same output.

pub mod entity;
pub mod extract;
pub mod finding;
pub mod grammar;
pub mod message;
pub mod scrape;
pub mod trailer;

pub use entity::{EntityKey, EntityKind, is_valid_username};
pub use extract::{Occurrence, extract};
pub use finding::{Finding, Severity, code};
pub use grammar::validate;
pub use message::{Line, Message};
pub use trailer::TrailerKind;
