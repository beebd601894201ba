//! # Session test utilities
//!
//! Shared fixtures for exercising the session kernel:
//!
//! - Raw token builders (`TokenBuilder`) for arbitrary claims and expiries
//! - State assertions (`StateAssertions`) for readable test failures
//! - A multi-context harness (`TestRealm`) wiring several kernels onto one
//!   shared storage + transport, the shape of same-origin browsing contexts
//! - A wiremock-backed mock identity provider (`MockIdp`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use session_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let realm = TestRealm::new();
//!     let shell = realm.spawn_context("https://shell.example", &[]);
//!
//!     shell.login().await.unwrap();
//!     shell.state().assert_authenticated_as("demo-user-1");
//! }
//! ```

pub mod assertions;
pub mod harness;
pub mod logging;
pub mod mock_idp;
pub mod token_builders;

// Re-export commonly used items
pub use assertions::*;
pub use harness::*;
pub use logging::*;
pub use mock_idp::*;
pub use token_builders::*;
