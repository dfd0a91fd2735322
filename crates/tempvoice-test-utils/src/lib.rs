//! # Temp Voice Test Utilities
//!
//! Mocks and fixtures for exercising the engine without a database or a
//! real platform.
//!
//! ## Modules
//!
//! - `mock_provider` - Scripted [`Provider`](tempvoice_service::provider::Provider)
//!   that records every call and tracks rooms, overwrites and surfaces
//! - `memory_store` - In-memory session, access-list and trigger-config stores
//! - `fixtures` - Well-known ids, test configuration and a wired-up engine
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tempvoice_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let harness = TestEngine::new();
//!     let orchestrator = OrchestratorHandle::new(harness.engine.clone());
//!
//!     orchestrator.notify(arrive(U1, "Ada")).await.unwrap();
//!     orchestrator.wait_idle().await.unwrap();
//!
//!     assert_eq!(harness.provider.live_resources().len(), 1);
//! }
//! ```

pub mod fixtures;
pub mod memory_store;
pub mod mock_provider;

pub use fixtures::*;
pub use memory_store::*;
pub use mock_provider::*;
