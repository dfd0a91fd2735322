//! Temp Voice Service Library
//!
//! Ephemeral voice-room lifecycle and access-control engine. A member who
//! enters a community's trigger room gets a transient room of their own; the
//! engine keeps that room's permissions in step with the owner's feature
//! toggles and allow/deny list, runs the short interactive dialogs the owner
//! uses to change them, and deletes the room once it empties.
//!
//! # Architecture
//!
//! ```text
//! notification ──► Orchestrator (actor, one task per notification)
//!                    ├── provisioning ──┐
//!                    └── deprovisioning ┤
//!                                       ├── permissions::compile
//!                                       ├── SessionStore / AccessControlStore
//!                                       └── Provider (create / delete / move / overwrites)
//! live room ──► panel task ──► Dialog ──► flows::step_for(action)
//! ```
//!
//! Three sources of truth are kept consistent: the session row, the access
//! list and the live room on the platform. Coordination is single-writer per
//! owner through [`claims::ClaimTable`]; there is no lock across owners.
//!
//! # Key Design Decisions
//!
//! - **Session outlives rooms**: the row is the owner's template and is only
//!   deleted with their community membership.
//! - **Minimal access list**: entries restating the mode's default are
//!   removed, never stored.
//! - **One dialog per surface**: the [`dialog::DialogRegistry`] retires the
//!   previous dialog before a surface is bound again.
//! - **Transport-agnostic**: all platform effects go through
//!   [`provider::Provider`]; the embedding process supplies it and feeds
//!   notifications to [`orchestrator::OrchestratorHandle`].
//!
//! # Modules
//!
//! - [`orchestrator`] - Notification dispatch and shutdown
//! - [`controllers`] - Provisioning and deprovisioning
//! - [`flows`] - Owner configuration flows and the control panel task
//! - [`dialog`] - Time-boxed owner-scoped dialogs and their registry
//! - [`permissions`] - Settings + access list -> overwrite set
//! - [`repositories`] - Session, access-list and trigger-config stores
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types

pub mod claims;
pub mod config;
pub mod context;
pub mod controllers;
pub mod dialog;
pub mod errors;
pub mod flows;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod permissions;
pub mod provider;
pub mod repositories;
pub mod rooms;
pub mod surface;

pub use context::EngineContext;
pub use errors::TempVoiceError;
pub use orchestrator::{Notification, OrchestratorHandle};
