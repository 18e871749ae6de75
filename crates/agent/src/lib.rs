//! Scheduling agent - policy-driven orchestration of the booking workflow
//!
//! This crate drives a meeting-booking conversation:
//! - Feeds thread history to a pluggable decision policy (`policy`, `openai`)
//! - Executes the fixed operation catalog on its behalf (`catalog`)
//! - Suspends at human checkpoints and resumes from widget actions (`actions`)
//! - Commits confirmed invites as bookings (`booking`)
//!
//! # Control flow
//!
//! 1. **Turn** (`orchestrator`) - user text is appended, the policy chooses
//!    operations until it stops or hits a forced stop-point.
//! 2. **Checkpoint** - `search_contacts`, `find_availability` and
//!    `draft_invite` render a widget and end the turn.
//! 3. **Action** (`actions`) - the widget's action locks it, injects hidden
//!    context, and runs another turn; `invite.send` books instead.
//!
//! The policy only selects operations. Contact lookup, slot lists, defaults and
//! bookings are deterministic and never come from policy text.

pub mod actions;
pub mod booking;
pub mod catalog;
pub mod conversation;
pub mod error;
pub mod openai;
pub mod orchestrator;
pub mod policy;
pub mod scripted;
pub mod service;

pub use actions::{ActionContext, ActionHandler, ActionOutcome};
pub use catalog::{FixedSlotProvider, OperationCatalog, SlotProvider};
pub use error::SchedulerError;
pub use orchestrator::{Orchestrator, OrchestratorSettings, TurnOutcome, TurnRequest};
pub use policy::{DecisionPolicy, PolicyConfig, PolicyError, PolicyTurn};
pub use scripted::ScriptedPolicy;
pub use service::{build_policy, Scheduler};
