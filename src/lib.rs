//! Tuya Cloud automation engine for solar-aware load control
//!
//! Talks to the Tuya Open API with HMAC-SHA256 request signing, discovers
//! the devices of a space, reads their shadow properties, and compiles a
//! small set of energy heuristics (battery protection, solar surplus and
//! deficit, night guard) into cloud scene rules.
//!
//! # Quick start
//!
//! ```no_run
//! use tuya_automation::{
//!     AutomationConfig, TuyaClient, TuyaCredentials, WorkflowOrchestrator,
//! };
//!
//! # async fn run() -> tuya_automation::Result<()> {
//! let credentials = TuyaCredentials::from_env()?;
//! let client = TuyaClient::new(credentials, tuya_automation::base_url_from_env())?;
//! let config = AutomationConfig::load("automation.yaml")?;
//! let orchestrator = WorkflowOrchestrator::new(client, config);
//!
//! let proposals = orchestrator.propose_scenes("space-id", None).await?;
//! for rule in orchestrator.build_scene_payloads(&proposals, "space-id") {
//!     orchestrator.create_scene(&rule, true, true).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod heuristics;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod redact;
pub mod workflow;

pub use cache::{Clock, ContextCache, SpaceSnapshot, SystemClock, TtlCache};
pub use client::{SpaceDeviceQuery, TuyaClient};
pub use config::{base_url_from_env, AutomationConfig, TuyaCredentials, DEFAULT_API_BASE_URL};
pub use error::{Result, TuyaError};
pub use heuristics::{
    build_proposal, build_proposals, HeuristicContext, HeuristicKind, HeuristicProposal,
};
pub use mapping::MappingRegistry;
pub use model::{Device, Property, SceneRule};
pub use redact::redact;
pub use workflow::{extract_rule_id, SceneCreateOutcome, WorkflowOrchestrator};
