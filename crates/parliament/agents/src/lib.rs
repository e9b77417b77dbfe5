//! # parliament-agents
//!
//! The six subsystems that sit beside the adjudicator. Each is a
//! [`SubsystemLogic`](parliament_compliance::SubsystemLogic) meant to be
//! wrapped in a [`Subsystem`](parliament_compliance::Subsystem):
//!
//! | Logic | Role |
//! |-------|------|
//! | [`InterpreterLogic`] | routing: intent, ambiguity, target subsystem |
//! | [`StrategistLogic`] | planning: scenarios, decision tree, timeline |
//! | [`ArtisanLogic`] | generative: mythos, worldbuilding, aesthetics, symbols |
//! | [`LedgerLogic`] | quantification: risk, variance, backtests |
//! | [`MirrorLogic`] | reflection: coherence, load, progress, alignment |
//! | [`ExecutorLogic`] | action: adjudicated side effects |
//!
//! The heuristics are deliberately simple; the wrapper only relies on each
//! being safe to retry and failing with a `LogicError`.

#![deny(unsafe_code)]

pub mod artisan;
pub mod executor;
pub mod interpreter;
pub mod ledger;
pub mod mirror;
pub mod strategist;

pub use artisan::{ArtisanInput, ArtisanLogic, ArtisanOutput, CreativeType};
pub use executor::{ExecutionResult, ExecutionStatus, ExecutorInput, ExecutorLogic, Task};
pub use interpreter::{InterpreterInput, InterpreterLogic, InterpreterOutput, IntentKind, Routing};
pub use ledger::{AnalysisType, LedgerData, LedgerInput, LedgerLogic, LedgerOutput, RiskLevel};
pub use mirror::{MirrorInput, MirrorLogic, MirrorOutput, ReflectionEvent};
pub use strategist::{StrategistInput, StrategistLogic, StrategistOutput, TimeHorizon};
