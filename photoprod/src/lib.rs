#[macro_use]
extern crate lazy_static;
pub extern crate vector;

pub mod error;
pub mod event;
pub mod histogram;
pub mod intensity;
pub mod lund;
pub mod orchestrator;
pub mod particle;
pub mod phase_space_generator;
pub mod reaction;
pub mod run_card;
pub mod sampler;

pub use crate::error::{GeneratorError, Result};
pub use crate::event::KinematicEvent;
pub use crate::intensity::{FnIntensity, IntensityOracle, TSlopeIntensity};
pub use crate::orchestrator::{EventOrchestrator, GenerationSettings, GenerationState, KinematicVariable};
pub use crate::reaction::ReactionTopology;
pub use crate::sampler::{PhaseSpaceSampler, SamplerSettings};
