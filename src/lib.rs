pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod normalize;
pub mod store;
pub mod trainer;

pub use engine::{Core, Sentence};
pub use config::Config;
pub use error::{MimicError, Result};
pub use model::{Message, Scope, User};
pub use normalize::Normalizer;
pub use store::{MarkovStore, WriteOutcome};
