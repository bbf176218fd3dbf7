//! Text poisoning: corpus management and Markov sentence generation

pub mod corpus;
pub mod model;

pub use corpus::{with_fallback, CorpusManager, GENERATION_ERROR_PREFIX};
pub use model::MarkovModel;
