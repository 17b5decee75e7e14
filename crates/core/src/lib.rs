pub mod candidate;
pub mod config;
pub mod duration;
pub mod error;
pub mod naming;
pub mod rule;

pub use candidate::*;
pub use config::Config;
pub use error::*;
pub use rule::*;
