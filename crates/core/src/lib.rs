pub mod config;
pub mod error;
pub mod observation;
pub mod record;

pub use config::PulseConfig;
pub use error::*;
pub use observation::*;
pub use record::*;
