pub mod config;
pub mod dataset;
pub mod errors;
pub mod evaluation;
pub mod params;
pub mod space;

pub use config::*;
pub use dataset::*;
pub use errors::*;
pub use evaluation::*;
pub use params::*;
pub use space::*;
