pub mod fipe;
pub mod util;

pub use fipe::FipeProvider;
