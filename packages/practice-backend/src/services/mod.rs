pub mod practice;
pub mod scope;

pub use practice::{PracticeError, PracticeService};
pub use scope::ScopeResolver;
