pub mod content;
pub mod sessions;
pub mod signals;

pub use content::*;
pub use sessions::*;
pub use signals::*;
