mod handlers;
mod types;

pub use handlers::*;
pub use types::*;
