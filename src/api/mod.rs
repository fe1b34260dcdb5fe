pub mod input;
pub mod notify;
pub mod server;

pub use input::{InputSource, InputSourceManager};
pub use server::AppState;
