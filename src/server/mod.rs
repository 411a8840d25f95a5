mod handlers;
mod models;

pub use handlers::{router, run_server};
