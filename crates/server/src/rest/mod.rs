mod health;
mod ingest;
mod router;
mod rules;

pub use router::{router, AppState};
