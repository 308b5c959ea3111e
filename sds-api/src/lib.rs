//! SD Submit API: the HTTP surface, request pipeline wiring and the
//! publication orchestrator.

pub mod handlers;
pub mod project;
pub mod publish;
pub mod router;
pub mod state;
pub mod xml;

pub use router::build_router;
pub use state::AppState;
