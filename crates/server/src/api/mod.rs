pub mod handlers;
pub mod middleware;
pub mod orchestrator;
pub mod posting;
pub mod routes;

pub use routes::create_router;
