pub mod handlers;
pub mod intel;
pub mod middleware;
pub mod routes;

pub use routes::create_router;
