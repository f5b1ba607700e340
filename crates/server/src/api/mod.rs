pub mod capabilities;
pub mod handlers;
pub mod middleware;
pub mod process;
pub mod routes;

pub use routes::create_router;
