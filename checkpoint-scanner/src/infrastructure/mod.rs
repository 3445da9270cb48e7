pub mod api_client;
pub mod routes;

pub use api_client::{ApiClient, ClientRoles};
