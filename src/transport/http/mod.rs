pub mod router;
pub mod types;
pub mod handlers {
    pub mod common;
    pub mod debug;
    pub mod health;
    pub mod lifecycle;
    pub mod status;
    pub mod testing;
}

pub use router::{create_router, ApiDoc};
pub use types::AppState;
