// handlers/mod.rs - controllers reachable through the dispatcher
//
// Every public URL is first rewritten by the route table into
// `/controller/action/args`; the names registered here are the valid
// controller segments:
//
//   home     banner and health probe
//   error    fixed 404/400 responses
//   product  listing, create, edit, mass delete
//   user     sign up, sign in, logout check, token refresh

pub mod error;
pub mod home;
pub mod product;
pub mod request;
pub mod user;
pub mod validation;

pub use error::ErrorHandler;
pub use home::HomeController;
pub use product::ProductController;
pub use request::{sanitize, HttpRequest, JsonResponse};
pub use user::UserController;

use crate::routing::ControllerRegistry;

/// The controllers the service ships with
pub fn registry() -> ControllerRegistry {
    let mut registry = ControllerRegistry::new();
    registry
        .register("home", HomeController::new)
        .register("error", |_| ErrorHandler)
        .register("product", ProductController::new)
        .register("user", UserController::new);
    registry
}
