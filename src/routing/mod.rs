pub mod dispatcher;
pub mod router;

pub use dispatcher::{Action, Controller, ControllerRegistry, Dispatcher, RequestContext, Target};
pub use router::{Route, RouteError, RouteTable, Router};
