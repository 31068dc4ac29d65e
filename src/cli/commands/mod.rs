pub mod route;
pub mod serve;
pub mod sql;
