pub mod api;
pub mod collect;
pub mod config;
pub mod messaging;
pub mod model;
pub mod observability;
pub mod publish;
pub mod worker;
