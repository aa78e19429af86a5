pub mod api;
pub mod bridge;
pub mod model;
pub mod normalize;
pub mod session;
pub mod settings;

pub use api::{Client, Error};
pub use bridge::{Bridge, Notification, Request, RequestKind};
pub use session::Session;
pub use settings::{PointMap, Settings};
