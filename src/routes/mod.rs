pub mod auth;
pub mod comments;
pub mod moderation;
pub mod notifications;

pub use comments::comments_routes;
pub use moderation::moderation_routes;
pub use notifications::notifications_routes;
