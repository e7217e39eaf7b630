pub mod actor;
pub mod comment;
pub mod interaction;
pub mod moderation;
pub mod notification;
pub mod page;

pub use actor::*;
pub use comment::*;
pub use interaction::*;
pub use moderation::*;
pub use notification::*;
pub use page::*;
