pub mod handlers;
pub mod session;
pub mod validate;

pub use session::CurrentUser;
