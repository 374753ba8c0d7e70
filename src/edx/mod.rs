pub mod client;
pub mod models;

pub use client::{EdxClient, HttpClient, create_client};
pub use models::{CourseMode, CoursePage, NewAccount, PriceInfo, RegisteredUser};
