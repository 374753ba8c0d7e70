pub mod models;

pub use models::{
    Cart, CartItem, Enrollment, NewCartItem, Session, User, add_cart_item, cart_items, cart_total,
    clear_cart, create_session, delete_session, find_cart, find_session, find_user_by_email,
    find_user_by_id, find_user_by_username, get_or_create_cart, init_db, insert_enrollment,
    insert_user, is_enrolled, remove_cart_item, user_enrollments,
};
