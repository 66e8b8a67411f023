pub use super::scan::Entity as Scan;
pub use super::user::Entity as User;
