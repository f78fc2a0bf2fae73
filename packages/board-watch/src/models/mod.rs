pub mod brand;
pub mod notification;
pub mod post;
pub mod user;

pub use brand::Brand;
pub use notification::{BrandNotification, PostNotification};
pub use post::{NewPost, Post};
pub use user::{User, UserPostTimeRow};
