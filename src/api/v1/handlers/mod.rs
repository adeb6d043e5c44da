pub mod authorize;
pub mod events;
pub mod health;
pub mod userinfo;
