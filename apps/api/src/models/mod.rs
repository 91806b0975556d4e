pub mod plan;
pub mod question;
pub mod role;
pub mod session;
