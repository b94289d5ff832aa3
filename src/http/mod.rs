pub mod encoding;
pub mod login;
pub mod response;
pub mod server;
