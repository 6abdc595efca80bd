pub mod media;
pub mod path;
pub mod request;
pub mod response;
