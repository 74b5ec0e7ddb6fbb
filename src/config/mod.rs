pub mod global;
pub mod source;
pub mod template;
