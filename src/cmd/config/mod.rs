pub mod check;
pub mod template;
