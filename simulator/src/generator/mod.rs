pub mod phantom;
pub mod template;
