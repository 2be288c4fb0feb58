pub mod model;
pub mod openai;
