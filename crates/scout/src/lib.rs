pub mod agent;
pub mod errors;
pub mod geo;
pub mod models;
pub mod prompt;
pub mod prompt_template;
pub mod providers;
pub mod relay;
pub mod tools;
