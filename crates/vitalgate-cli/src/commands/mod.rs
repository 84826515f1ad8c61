pub mod decode;
pub mod discover;
pub mod queue;
pub mod run;
