pub mod batch;
pub mod prompt_sequence;
