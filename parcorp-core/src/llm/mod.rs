pub mod anthropic;
pub mod client;
pub mod cost;
pub mod openai;
pub mod prompts;
pub mod retry;
#[cfg(test)]
pub(crate) mod scripted;
