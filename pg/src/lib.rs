pub mod agent;
pub mod env;
pub mod error;
pub mod learn;
pub mod play;
pub mod prelude;
pub mod util;

#[cfg(test)]
pub mod test;
