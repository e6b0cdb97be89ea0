pub mod reopen;

#[cfg(feature = "cli")]
pub mod cli;
