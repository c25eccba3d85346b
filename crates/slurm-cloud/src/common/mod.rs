pub mod cli;
pub mod config;
pub mod error;
pub mod fsutils;
pub mod setup;
#[cfg(test)]
pub(crate) mod wrapped;

#[cfg(test)]
pub(crate) use wrapped::WrappedRcRefCell;
