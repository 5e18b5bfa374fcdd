pub mod codec;
pub mod diagnostics;
pub mod documents;
pub mod process;
pub mod protocol;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
