pub mod crypto;
pub mod in_memory;
pub mod soap;

#[cfg(test)]
pub(crate) mod unreachable;
