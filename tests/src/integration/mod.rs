//! End-to-end flows across the fabric components.

#[cfg(test)]
pub(crate) mod fixtures;
#[cfg(test)]
mod invoicing;
#[cfg(test)]
mod streaming;
