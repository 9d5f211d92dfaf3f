//! Core types and engines for the immersion establishment directory.
//!
//! This crate has no HTTP or database dependencies.
//! Storage backends implement [`store::EstablishmentStore`]; the merge and
//! search engines are generic over it.

// The store port uses native `async fn` in traits; `Send` bounds are spelled
// out on the trait's return types.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod disclosure;
pub mod error;
pub mod establishment;
pub mod geo;
pub mod merge;
pub mod precedence;
pub mod search;
pub mod siret;
pub mod store;

pub use error::{Error, Result};
pub use siret::Siret;
