//! Ground-truth interaction store and the CSV frequency tables.
//!
//! The store is an externally produced artifact describing a human-object
//! interaction dataset: verb and object vocabularies, the interactions
//! between them, annotation counts and the set of rare interactions. This
//! crate only consumes it; [`GroundTruth::load`] turns the serialized store
//! into three typed tables (interactions, verbs, objects).
//!
//! Count arrays are matched to their vocabularies by explicit length checks,
//! never by silent positional truncation.
//!
//! The [`tables`] module reads and writes every CSV artifact of the pipeline:
//! `Verb,Object,Frequency`, `Verb,Object,Frequency,IsRare`, `Verb,Frequency`,
//! `Object,Frequency` and the merged ten-column table.
//!
//! # Example
//! ```no_run
//! use hoi_dataset::GroundTruth;
//!
//! # fn main() -> Result<(), hoi_dataset::StoreError> {
//! let gt = GroundTruth::load("hico_det.json")?;
//! for row in gt.interactions() {
//!     println!("{},{}: {} ({})", row.verb, row.object, row.frequency, row.rarity);
//! }
//! # Ok(()) }
//! ```

mod store;
pub mod tables;

pub use store::{GroundTruth, StoreError};
pub use tables::{TableError, TermColumn};
