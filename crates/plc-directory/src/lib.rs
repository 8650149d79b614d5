//! PLC Directory Client
//!
//! Parses PLC operations (the signed changes that make up a `did:plc`'s
//! history) and reads them from a PLC directory: the paginated `/export`
//! stream of all operations, and the per-DID audit log.
//!
//! ```no_run
//! use std::ops::ControlFlow;
//! use plc_directory::{PlcImporter, Since};
//!
//! # async fn example() -> atproto_identity::Result<()> {
//! let mut importer = PlcImporter::new(Since::Beginning);
//! importer
//!     .fetch(|ops| {
//!         for op in ops {
//!             println!("{} {:?}", op.did, op.handles);
//!         }
//!         ControlFlow::Continue(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod importer;
mod operation;

pub use importer::{ErrorHandler, ImporterState, PlcImporter, Since, PAGE_SIZE};
pub use operation::{PlcOperation, PLC_OPERATION_TYPE};
