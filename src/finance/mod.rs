//! Personal-finance agents and their tools
//!
//! - [`arithmetic`]: the five calculator tools
//! - [`data`]: the validated transaction dataset
//! - [`query`]: schema inspection and read-only SQL over the dataset
//! - [`documents`]: document stores and `file_search`
//! - [`bootstrap`]: wiring of the five agents into a handoff graph

pub mod arithmetic;
pub mod bootstrap;
pub mod data;
pub mod documents;
pub mod prompts;
pub mod query;

pub use bootstrap::{bootstrap, FinanceApp};
pub use data::{TableMetadata, Transaction, TransactionData, ValidationIssue};
pub use documents::{DocumentStore, FileSearchTool, LocalDocumentStore, StoreInfo, UploadOutcome, UploadStatus};
pub use query::{ColumnsTool, ExecuteSqlTool, MetadataTool};
