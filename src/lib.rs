//! Proto Column Filter
//!
//! Row predicates over table cells whose values are serialized protobuf
//! messages. A predicate names a column, a field path inside the message and
//! an operand, and carries everything the storage side needs to evaluate it:
//! the message schema travels with the predicate, so the evaluating process
//! never needs the compiled message types.
//!
//! ## Features
//!
//! - **Schema Shipping**: Message schemas and their import closure are pruned, framed and gzipped into a payload
//! - **Content Keys**: Payloads are identified by type name plus a 128-bit content hash
//! - **Schema Caching**: The evaluation side rebuilds each distinct payload once
//! - **Scalar Comparisons**: Dotted field paths compared with a scalar operand or a byte comparator
//! - **Message Matching**: Whole-message equality, exact, any and none matching
//! - **Predicate Groups**: AND/OR trees with each distinct payload bundled once
//!
//! ## Architecture
//!
//! ```text
//! caller                                   evaluator
//! ------                                   ---------
//! SchemaRegistry                           SchemaCache
//! ├── ResourceDiscovery (*.desc)           ├── SchemaKey -> Schema
//! ├── SchemaCodec::encode ── payload ──►   └── SchemaCodec::decode
//! └── PredicateBuilder                     ColumnEvaluator / GroupEvaluator
//!     └── ColumnPredicate / PredicateGroup ── bytes ──► RowFilter::on_value
//! ```

pub mod cache;
pub mod checksum;
pub mod codec;
pub mod compare;
pub mod compress;
pub mod config;
pub mod discovery;
pub mod error;
pub mod field_path;
pub mod group;
pub mod message;
pub mod message_match;
pub mod predicate;
pub mod registry;
pub mod schema;
mod wire;

pub use cache::{SchemaCache, SchemaKey};
pub use checksum::{BundleDigest, ContentHash};
pub use codec::SchemaCodec;
pub use compare::{ByteComparator, CompareOp, ComparatorRegistry, Scalar};
pub use config::FilterConfig;
pub use discovery::{DirectoryDiscovery, EmbeddedDiscovery, Resource, ResourceDiscovery, StaticDiscovery};
pub use error::{FilterError, Result};
pub use group::{Filter, FilterEvaluator, GroupEvaluator, Operator, PredicateGroup};
pub use message::{DynamicMessage, Value};
pub use message_match::MatchOp;
pub use predicate::{ColumnEvaluator, ColumnPredicate, Operand, PredicateBuilder, ReturnCode, RowFilter, RowState};
pub use registry::{EncodedSchema, SchemaRegistry};
pub use schema::{Schema, SchemaPool};
