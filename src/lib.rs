//! Build JSON constraint graphs, validate documents against them, and emit
//! deterministic Rust source that reconstructs the same graphs.
//!
//! The flow is: compile a schema document (or assemble constraints through
//! the builder functions), validate with it, or hand a batch of validators
//! to [`Generator`] and get back a formatted Rust module whose statics
//! rebuild the graphs at first use. Named `$ref` definitions are shared, not
//! inlined, so self-referential schemas generate finite output.

pub mod cli;
pub mod constraint;
pub mod format;
pub mod generator;
pub mod schema;
pub mod validate;

pub use constraint::{
    all, any, array, boolean, empty, integer, not, number, object, one_of, reference, string,
    validator, AllConstraint, AnyConstraint, ArrayConstraint, BooleanConstraint, Constraint,
    ConstraintMap, EnumConstraint, IntegerConstraint, NumberConstraint, ObjectConstraint,
    OneOfConstraint, RefEntry, ReferenceConstraint, Scalar, SchemaId, StringConstraint, Validator,
};
pub use format::{Canonicalize, FormatError, PrettyPrinter};
pub use generator::{GenError, Generator};
pub use schema::{compile, SchemaError};
pub use validate::ValidationError;
