//! Declarative proposal forms: the field table, the per-type catalog and the
//! validation applied before anything reaches the chain.

pub mod catalog;
pub mod fields;
pub mod modifiers;
pub mod registry;
pub mod values;

pub use catalog::{
    ArgSource, ArgType, ContractAction, Fallback, FormBuilder, ProposalFormDefinition,
    ProposalType, TxDescriptor, TxTarget,
};
pub use fields::{Field, FieldKind, FieldOverride, FieldSpec, ModifierId};
pub use modifiers::{ModifierContext, ModifierError, resolve_values};
pub use registry::{CustomValidator, FormRegistry, RegistryError, ValidationContext, ValidationError};
pub use values::{FormHandle, FormValues};
