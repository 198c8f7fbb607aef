//! Per-field value resolution for address inputs.

pub mod address;
pub mod ens;
pub mod members;

pub use address::{AddressInput, HelperText, InputMode, LookupTicket, MemberTicket};
pub use ens::{EnsResolver, NameResolver, Profile, ProfileLookup};
pub use members::{Member, MemberDirectory, MemberOption, truncate_addr};
