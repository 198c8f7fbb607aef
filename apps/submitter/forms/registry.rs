use super::{
    catalog::{ProposalFormDefinition, ProposalType, default_catalog},
    values::FormValues,
};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown proposal type: {0}")]
    NotFound(String),
    #[error("{proposal_type} requires `{field}` but defines no such field")]
    UnknownRequiredField {
        proposal_type: ProposalType,
        field: String,
    },
}

/// Named checks a form can opt into on top of the required-field check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CustomValidator {
    /// The applicant must not be the organization's own address.
    NonDaoApplicant,
}

impl CustomValidator {
    pub fn name(self) -> &'static str {
        match self {
            CustomValidator::NonDaoApplicant => "nonDaoApplicant",
        }
    }

    fn field(self) -> &'static str {
        match self {
            CustomValidator::NonDaoApplicant => "applicant",
        }
    }

    fn reason(self) -> &'static str {
        match self {
            CustomValidator::NonDaoApplicant => "Applicant cannot be the DAO address",
        }
    }

    fn check(self, values: &FormValues, context: &ValidationContext) -> bool {
        match self {
            CustomValidator::NonDaoApplicant => match values.get("applicant") {
                Some(applicant) => applicant
                    .trim()
                    .parse::<Address>()
                    .map(|address| address != context.dao_address)
                    .unwrap_or(true),
                None => true,
            },
        }
    }
}

impl fmt::Display for CustomValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Organization facts the custom validators need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationContext {
    pub dao_address: Address,
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ValidationError {
    #[error("required fields missing: {}", missing_fields.join(", "))]
    MissingFields { missing_fields: Vec<String> },
    #[error("{field}: {reason}")]
    CustomValidator {
        validator: CustomValidator,
        field: String,
        reason: String,
    },
}

impl ValidationError {
    /// The field the form should highlight.
    pub fn first_field(&self) -> &str {
        match self {
            ValidationError::MissingFields { missing_fields } => missing_fields
                .first()
                .map(String::as_str)
                .unwrap_or_default(),
            ValidationError::CustomValidator { field, .. } => field,
        }
    }

    pub fn references(&self, field: &str) -> bool {
        match self {
            ValidationError::MissingFields { missing_fields } => {
                missing_fields.iter().any(|name| name == field)
            }
            ValidationError::CustomValidator { field: name, .. } => name == field,
        }
    }
}

fn is_blank(values: &FormValues, name: &str) -> bool {
    values.get(name).is_none_or(|value| value.trim().is_empty())
}

/// Read-only lookup of form definitions by proposal type.
#[derive(Debug, Clone, Default)]
pub struct FormRegistry {
    forms: HashMap<ProposalType, Arc<ProposalFormDefinition>>,
}

impl FormRegistry {
    pub fn new(definitions: Vec<ProposalFormDefinition>) -> Self {
        let forms = definitions
            .into_iter()
            .map(|definition| (definition.proposal_type, Arc::new(definition)))
            .collect();
        Self { forms }
    }

    pub fn with_default_catalog() -> Result<Self, RegistryError> {
        Ok(Self::new(default_catalog()?))
    }

    pub fn resolve(&self, proposal_type: ProposalType) -> Result<Arc<ProposalFormDefinition>, RegistryError> {
        self.forms
            .get(&proposal_type)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(proposal_type.id().to_string()))
    }

    pub fn resolve_id(&self, type_id: &str) -> Result<Arc<ProposalFormDefinition>, RegistryError> {
        self.resolve(type_id.parse()?)
    }

    /// Definitions in catalog order.
    pub fn definitions(&self) -> Vec<Arc<ProposalFormDefinition>> {
        ProposalType::ALL
            .iter()
            .filter_map(|ty| self.forms.get(ty).cloned())
            .collect()
    }

    /// Required fields are checked first, in field order, then each custom
    /// validator the form names.
    pub fn validate(
        definition: &ProposalFormDefinition,
        raw_values: &FormValues,
        context: &ValidationContext,
    ) -> Result<(), ValidationError> {
        let missing_fields: Vec<String> = definition
            .all_fields()
            .map(|field| field.name.as_str())
            .filter(|name| definition.required_field_names.contains(*name))
            .filter(|name| is_blank(raw_values, name))
            .map(str::to_string)
            .collect();

        if !missing_fields.is_empty() {
            return Err(ValidationError::MissingFields { missing_fields });
        }

        for validator in &definition.custom_validators {
            if !validator.check(raw_values, context) {
                return Err(ValidationError::CustomValidator {
                    validator: *validator,
                    field: validator.field().to_string(),
                    reason: validator.reason().to_string(),
                });
            }
        }

        Ok(())
    }
}
