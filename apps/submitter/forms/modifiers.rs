use super::{catalog::ProposalFormDefinition, fields::ModifierId, values::FormValues};
use alloy::primitives::utils::{ParseUnits, parse_units};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModifierError {
    #[error("`{field}` is not a decimal amount: {value}")]
    InvalidAmount { field: String, value: String },
}

#[derive(Debug, Clone, Copy)]
pub struct ModifierContext {
    pub token_decimals: u8,
}

impl Default for ModifierContext {
    fn default() -> Self {
        Self { token_decimals: 18 }
    }
}

pub fn apply(
    modifier: ModifierId,
    field: &str,
    value: &str,
    context: &ModifierContext,
) -> Result<String, ModifierError> {
    match modifier {
        ModifierId::Trim => Ok(value.trim().to_string()),
        ModifierId::Lowercase => Ok(value.to_lowercase()),
        ModifierId::ValToDecimalString => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Ok(String::new());
            }
            match parse_units(trimmed, context.token_decimals) {
                Ok(ParseUnits::U256(units)) => Ok(units.to_string()),
                Ok(ParseUnits::I256(_)) | Err(_) => Err(ModifierError::InvalidAmount {
                    field: field.to_string(),
                    value: value.to_string(),
                }),
            }
        }
    }
}

/// Runs each field's modifiers in order. Values without a field spec pass through.
pub fn resolve_values(
    definition: &ProposalFormDefinition,
    raw_values: &FormValues,
    context: &ModifierContext,
) -> Result<FormValues, ModifierError> {
    let mut resolved = raw_values.clone();
    for field in definition.all_fields() {
        let Some(value) = resolved.get_mut(&field.name) else {
            continue;
        };
        for modifier in &field.value_modifiers {
            *value = apply(*modifier, &field.name, value, context)?;
        }
    }
    Ok(resolved)
}
