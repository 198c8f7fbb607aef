use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Address,
    Amount,
    Text,
    Link,
    Select,
    Composite,
}

/// Normalisation steps applied to a raw value before it becomes a call argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModifierId {
    /// Scale a human decimal string by the token's decimals.
    ValToDecimalString,
    Trim,
    Lowercase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_modifiers: Vec<ModifierId>,
}

/// Per-form replacement of base field keys. Every `Some` key replaces the base
/// key wholesale; `value_modifiers` is replaced, never appended to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOverride {
    pub name: Option<String>,
    pub kind: Option<FieldKind>,
    pub label: Option<String>,
    pub helper_text: Option<String>,
    pub info: Option<String>,
    pub placeholder: Option<String>,
    pub value_modifiers: Option<Vec<ModifierId>>,
}

impl FieldOverride {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    pub fn helper_text(mut self, helper_text: impl Into<String>) -> Self {
        self.helper_text = Some(helper_text.into());
        self
    }

    pub fn value_modifiers(mut self, modifiers: Vec<ModifierId>) -> Self {
        self.value_modifiers = Some(modifiers);
        self
    }
}

impl FieldSpec {
    fn new(name: &str, kind: FieldKind, label: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            label: label.to_string(),
            helper_text: None,
            info: None,
            placeholder: None,
            value_modifiers: Vec::new(),
        }
    }

    fn helper(mut self, text: &str) -> Self {
        self.helper_text = Some(text.to_string());
        self
    }

    fn info(mut self, text: &str) -> Self {
        self.info = Some(text.to_string());
        self
    }

    fn placeholder(mut self, text: &str) -> Self {
        self.placeholder = Some(text.to_string());
        self
    }

    fn modifiers(mut self, modifiers: &[ModifierId]) -> Self {
        self.value_modifiers = modifiers.to_vec();
        self
    }

    /// Shallow merge: override keys replace base keys, the rest is kept.
    pub fn with_override(&self, overrides: &FieldOverride) -> FieldSpec {
        FieldSpec {
            name: overrides.name.clone().unwrap_or_else(|| self.name.clone()),
            kind: overrides.kind.unwrap_or(self.kind),
            label: overrides.label.clone().unwrap_or_else(|| self.label.clone()),
            helper_text: overrides.helper_text.clone().or_else(|| self.helper_text.clone()),
            info: overrides.info.clone().or_else(|| self.info.clone()),
            placeholder: overrides.placeholder.clone().or_else(|| self.placeholder.clone()),
            value_modifiers: overrides
                .value_modifiers
                .clone()
                .unwrap_or_else(|| self.value_modifiers.clone()),
        }
    }
}

pub const INFO_ADDR_KICK: &str = "The member to remove. Their shares are converted to loot.";
pub const INFO_TARGET_CONTRACT: &str = "The contract the minion will call once the proposal passes.";

/// The base field table forms are composed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Description,
    Link,
    Applicant,
    SharesRequest,
    LootRequest,
    PaymentRequest,
    Tribute,
    OnlyErc20,
    MinionSelect,
    TargetContract,
    AbiInput,
    MinionPayment,
    DelegateAddress,
    LootRequestDisplay,
}

impl Field {
    pub fn spec(self) -> FieldSpec {
        use FieldKind::*;
        use ModifierId::*;

        match self {
            Field::Title => FieldSpec::new("title", Text, "Title").placeholder("Proposal Title"),
            Field::Description => FieldSpec::new("description", Text, "Description")
                .placeholder("Your Proposal"),
            Field::Link => FieldSpec::new("link", Link, "Link").placeholder("daolink.club"),
            Field::Applicant => FieldSpec::new("applicant", Address, "Applicant")
                .helper("Use ETH address or ENS")
                .placeholder("0x"),
            Field::SharesRequest => FieldSpec::new("sharesRequested", Amount, "Shares Requested")
                .placeholder("0")
                .modifiers(&[Trim]),
            Field::LootRequest => FieldSpec::new("lootRequested", Amount, "Loot Requested")
                .placeholder("0")
                .modifiers(&[Trim]),
            Field::PaymentRequest => {
                FieldSpec::new("paymentRequested", Amount, "Payment Requested")
                    .placeholder("0")
                    .modifiers(&[ValToDecimalString])
            }
            Field::Tribute => FieldSpec::new("tributeOffered", Amount, "Tribute Offered")
                .placeholder("0")
                .modifiers(&[ValToDecimalString]),
            Field::OnlyErc20 => FieldSpec::new("erc20Address", Address, "Token Address")
                .helper("Must be an ERC20 token contract")
                .placeholder("0x")
                .modifiers(&[Trim, Lowercase]),
            Field::MinionSelect => FieldSpec::new("selectedMinion", Select, "Minion"),
            Field::TargetContract => FieldSpec::new("targetContract", Address, "Target Contract")
                .info(INFO_TARGET_CONTRACT)
                .placeholder("0x"),
            Field::AbiInput => FieldSpec::new("abiInput", Composite, "Contract Function")
                .helper("ABI encoded call data")
                .modifiers(&[Trim]),
            Field::MinionPayment => FieldSpec::new("minionPayment", Amount, "Payment Requested")
                .placeholder("0")
                .modifiers(&[ValToDecimalString]),
            Field::DelegateAddress => {
                FieldSpec::new("delegateAddress", Address, "Delegate Address").placeholder("0x")
            }
            Field::LootRequestDisplay => {
                FieldSpec::new("lootRequested", Amount, "Loot Requested")
                    .helper("Calculated from the tribute offered")
                    .modifiers(&[Trim])
            }
        }
    }
}
