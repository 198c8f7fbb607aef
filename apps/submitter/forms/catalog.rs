use super::{
    fields::{Field, FieldOverride, FieldSpec, INFO_ADDR_KICK, ModifierId},
    registry::{CustomValidator, RegistryError},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProposalType {
    Member,
    Funding,
    Token,
    Trade,
    GuildKick,
    Signal,
    Minion,
    UpdateDelegate,
    LootGrab,
}

impl ProposalType {
    pub const ALL: [ProposalType; 9] = [
        ProposalType::Member,
        ProposalType::Funding,
        ProposalType::Token,
        ProposalType::Trade,
        ProposalType::GuildKick,
        ProposalType::Signal,
        ProposalType::Minion,
        ProposalType::UpdateDelegate,
        ProposalType::LootGrab,
    ];

    pub fn id(self) -> &'static str {
        match self {
            ProposalType::Member => "member",
            ProposalType::Funding => "funding",
            ProposalType::Token => "token",
            ProposalType::Trade => "trade",
            ProposalType::GuildKick => "guildKick",
            ProposalType::Signal => "signal",
            ProposalType::Minion => "minion",
            ProposalType::UpdateDelegate => "updateDelegate",
            ProposalType::LootGrab => "lootGrab",
        }
    }

    /// The label written into the details blob and forum thread.
    pub fn display_name(self) -> &'static str {
        match self {
            ProposalType::Member => "Member Proposal",
            ProposalType::Funding => "Funding Proposal",
            ProposalType::Token => "Whitelist Proposal",
            ProposalType::Trade => "Trade Proposal",
            ProposalType::GuildKick => "Guild Kick Proposal",
            ProposalType::Signal => "Signal Proposal",
            ProposalType::Minion => "Minion Proposal",
            ProposalType::UpdateDelegate => "Update Delegate",
            ProposalType::LootGrab => "Loot Grab Proposal",
        }
    }
}

impl fmt::Display for ProposalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ProposalType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProposalType::ALL
            .into_iter()
            .find(|ty| ty.id().eq_ignore_ascii_case(s))
            .ok_or_else(|| RegistryError::NotFound(s.to_string()))
    }
}

/// Contract functions a form can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContractAction {
    SubmitProposal,
    SubmitWhitelistProposal,
    SubmitGuildKickProposal,
    ProposeAction,
    UpdateDelegateKey,
    ExecuteAction,
}

impl ContractAction {
    pub fn name(self) -> &'static str {
        match self {
            ContractAction::SubmitProposal => "submitProposal",
            ContractAction::SubmitWhitelistProposal => "submitWhitelistProposal",
            ContractAction::SubmitGuildKickProposal => "submitGuildKickProposal",
            ContractAction::ProposeAction => "proposeAction",
            ContractAction::UpdateDelegateKey => "updateDelegateKey",
            ContractAction::ExecuteAction => "executeAction",
        }
    }

    /// Human readable function signature, used for ABI encoding.
    pub fn signature(self) -> &'static str {
        match self {
            ContractAction::SubmitProposal => {
                "submitProposal(address,uint256,uint256,uint256,address,uint256,address,string)"
            }
            ContractAction::SubmitWhitelistProposal => "submitWhitelistProposal(address,string)",
            ContractAction::SubmitGuildKickProposal => "submitGuildKickProposal(address,string)",
            ContractAction::ProposeAction => "proposeAction(address,uint256,bytes,string)",
            ContractAction::UpdateDelegateKey => "updateDelegateKey(address)",
            ContractAction::ExecuteAction => "executeAction(uint256)",
        }
    }
}

impl fmt::Display for ContractAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArgType {
    Address,
    Uint,
    Bytes,
    String,
}

/// What an argument falls back to when its field is left empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Fallback {
    /// The field must be filled in.
    Required,
    Zero,
    EmptyBytes,
    ConnectedAccount,
    DepositToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "source")]
pub enum ArgSource {
    Field {
        name: String,
        ty: ArgType,
        fallback: Fallback,
    },
    /// The JSON details blob built for the submission.
    Details,
}

impl ArgSource {
    fn field(name: &str, ty: ArgType, fallback: Fallback) -> Self {
        ArgSource::Field {
            name: name.to_string(),
            ty,
            fallback,
        }
    }
}

/// Which contract receives the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "field")]
pub enum TxTarget {
    Dao,
    Field(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxDescriptor {
    pub action: ContractAction,
    pub target: TxTarget,
    pub args: Vec<ArgSource>,
}

impl TxDescriptor {
    pub fn submit_proposal() -> Self {
        use ArgType::*;
        use Fallback::*;
        Self {
            action: ContractAction::SubmitProposal,
            target: TxTarget::Dao,
            args: vec![
                ArgSource::field("applicant", Address, ConnectedAccount),
                ArgSource::field("sharesRequested", Uint, Zero),
                ArgSource::field("lootRequested", Uint, Zero),
                ArgSource::field("tributeOffered", Uint, Zero),
                ArgSource::field("tributeToken", Address, DepositToken),
                ArgSource::field("paymentRequested", Uint, Zero),
                ArgSource::field("paymentToken", Address, DepositToken),
                ArgSource::Details,
            ],
        }
    }

    pub fn whitelist_token_proposal() -> Self {
        Self {
            action: ContractAction::SubmitWhitelistProposal,
            target: TxTarget::Dao,
            args: vec![
                ArgSource::field("tokenAddress", ArgType::Address, Fallback::Required),
                ArgSource::Details,
            ],
        }
    }

    pub fn guild_kick_proposal() -> Self {
        Self {
            action: ContractAction::SubmitGuildKickProposal,
            target: TxTarget::Dao,
            args: vec![
                ArgSource::field("applicant", ArgType::Address, Fallback::Required),
                ArgSource::Details,
            ],
        }
    }

    pub fn minion_propose_action() -> Self {
        Self {
            action: ContractAction::ProposeAction,
            target: TxTarget::Field("selectedMinion".to_string()),
            args: vec![
                ArgSource::field("targetContract", ArgType::Address, Fallback::Required),
                ArgSource::field("minionPayment", ArgType::Uint, Fallback::Zero),
                ArgSource::field("abiInput", ArgType::Bytes, Fallback::EmptyBytes),
                ArgSource::Details,
            ],
        }
    }

    pub fn update_delegate() -> Self {
        Self {
            action: ContractAction::UpdateDelegateKey,
            target: TxTarget::Dao,
            args: vec![ArgSource::field(
                "delegateAddress",
                ArgType::Address,
                Fallback::Required,
            )],
        }
    }

    /// Loot grab always applies for the connected account and asks for no
    /// shares or payment.
    pub fn loot_grab_proposal() -> Self {
        use ArgType::*;
        use Fallback::*;
        Self {
            action: ContractAction::SubmitProposal,
            target: TxTarget::Dao,
            args: vec![
                ArgSource::field("connectedAccount", Address, ConnectedAccount),
                ArgSource::field("sharesRequested", Uint, Zero),
                ArgSource::field("lootRequested", Uint, Zero),
                ArgSource::field("tributeOffered", Uint, Zero),
                ArgSource::field("tributeToken", Address, DepositToken),
                ArgSource::field("paymentRequested", Uint, Zero),
                ArgSource::field("paymentToken", Address, DepositToken),
                ArgSource::Details,
            ],
        }
    }
}

/// A flattened, immutable form schema. Overrides have already been merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalFormDefinition {
    pub proposal_type: ProposalType,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub required_field_names: BTreeSet<String>,
    pub fields: Vec<FieldSpec>,
    pub optional_fields: Vec<FieldSpec>,
    pub tx: TxDescriptor,
    pub custom_validators: BTreeSet<CustomValidator>,
}

impl ProposalFormDefinition {
    pub fn type_id(&self) -> &'static str {
        self.proposal_type.id()
    }

    /// Every field of the form, main list first.
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().chain(self.optional_fields.iter())
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.all_fields().find(|field| field.name == name)
    }
}

pub struct FormBuilder {
    proposal_type: ProposalType,
    title: String,
    subtitle: Option<String>,
    required: Vec<String>,
    fields: Vec<FieldSpec>,
    optional_fields: Vec<FieldSpec>,
    tx: TxDescriptor,
    custom_validators: BTreeSet<CustomValidator>,
}

impl FormBuilder {
    pub fn new(proposal_type: ProposalType, title: &str, tx: TxDescriptor) -> Self {
        Self {
            proposal_type,
            title: title.to_string(),
            subtitle: None,
            required: Vec::new(),
            fields: Vec::new(),
            optional_fields: Vec::new(),
            tx,
            custom_validators: BTreeSet::new(),
        }
    }

    pub fn subtitle(mut self, subtitle: &str) -> Self {
        self.subtitle = Some(subtitle.to_string());
        self
    }

    pub fn required(mut self, names: &[&str]) -> Self {
        self.required.extend(names.iter().map(|name| name.to_string()));
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field.spec());
        self
    }

    pub fn field_with(mut self, field: Field, overrides: FieldOverride) -> Self {
        self.fields.push(field.spec().with_override(&overrides));
        self
    }

    pub fn optional(mut self, field: Field) -> Self {
        self.optional_fields.push(field.spec());
        self
    }

    pub fn optional_with(mut self, field: Field, overrides: FieldOverride) -> Self {
        self.optional_fields
            .push(field.spec().with_override(&overrides));
        self
    }

    pub fn validator(mut self, validator: CustomValidator) -> Self {
        self.custom_validators.insert(validator);
        self
    }

    /// Fails when a required name has no matching field.
    pub fn build(self) -> Result<ProposalFormDefinition, RegistryError> {
        let definition = ProposalFormDefinition {
            proposal_type: self.proposal_type,
            title: self.title,
            subtitle: self.subtitle,
            required_field_names: self.required.into_iter().collect(),
            fields: self.fields,
            optional_fields: self.optional_fields,
            tx: self.tx,
            custom_validators: self.custom_validators,
        };

        if let Some(missing) = definition
            .required_field_names
            .iter()
            .find(|name| definition.field(name).is_none())
        {
            return Err(RegistryError::UnknownRequiredField {
                proposal_type: definition.proposal_type,
                field: missing.clone(),
            });
        }

        Ok(definition)
    }
}

pub fn default_catalog() -> Result<Vec<ProposalFormDefinition>, RegistryError> {
    Ok(vec![
        FormBuilder::new(ProposalType::Member, "Membership", TxDescriptor::submit_proposal())
            .subtitle("Request Shares and/or Loot")
            .required(&["title", "sharesRequested"])
            .field(Field::Title)
            .field(Field::SharesRequest)
            .field(Field::Description)
            .field(Field::Tribute)
            .field(Field::Link)
            .optional(Field::Applicant)
            .optional(Field::LootRequest)
            .optional(Field::PaymentRequest)
            .build()?,
        FormBuilder::new(ProposalType::Funding, "Funding", TxDescriptor::submit_proposal())
            .subtitle("Request or distribute funds")
            .required(&["title", "applicant"])
            .field(Field::Title)
            .field(Field::Applicant)
            .field(Field::Description)
            .field(Field::PaymentRequest)
            .field(Field::Link)
            .optional(Field::SharesRequest)
            .optional(Field::LootRequest)
            .optional(Field::Tribute)
            .validator(CustomValidator::NonDaoApplicant)
            .build()?,
        FormBuilder::new(
            ProposalType::Token,
            "Token",
            TxDescriptor::whitelist_token_proposal(),
        )
        .subtitle("Approve a new token.")
        .required(&["title", "tokenAddress"])
        .field(Field::Title)
        .field_with(Field::OnlyErc20, FieldOverride::default().name("tokenAddress"))
        .field(Field::Link)
        .field(Field::Description)
        .build()?,
        FormBuilder::new(ProposalType::Trade, "Trade", TxDescriptor::submit_proposal())
            .subtitle("Remove a Member")
            .required(&["title"])
            .field(Field::Title)
            .field(Field::Tribute)
            .field(Field::Description)
            .field(Field::PaymentRequest)
            .field(Field::Link)
            .optional(Field::Applicant)
            .optional(Field::LootRequest)
            .optional(Field::SharesRequest)
            .build()?,
        FormBuilder::new(
            ProposalType::GuildKick,
            "Guild Kick",
            TxDescriptor::guild_kick_proposal(),
        )
        .subtitle("Remove a Member.")
        .required(&["title", "applicant"])
        .field(Field::Title)
        .field_with(
            Field::Applicant,
            FieldOverride::default()
                .label("Member to Kick")
                .info(INFO_ADDR_KICK),
        )
        .field(Field::Description)
        .field(Field::Link)
        .build()?,
        FormBuilder::new(ProposalType::Signal, "Signal", TxDescriptor::submit_proposal())
            .required(&["title"])
            .field(Field::Title)
            .field(Field::Description)
            .field(Field::Link)
            .build()?,
        FormBuilder::new(
            ProposalType::Minion,
            "Minion Proposal",
            TxDescriptor::minion_propose_action(),
        )
        .subtitle("Extend DAO proposals to external contracts")
        .required(&["targetContract", "title", "selectedMinion"])
        .field(Field::Title)
        .field(Field::MinionSelect)
        .field(Field::TargetContract)
        .field(Field::AbiInput)
        .optional(Field::MinionPayment)
        .optional(Field::Description)
        .build()?,
        FormBuilder::new(
            ProposalType::UpdateDelegate,
            "Update Delegate Address",
            TxDescriptor::update_delegate(),
        )
        .required(&["delegateAddress"])
        .field(Field::DelegateAddress)
        .build()?,
        FormBuilder::new(
            ProposalType::LootGrab,
            "Loot Grab proposal",
            TxDescriptor::loot_grab_proposal(),
        )
        .subtitle("Request loot with a tribute")
        .required(&["tributeOffered"])
        .field(Field::LootRequestDisplay)
        .field_with(
            Field::Tribute,
            FieldOverride::default()
                .value_modifiers(vec![ModifierId::Trim, ModifierId::ValToDecimalString]),
        )
        .build()?,
    ])
}
