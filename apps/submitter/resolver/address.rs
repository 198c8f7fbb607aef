use super::{
    ens::{NameResolver, ProfileLookup},
    members::{Member, MemberDirectory, MemberOption},
};
use crate::{ADDRESS_PATTERN, ENS_SUFFIX, forms::FormHandle};
use alloy::primitives::Address;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::{
    fmt,
    sync::{Mutex, MutexGuard},
};
use tracing::debug;

static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(ADDRESS_PATTERN).expect("address pattern is a valid regex"));

pub fn is_eth_address(input: &str) -> bool {
    ADDRESS_RE.is_match(input)
}

/// Status line shown under an address input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "text")]
pub enum HelperText {
    #[default]
    Hint,
    Valid,
    Loading,
    /// Lookup succeeded; carries the name the user typed.
    Resolved(String),
    NotFound,
}

impl fmt::Display for HelperText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HelperText::Hint => f.write_str("Use ETH address or ENS"),
            HelperText::Valid => f.write_str("Valid Address"),
            HelperText::Loading => f.write_str("Loading..."),
            HelperText::Resolved(name) => f.write_str(name),
            HelperText::NotFound => f.write_str("No ENS Set"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InputMode {
    #[default]
    Text,
    Members,
}

/// Permission to commit one name lookup. Only the newest ticket for a field
/// is honoured.
#[derive(Debug)]
pub struct LookupTicket {
    generation: u64,
    pub name: String,
}

#[derive(Debug)]
pub struct MemberTicket {
    generation: u64,
}

#[derive(Debug, Default)]
struct AddressState {
    helper: HelperText,
    mode: InputMode,
    lookup_generation: u64,
    member_generation: u64,
    options: Vec<MemberOption>,
    torn_down: bool,
}

/// An address-class form field with ENS resolution and a member picker.
#[derive(Debug)]
pub struct AddressInput {
    name: String,
    form: FormHandle,
    state: Mutex<AddressState>,
}

impl AddressInput {
    pub fn new(name: impl Into<String>, form: FormHandle) -> Self {
        Self {
            name: name.into(),
            form,
            state: Mutex::new(AddressState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AddressState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn helper_text(&self) -> HelperText {
        self.lock().helper.clone()
    }

    pub fn mode(&self) -> InputMode {
        self.lock().mode
    }

    pub fn options(&self) -> Vec<MemberOption> {
        self.lock().options.clone()
    }

    /// Records the typed input and supersedes any lookup still in flight.
    /// Returns a ticket when the input needs a name lookup.
    pub fn on_change(&self, input: &str) -> Option<LookupTicket> {
        let mut state = self.lock();
        if state.torn_down {
            return None;
        }
        state.lookup_generation += 1;
        self.form.set_value(&self.name, input);

        if is_eth_address(input) {
            state.helper = HelperText::Valid;
            None
        } else if input.ends_with(ENS_SUFFIX) {
            state.helper = HelperText::Loading;
            Some(LookupTicket {
                generation: state.lookup_generation,
                name: input.to_string(),
            })
        } else {
            state.helper = HelperText::Hint;
            None
        }
    }

    /// Applies a lookup result if its ticket is still the newest one.
    /// Returns whether anything was written.
    pub fn complete_lookup(&self, ticket: LookupTicket, result: Option<Address>) -> bool {
        let mut state = self.lock();
        if state.torn_down || ticket.generation != state.lookup_generation {
            debug!(field = %self.name, name = %ticket.name, "Discarding superseded lookup");
            return false;
        }

        match result {
            Some(address) => {
                self.form.set_value(&self.name, address.to_string());
                state.helper = HelperText::Resolved(ticket.name);
            }
            None => state.helper = HelperText::NotFound,
        }
        true
    }

    pub async fn handle_change(&self, input: &str, resolver: &dyn NameResolver) -> HelperText {
        if let Some(ticket) = self.on_change(input) {
            let result = resolver.resolve(&ticket.name).await;
            self.complete_lookup(ticket, result);
        }
        self.helper_text()
    }

    /// Whether the current form value can be submitted as an address.
    pub fn is_resolved(&self) -> bool {
        self.form
            .get(&self.name)
            .is_some_and(|value| is_eth_address(&value))
    }

    /// Switches between free text and the member picker. Typed or resolved
    /// values are kept.
    pub fn toggle_mode(&self) -> InputMode {
        let mut state = self.lock();
        state.mode = match state.mode {
            InputMode::Text => InputMode::Members,
            InputMode::Members => InputMode::Text,
        };
        state.mode
    }

    pub fn select_member(&self, address: Address) {
        let mut state = self.lock();
        state.lookup_generation += 1;
        state.helper = HelperText::Valid;
        self.form.set_value(&self.name, address.to_string());
    }

    pub fn begin_member_fetch(&self) -> MemberTicket {
        let mut state = self.lock();
        state.member_generation += 1;
        MemberTicket {
            generation: state.member_generation,
        }
    }

    pub fn commit_members(&self, ticket: MemberTicket, options: Vec<MemberOption>) -> bool {
        let mut state = self.lock();
        if state.torn_down || ticket.generation != state.member_generation {
            debug!(field = %self.name, "Discarding member list for a stale member set");
            return false;
        }
        state.options = options;
        true
    }

    /// Re-hydrates the picker for a new member set.
    pub async fn refresh_members(&self, members: &[Member], lookup: &dyn ProfileLookup) -> bool {
        let ticket = self.begin_member_fetch();
        let options = MemberDirectory::hydrate(members, lookup).await;
        self.commit_members(ticket, options)
    }

    /// Nothing started before teardown may write afterwards.
    pub fn teardown(&self) {
        let mut state = self.lock();
        state.torn_down = true;
        state.lookup_generation += 1;
        state.member_generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ens::Profile;
    use alloy::primitives::address;
    use async_trait::async_trait;
    use std::{collections::HashMap, sync::Arc};
    use tokio::sync::Notify;

    const ALICE: Address = address!("0xdef0000000000000000000000000000000000456");
    const BOB: Address = address!("0xb0b0000000000000000000000000000000000789");

    struct StaticResolver(HashMap<String, Address>);

    #[async_trait]
    impl NameResolver for StaticResolver {
        async fn resolve(&self, name: &str) -> Option<Address> {
            self.0.get(name).copied()
        }
    }

    /// Holds back `alice.eth` until released.
    struct GatedResolver {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl NameResolver for GatedResolver {
        async fn resolve(&self, name: &str) -> Option<Address> {
            match name {
                "alice.eth" => {
                    self.gate.notified().await;
                    Some(ALICE)
                }
                "bob.eth" => Some(BOB),
                _ => None,
            }
        }
    }

    struct NoProfiles;

    #[async_trait]
    impl ProfileLookup for NoProfiles {
        async fn profile(&self, _address: Address) -> Option<Profile> {
            None
        }
    }

    fn input() -> (AddressInput, FormHandle) {
        let form = FormHandle::default();
        (AddressInput::new("applicant", form.clone()), form)
    }

    #[test]
    fn test_canonical_address_is_valid_without_lookup() {
        let (field, form) = input();
        let ticket = field.on_change("0xdef0000000000000000000000000000000000456");

        assert!(ticket.is_none());
        assert_eq!(field.helper_text(), HelperText::Valid);
        assert!(field.is_resolved());
        assert_eq!(
            form.get("applicant").as_deref(),
            Some("0xdef0000000000000000000000000000000000456")
        );
    }

    #[test]
    fn test_other_input_shows_hint() {
        let (field, _) = input();
        assert!(field.on_change("alice").is_none());
        assert_eq!(field.helper_text().to_string(), "Use ETH address or ENS");
        assert!(!field.is_resolved());
    }

    #[tokio::test]
    async fn test_ens_name_resolves_into_form_value() {
        let (field, form) = input();
        let resolver = StaticResolver(HashMap::from([("alice.eth".to_string(), ALICE)]));

        let ticket = field.on_change("alice.eth").unwrap();
        assert_eq!(field.helper_text(), HelperText::Loading);

        let result = resolver.resolve(&ticket.name).await;
        assert!(field.complete_lookup(ticket, result));

        assert_eq!(form.get("applicant"), Some(ALICE.to_string()));
        assert_eq!(field.helper_text().to_string(), "alice.eth");
        assert!(field.is_resolved());
    }

    #[tokio::test]
    async fn test_unknown_name_leaves_raw_input() {
        let (field, form) = input();
        let resolver = StaticResolver(HashMap::new());

        let helper = field.handle_change("nobody.eth", &resolver).await;

        assert_eq!(helper, HelperText::NotFound);
        assert_eq!(helper.to_string(), "No ENS Set");
        assert_eq!(form.get("applicant").as_deref(), Some("nobody.eth"));
        assert!(!field.is_resolved());
    }

    #[test]
    fn test_superseded_ticket_is_discarded() {
        let (field, form) = input();
        let first = field.on_change("alice.eth").unwrap();
        let second = field.on_change("bob.eth").unwrap();

        assert!(field.complete_lookup(second, Some(BOB)));
        assert!(!field.complete_lookup(first, Some(ALICE)));

        assert_eq!(form.get("applicant"), Some(BOB.to_string()));
        assert_eq!(field.helper_text(), HelperText::Resolved("bob.eth".to_string()));
    }

    #[tokio::test]
    async fn test_slow_lookup_cannot_overwrite_newer_one() {
        let (field, form) = input();
        let gate = Arc::new(Notify::new());
        let resolver = GatedResolver { gate: gate.clone() };

        let slow = field.handle_change("alice.eth", &resolver);
        let fast = async {
            let helper = field.handle_change("bob.eth", &resolver).await;
            gate.notify_one();
            helper
        };
        let (_, fast_helper) = tokio::join!(slow, fast);

        assert_eq!(fast_helper, HelperText::Resolved("bob.eth".to_string()));
        assert_eq!(form.get("applicant"), Some(BOB.to_string()));
        assert_eq!(field.helper_text(), HelperText::Resolved("bob.eth".to_string()));
    }

    #[test]
    fn test_typing_an_address_supersedes_pending_lookup() {
        let (field, form) = input();
        let ticket = field.on_change("alice.eth").unwrap();
        field.on_change("0xb0b0000000000000000000000000000000000789");

        assert!(!field.complete_lookup(ticket, Some(ALICE)));
        assert_eq!(
            form.get("applicant").as_deref(),
            Some("0xb0b0000000000000000000000000000000000789")
        );
    }

    #[test]
    fn test_mode_switch_keeps_value() {
        let (field, form) = input();
        field.on_change("0xdef0000000000000000000000000000000000456");

        assert_eq!(field.toggle_mode(), InputMode::Members);
        assert_eq!(field.toggle_mode(), InputMode::Text);
        assert_eq!(
            form.get("applicant").as_deref(),
            Some("0xdef0000000000000000000000000000000000456")
        );
    }

    #[test]
    fn test_select_member_writes_address() {
        let (field, form) = input();
        field.toggle_mode();
        field.select_member(BOB);

        assert_eq!(form.get("applicant"), Some(BOB.to_string()));
        assert_eq!(field.helper_text(), HelperText::Valid);
    }

    #[tokio::test]
    async fn test_member_list_from_stale_set_is_dropped() {
        let (field, _) = input();
        let stale = field.begin_member_fetch();
        let members = vec![Member {
            member_address: BOB,
            shares: 1,
            loot: 0,
            jailed: false,
        }];

        assert!(field.refresh_members(&members, &NoProfiles).await);
        assert!(!field.commit_members(stale, Vec::new()));
        assert_eq!(field.options().len(), 1);
    }

    #[tokio::test]
    async fn test_nothing_commits_after_teardown() {
        let (field, form) = input();
        let ticket = field.on_change("alice.eth").unwrap();
        let members = field.begin_member_fetch();

        field.teardown();

        assert!(!field.complete_lookup(ticket, Some(ALICE)));
        assert!(!field.commit_members(members, Vec::new()));
        assert_eq!(form.get("applicant").as_deref(), Some("alice.eth"));
    }
}
