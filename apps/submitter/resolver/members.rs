use super::ens::ProfileLookup;
use alloy::primitives::Address;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub member_address: Address,
    pub shares: u64,
    pub loot: u64,
    #[serde(default)]
    pub jailed: bool,
}

impl Member {
    pub fn is_active(&self) -> bool {
        (self.shares > 0 || self.loot > 0) && !self.jailed
    }
}

/// One entry of the member picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberOption {
    pub name: String,
    pub value: Address,
}

/// `0x1234...abcd`
pub fn truncate_addr(address: &Address) -> String {
    let full = address.to_string();
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

pub struct MemberDirectory;

impl MemberDirectory {
    /// Resolves display names for every active member concurrently. Members
    /// without a profile fall back to their truncated address.
    pub async fn hydrate(members: &[Member], lookup: &dyn ProfileLookup) -> Vec<MemberOption> {
        let active = members.iter().filter(|member| member.is_active());
        join_all(active.map(|member| async move {
            let value = member.member_address;
            match lookup.profile(value).await {
                Some(profile) => MemberOption {
                    name: profile.name,
                    value,
                },
                None => MemberOption {
                    name: truncate_addr(&value),
                    value,
                },
            }
        }))
        .await
    }
}
