//! Account and device descriptors

/// Subscription tier of the signed-in account
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AccountTier {
    Premium,
    Free,
    #[default]
    Unknown,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
    pub authenticated: bool,
    pub tier: AccountTier,
    pub display_name: Option<String>,
}

impl Account {
    pub fn signed_out() -> Self {
        Self::default()
    }
}

/// Information about a Spotify Connect device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}
