use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipient {
    /// E.164 phone number.
    pub phone: String,
    #[serde(default, alias = "isAdmin")]
    pub is_admin: bool,
}

/// Recipient id -> recipient.
pub type Recipients = BTreeMap<String, Recipient>;

/// Ids of every admin recipient, in id order.
pub fn admin_ids(recipients: &Recipients) -> Vec<String> {
    recipients
        .iter()
        .filter(|(_, recipient)| recipient.is_admin)
        .map(|(id, _)| id.clone())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipientMessage {
    pub recipient: String,
    pub text: String,
}

impl RecipientMessage {
    pub fn new(recipient: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            text: text.into(),
        }
    }
}
