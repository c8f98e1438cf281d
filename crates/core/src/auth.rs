use crate::error::CredentialError;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Fixed username to password table used by the login endpoint.
#[derive(Clone, Default)]
pub struct CredentialMap {
    users: HashMap<String, String>,
}

impl CredentialMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `user:password` pairs separated by commas. Usernames are
    /// lowercased; passwords are kept verbatim.
    pub fn parse(raw: &str) -> Result<Self, CredentialError> {
        let mut map = Self::new();

        for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (user, password) = entry
                .split_once(':')
                .ok_or_else(|| CredentialError::Malformed(entry.to_string()))?;
            let user = user.trim().to_lowercase();
            if user.is_empty() || password.is_empty() {
                return Err(CredentialError::Malformed(entry.to_string()));
            }
            if map.users.insert(user.clone(), password.to_string()).is_some() {
                return Err(CredentialError::DuplicateUser(user));
            }
        }

        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Normalized username when the password matches exactly.
    pub fn verify(&self, username: &str, password: &str) -> Option<String> {
        let user = username.trim().to_lowercase();
        match self.users.get(&user) {
            Some(expected) if expected == password => Some(user),
            _ => None,
        }
    }
}

impl FromStr for CredentialMap {
    type Err = CredentialError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl fmt::Debug for CredentialMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut users = self.users.keys().collect::<Vec<_>>();
        users.sort();
        f.debug_struct("CredentialMap").field("users", &users).finish()
    }
}
