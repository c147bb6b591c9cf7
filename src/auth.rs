//! Credential lookup and the request-scoped session.
//!
//! The built-in table is a plaintext demo mapping kept behind the
//! [`Authenticator`] trait so a real identity provider can replace it
//! without touching the aggregation core. It is not hardened.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "client",
        }
    }
}

/// Who is asking. Passed explicitly into every filter call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub username: String,
    pub role: Role,
    pub client_name: String,
}

impl Session {
    pub fn admin(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            client_name: username.clone(),
            username,
            role: Role::Admin,
        }
    }

    pub fn client(client_name: impl Into<String>) -> Self {
        let client_name = client_name.into();
        Self {
            username: client_name.clone(),
            client_name,
            role: Role::Client,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Resolve a username/password pair to a session.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, username: &str, password: &str) -> Option<Session>;
}

#[derive(Debug, Clone)]
struct Credential {
    password: String,
    role: Role,
    client_name: String,
}

/// Static username → credential table.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    users: HashMap<String, Credential>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// The demo accounts shipped with the dashboard.
    pub fn builtin() -> Self {
        // ---
        Self::new()
            .with_user("admin", "admin123", Role::Admin, "admin")
            .with_user("AVPN", "avpn123", Role::Client, "AVPN")
            .with_user("CIPT", "cipt123", Role::Client, "CIPT")
            .with_user("Titan", "titan123", Role::Client, "Titan")
    }

    pub fn with_user(
        mut self,
        username: &str,
        password: &str,
        role: Role,
        client_name: &str,
    ) -> Self {
        self.users.insert(
            username.to_string(),
            Credential {
                password: password.to_string(),
                role,
                client_name: client_name.to_string(),
            },
        );
        self
    }
}

impl Authenticator for StaticCredentials {
    fn authenticate(&self, username: &str, password: &str) -> Option<Session> {
        // ---
        let cred = self.users.get(username)?;
        (cred.password == password).then(|| Session {
            username: username.to_string(),
            role: cred.role,
            client_name: cred.client_name.clone(),
        })
    }
}
