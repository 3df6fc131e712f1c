//! System entity types and the label → column rename table

use super::attr::Attribute;
use std::borrow::Cow;

/// Entity types owned by the system catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemEtype {
    Users,
    MagicCodes,
    UserRefreshTokens,
    OauthProviders,
    OauthClients,
    OauthUserLinks,
    OauthCodes,
    OauthRedirects,
}

impl SystemEtype {
    pub const ALL: [SystemEtype; 8] = [
        SystemEtype::Users,
        SystemEtype::MagicCodes,
        SystemEtype::UserRefreshTokens,
        SystemEtype::OauthProviders,
        SystemEtype::OauthClients,
        SystemEtype::OauthUserLinks,
        SystemEtype::OauthCodes,
        SystemEtype::OauthRedirects,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemEtype::Users => "$users",
            SystemEtype::MagicCodes => "$magicCodes",
            SystemEtype::UserRefreshTokens => "$userRefreshTokens",
            SystemEtype::OauthProviders => "$oauthProviders",
            SystemEtype::OauthClients => "$oauthClients",
            SystemEtype::OauthUserLinks => "$oauthUserLinks",
            SystemEtype::OauthCodes => "$oauthCodes",
            SystemEtype::OauthRedirects => "$oauthRedirects",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }

    /// Forward labels of this etype's value attributes
    pub fn value_labels(&self) -> &'static [&'static str] {
        match self {
            SystemEtype::Users => &["id", "email"],
            SystemEtype::MagicCodes => &["id", "codeHash"],
            SystemEtype::UserRefreshTokens => &["id", "hashedToken"],
            SystemEtype::OauthProviders => &["id", "name"],
            SystemEtype::OauthClients => &[
                "id",
                "name",
                "clientId",
                "encryptedClientSecret",
                "discoveryEndpoint",
                "meta",
            ],
            SystemEtype::OauthUserLinks => &["id", "sub"],
            SystemEtype::OauthCodes => &["id", "codeHash", "codeChallengeMethod", "codeChallenge"],
            SystemEtype::OauthRedirects => &[
                "id",
                "stateHash",
                "cookieHash",
                "redirectUrl",
                "codeChallengeMethod",
                "codeChallenge",
            ],
        }
    }

    /// Etypes this etype references, each through a `$`-prefixed label
    pub fn references(&self) -> &'static [SystemEtype] {
        match self {
            SystemEtype::MagicCodes | SystemEtype::UserRefreshTokens | SystemEtype::OauthCodes => {
                &[SystemEtype::Users]
            }
            SystemEtype::OauthClients => &[SystemEtype::OauthProviders],
            SystemEtype::OauthUserLinks => &[SystemEtype::Users, SystemEtype::OauthProviders],
            SystemEtype::OauthRedirects => &[SystemEtype::OauthClients],
            SystemEtype::Users | SystemEtype::OauthProviders => &[],
        }
    }

    /// Label used on the referencing side for a link to this etype
    pub fn ref_label(&self) -> Option<&'static str> {
        match self {
            SystemEtype::Users => Some("$user"),
            SystemEtype::OauthProviders => Some("$oauthProvider"),
            SystemEtype::OauthClients => Some("$oauthClient"),
            _ => None,
        }
    }

    fn is_unique(&self, label: &str) -> bool {
        matches!(
            (self, label),
            (_, "id")
                | (SystemEtype::Users, "email")
                | (SystemEtype::MagicCodes, "codeHash")
                | (SystemEtype::UserRefreshTokens, "hashedToken")
                | (SystemEtype::OauthProviders, "name")
                | (SystemEtype::OauthClients, "name")
                | (SystemEtype::OauthClients, "clientId")
                | (SystemEtype::OauthCodes, "codeHash")
                | (SystemEtype::OauthRedirects, "stateHash")
        )
    }
}

/// Fresh attribute definitions for every system etype, as installed into a
/// newly migrated app.
pub fn system_attributes() -> Vec<Attribute> {
    let mut out = Vec::new();
    for etype in SystemEtype::ALL {
        for label in etype.value_labels() {
            let attr = Attribute::new(etype.as_str(), *label);
            out.push(if etype.is_unique(label) { attr.unique() } else { attr });
        }
        for target in etype.references() {
            if let Some(label) = target.ref_label() {
                out.push(
                    Attribute::new(etype.as_str(), label).with_reverse(target.as_str(), etype.as_str()),
                );
            }
        }
    }
    out
}

impl std::fmt::Display for SystemEtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labels starting with this sigil name reference attributes; their values
/// are entity ids.
pub const REF_SIGIL: char = '$';

/// Whether a forward label names a reference to another system entity
pub fn is_ref_label(label: &str) -> bool {
    label.starts_with(REF_SIGIL)
}

/// Map an attribute's forward label on `etype` to its legacy column name.
///
/// `name` is the only label whose column depends on the entity type.
pub fn canonical_key<'a>(etype: &str, label: &'a str) -> Cow<'a, str> {
    let renamed = match label {
        "$user" => "user_id",
        "$oauthProvider" => "provider_id",
        "$oauthClient" => "client_id",
        "clientId" => "client_id",
        "encryptedClientSecret" => "client_secret",
        "discoveryEndpoint" => "discovery_endpoint",
        "codeChallengeMethod" => "code_challenge_method",
        "codeChallenge" => "code_challenge",
        "stateHash" => "state_hash",
        "cookieHash" => "cookie_hash",
        "redirectUrl" => "redirect_url",
        "name" => match SystemEtype::from_name(etype) {
            Some(SystemEtype::OauthProviders) => "provider_name",
            Some(SystemEtype::OauthClients) => "client_name",
            _ => return Cow::Borrowed(label),
        },
        _ => return Cow::Borrowed(label),
    };
    Cow::Borrowed(renamed)
}
